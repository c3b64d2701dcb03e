//! In-memory project store for tests, with failure injection

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Barrier, Notify};

use super::{Project, ProjectStore, StoreError};

#[derive(Default)]
pub struct MemoryProjectStore {
    projects: Mutex<HashMap<String, Project>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    read_gate: Mutex<Option<Arc<Barrier>>>,
    written: Notify,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(self, id: &str, signal_count: u64) -> Self {
        self.projects
            .lock()
            .insert(id.to_string(), Project::new(id, signal_count));
        self
    }

    pub fn signal_count(&self, id: &str) -> Option<u64> {
        self.projects.lock().get(id).map(|p| p.signal_count)
    }

    /// Number of `get_project` calls, successful or not
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `update_signal_count` calls, successful or not
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Hold every read until `parties` readers have fetched their value
    pub fn gate_reads(&self, parties: usize) {
        *self.read_gate.lock() = Some(Arc::new(Barrier::new(parties)));
    }

    /// Wait until at least `count` writes were attempted
    pub async fn wait_for_writes(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.writes() < count {
                let notified = self.written.notified();
                if self.writes() >= count {
                    break;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for store writes");
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn query_projects(&self) -> Result<Vec<Project>, StoreError> {
        let mut projects: Vec<Project> = self.projects.lock().values().cloned().collect();
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(projects)
    }

    async fn get_project(&self, id: &str) -> Result<Project, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Api { status: 503, body: "read unavailable".to_string() });
        }

        let project = self
            .projects
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let gate = self.read_gate.lock().clone();
        if let Some(gate) = gate {
            gate.wait().await;
        }

        Ok(project)
    }

    async fn update_signal_count(&self, id: &str, new_value: u64) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Api { status: 502, body: "write unavailable".to_string() })
        } else {
            match self.projects.lock().get_mut(id) {
                Some(project) => {
                    project.signal_count = new_value;
                    Ok(())
                }
                None => Err(StoreError::NotFound(id.to_string())),
            }
        };
        self.written.notify_waiters();
        result
    }
}
