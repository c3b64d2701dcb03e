//! Signal count increments against the project store

use std::sync::Arc;

use tracing::{error, info};

use crate::store::ProjectStore;

/// Increments a project's signal count after a confirmed payment.
///
/// The increment is a plain read-modify-write: the store exposes no atomic
/// increment or conditional write, so two increments racing on the same
/// project can lose one update. Duplicate deliveries are filtered earlier by
/// [`super::dedup::DeliveryLedger`]; distinct concurrent payments for the same
/// project remain exposed.
#[derive(Clone)]
pub struct SignalCounter {
    store: Arc<dyn ProjectStore>,
}

impl SignalCounter {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self { store }
    }

    /// Add one signal to the project. Failures are logged and reported as `false`.
    pub async fn increment(&self, project_id: &str) -> bool {
        let current = match self.store.get_project(project_id).await {
            Ok(project) => project.signal_count,
            Err(e) => {
                error!(project_id = %project_id, error = %e, "Failed to read signal count");
                return false;
            }
        };

        let next = current.saturating_add(1);
        if let Err(e) = self.store.update_signal_count(project_id, next).await {
            error!(project_id = %project_id, error = %e, "Failed to write signal count");
            return false;
        }

        info!(project_id = %project_id, signal_count = next, "Signal count incremented");
        true
    }
}
