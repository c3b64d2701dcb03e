//! Project storage backed by the Notion content database

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod notion;

#[cfg(test)]
pub mod memory;

pub use notion::NotionProjectStore;

/// A fundable idea listed on the board, one Notion page per project
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: String,
    pub signal_count: u64,
    pub content: String,
    pub last_update: Option<DateTime<Utc>>,
}

impl Project {
    /// Project with placeholder presentation fields
    pub fn new(id: impl Into<String>, signal_count: u64) -> Self {
        Self {
            id: id.into(),
            name: "Untitled Project".to_string(),
            description: "No description provided.".to_string(),
            status: "Unknown".to_string(),
            signal_count,
            content: String::new(),
            last_update: None,
        }
    }
}

/// Access to project records in the external content store.
///
/// Implementations are injected into [`crate::app::AppState`] so handlers and
/// the signal counter never reach for a global client.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// List all projects, most recently updated first
    async fn query_projects(&self) -> Result<Vec<Project>, StoreError>;

    /// Fetch a single project by id
    async fn get_project(&self, id: &str) -> Result<Project, StoreError>;

    /// Overwrite the signal count of a project.
    ///
    /// This is a blind write: the store offers no conditional update, so
    /// callers doing read-modify-write can lose concurrent updates.
    async fn update_signal_count(&self, id: &str, new_value: u64) -> Result<(), StoreError>;
}

/// Content store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("Project not found: {0}")]
    NotFound(String),

    #[error("Not a valid project id: {0}")]
    InvalidId(String),

    #[error("Content store credentials are not configured")]
    NotConfigured,
}
