//! Task persistence.
//!
//! Callers hold a `Box<dyn TaskBackend>` and never learn which storage sits
//! behind it; `open_backend` picks the implementation from the configured
//! [`SystemMode`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, ConfigStore, SystemMode};
use crate::task::{Task, TaskDraft};

pub mod json;

pub use json::JsonTaskBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Task {0} not found")]
    NotFound(String),
    #[error("Task key {0} already exists")]
    DuplicateKey(String),
    #[error("Task storage error on {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Task data in {} is unreadable: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl BackendError {
    /// True for the I/O and decoding failures, as opposed to lookups that
    /// simply missed.
    pub fn is_storage(&self) -> bool {
        matches!(self, BackendError::Storage { .. } | BackendError::Corrupt { .. })
    }
}

/// CRUD contract every task store satisfies. Tasks are addressed by their
/// human-facing `key`.
pub trait TaskBackend {
    /// Stores a new task, assigning `id`, `created_at` and `updated_at`.
    fn add(&self, draft: TaskDraft) -> Result<Task, BackendError>;

    fn get(&self, key: &str) -> Result<Task, BackendError>;

    /// Snapshot of every stored task, in insertion order.
    fn list(&self) -> Result<Vec<Task>, BackendError>;

    /// Replaces the caller-owned fields of the task stored under `key`.
    /// `id` and `created_at` survive; `updated_at` advances.
    fn update(&self, key: &str, draft: TaskDraft) -> Result<Task, BackendError>;

    /// Removes the task stored under `key` and returns it.
    fn delete(&self, key: &str) -> Result<Task, BackendError>;
}

/// Builds the backend the config document selects.
pub fn open_backend(config: &ConfigStore) -> Result<Box<dyn TaskBackend>, ConfigError> {
    match config.get_mode()? {
        SystemMode::File => {
            let dir = config.get_data_dir()?;
            info!("using file backend in {}", dir.display());
            Ok(Box::new(JsonTaskBackend::new(dir)))
        }
    }
}
