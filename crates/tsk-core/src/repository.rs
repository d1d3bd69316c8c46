//! Task lifecycle on top of a [`TaskBackend`], with the config document as
//! the source of category and status policy.

use thiserror::Error;
use tracing::debug;

use crate::backend::{open_backend, BackendError, TaskBackend};
use crate::config::{ConfigError, ConfigStore, StatusMode};
use crate::task::{normalize_tags, Task, TaskDraft, TaskStatus};

pub const KEY_PREFIX: &str = "T";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Invalid task: {0}")]
    Validation(String),
}

pub struct TaskRepository {
    config: ConfigStore,
    backend: Box<dyn TaskBackend>,
}

impl TaskRepository {
    /// Opens the backend selected by `system.mode`.
    pub fn open(config: ConfigStore) -> Result<Self, RepositoryError> {
        let backend = open_backend(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: ConfigStore, backend: Box<dyn TaskBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    pub fn backend(&self) -> &dyn TaskBackend {
        self.backend.as_ref()
    }

    /// Stores a new task. An empty category means the default category, an
    /// empty key gets the next `T-<n>` key, and an untouched status becomes
    /// the category's initial status.
    pub fn create(&self, mut draft: TaskDraft) -> Result<Task, RepositoryError> {
        if draft.category.trim().is_empty() {
            draft.category = self.config.get_default_category()?;
        }
        if draft.key.trim().is_empty() {
            draft.key = self.next_key()?;
        }
        if draft.status == TaskStatus::default() {
            draft.status = self.default_status(&draft.category)?;
        }
        self.validate(&mut draft)?;
        let task = self.backend.add(draft)?;
        debug!("created {}", task);
        Ok(task)
    }

    pub fn get(&self, key: &str) -> Result<Task, RepositoryError> {
        Ok(self.backend.get(key)?)
    }

    pub fn list(&self) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.backend.list()?)
    }

    pub fn list_category(&self, category: &str) -> Result<Vec<Task>, RepositoryError> {
        if !self.config.has_category(category)? {
            return Err(ConfigError::UnknownCategory(category.to_string()).into());
        }
        let mut tasks = self.backend.list()?;
        tasks.retain(|task| task.category == category);
        Ok(tasks)
    }

    pub fn update(&self, key: &str, mut draft: TaskDraft) -> Result<Task, RepositoryError> {
        self.validate(&mut draft)?;
        Ok(self.backend.update(key, draft)?)
    }

    /// Marks a task done or not done in whatever shape its category uses.
    pub fn set_done(&self, key: &str, done: bool) -> Result<Task, RepositoryError> {
        let task = self.backend.get(key)?;
        let mut draft = task.draft();
        draft.status = match self.config.get_status_mode(&task.category)? {
            StatusMode::Bool => TaskStatus::Flag(done),
            StatusMode::Enum => {
                let states = self.config.get_statuses(&task.category)?;
                let state = if done { states.last() } else { states.first() };
                TaskStatus::State(state.cloned().unwrap_or_default())
            }
        };
        self.update(key, draft)
    }

    pub fn is_done(&self, task: &Task) -> Result<bool, RepositoryError> {
        Ok(match &task.status {
            TaskStatus::Flag(done) => *done,
            TaskStatus::State(state) => {
                self.config.get_statuses(&task.category)?.last() == Some(state)
            }
        })
    }

    pub fn delete(&self, key: &str) -> Result<Task, RepositoryError> {
        let task = self.backend.delete(key)?;
        debug!("deleted {}", task);
        Ok(task)
    }

    /// Removes a category from the config once no task refers to it.
    pub fn remove_category(&mut self, name: &str) -> Result<(), RepositoryError> {
        let in_use = self
            .backend
            .list()?
            .iter()
            .filter(|task| task.category == name)
            .count();
        if in_use > 0 {
            return Err(RepositoryError::Validation(format!(
                "category `{}` still has {} task(s)",
                name, in_use
            )));
        }
        self.config.remove_category(name)?;
        Ok(())
    }

    pub fn default_status(&self, category: &str) -> Result<TaskStatus, RepositoryError> {
        Ok(match self.config.get_status_mode(category)? {
            StatusMode::Bool => TaskStatus::Flag(false),
            StatusMode::Enum => TaskStatus::State(
                self.config
                    .get_statuses(category)?
                    .into_iter()
                    .next()
                    .unwrap_or_default(),
            ),
        })
    }

    /// `T-<n+1>` where `n` is the highest numbered `T-` key in the store.
    pub fn next_key(&self) -> Result<String, RepositoryError> {
        let prefix = format!("{}-", KEY_PREFIX);
        let highest = self
            .backend
            .list()?
            .iter()
            .filter_map(|task| task.key.strip_prefix(&prefix))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let next = highest.checked_add(1).ok_or_else(|| {
            RepositoryError::Validation(format!(
                "no key follows {}{}; pass an explicit key",
                prefix, highest
            ))
        })?;
        Ok(format!("{}{}", prefix, next))
    }

    fn validate(&self, draft: &mut TaskDraft) -> Result<(), RepositoryError> {
        if draft.title.trim().is_empty() {
            return Err(RepositoryError::Validation("title is empty".to_string()));
        }
        if draft.key.trim().is_empty() || draft.key.chars().any(char::is_whitespace) {
            return Err(RepositoryError::Validation(format!(
                "key `{}` must be non-empty and contain no whitespace",
                draft.key
            )));
        }
        if !self.config.has_category(&draft.category)? {
            return Err(ConfigError::UnknownCategory(draft.category.clone()).into());
        }
        match (self.config.get_status_mode(&draft.category)?, &draft.status) {
            (StatusMode::Bool, TaskStatus::Flag(_)) => {}
            (StatusMode::Enum, TaskStatus::State(state)) => {
                let states = self.config.get_statuses(&draft.category)?;
                if !states.contains(state) {
                    return Err(RepositoryError::Validation(format!(
                        "status `{}` is not one of {}",
                        state,
                        states.join(", ")
                    )));
                }
            }
            (mode, status) => {
                return Err(RepositoryError::Validation(format!(
                    "category `{}` uses {} statuses, got `{}`",
                    draft.category, mode, status
                )));
            }
        }
        draft.tags = normalize_tags(&draft.tags);
        Ok(())
    }
}
