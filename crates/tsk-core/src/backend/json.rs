//! Single-file JSON task store.
//!
//! All tasks of a data directory live in `tasks.json` as one array. Reads
//! take a shared lock; every mutation takes the exclusive lock, loads the
//! whole array, changes it in memory and replaces the file atomically.
//! Keys are unique across the whole file, whatever their category, since
//! lookups go by key alone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::backend::{BackendError, TaskBackend};
use crate::fsio::{self, FileLock};
use crate::task::{Task, TaskDraft};

pub const TASKS_FILENAME: &str = "tasks.json";

#[derive(Debug, Clone)]
pub struct JsonTaskBackend {
    data_dir: PathBuf,
    path: PathBuf,
}

impl JsonTaskBackend {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let path = data_dir.join(TASKS_FILENAME);
        Self { data_dir, path }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn storage_error(&self, source: io::Error) -> BackendError {
        BackendError::Storage {
            path: self.path.clone(),
            source,
        }
    }

    fn read_tasks(&self) -> Result<Vec<Task>, BackendError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.storage_error(err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| BackendError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_tasks(&self, tasks: &[Task]) -> Result<(), BackendError> {
        let bytes = fsio::to_pretty_json(tasks).map_err(|source| BackendError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        fsio::write_atomic(&self.path, &bytes).map_err(|err| self.storage_error(err))
    }

    fn snapshot(&self) -> Result<Vec<Task>, BackendError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let _lock = FileLock::shared(&self.path).map_err(|err| self.storage_error(err))?;
        self.read_tasks()
    }

    fn modify<T>(
        &self,
        op: &str,
        apply: impl FnOnce(&mut Vec<Task>) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let _lock = FileLock::exclusive(&self.path).map_err(|err| self.storage_error(err))?;
        let mut tasks = self.read_tasks()?;
        let out = apply(&mut tasks)?;
        self.write_tasks(&tasks)?;
        debug!("task {} persisted to {} ({} tasks)", op, self.path.display(), tasks.len());
        Ok(out)
    }
}

fn position(tasks: &[Task], key: &str) -> Result<usize, BackendError> {
    tasks
        .iter()
        .position(|task| task.key == key)
        .ok_or_else(|| BackendError::NotFound(key.to_string()))
}

impl TaskBackend for JsonTaskBackend {
    fn add(&self, draft: TaskDraft) -> Result<Task, BackendError> {
        self.modify("add", |tasks| {
            if tasks.iter().any(|task| task.key == draft.key) {
                return Err(BackendError::DuplicateKey(draft.key));
            }
            let task = Task::create(draft, Utc::now());
            tasks.push(task.clone());
            Ok(task)
        })
    }

    fn get(&self, key: &str) -> Result<Task, BackendError> {
        let tasks = self.snapshot()?;
        let idx = position(&tasks, key)?;
        Ok(tasks[idx].clone())
    }

    fn list(&self) -> Result<Vec<Task>, BackendError> {
        self.snapshot()
    }

    fn update(&self, key: &str, draft: TaskDraft) -> Result<Task, BackendError> {
        self.modify("update", |tasks| {
            let idx = position(tasks, key)?;
            if draft.key != key && tasks.iter().any(|task| task.key == draft.key) {
                return Err(BackendError::DuplicateKey(draft.key));
            }
            let task = &mut tasks[idx];
            task.apply(draft, Utc::now());
            Ok(task.clone())
        })
    }

    fn delete(&self, key: &str) -> Result<Task, BackendError> {
        self.modify("delete", |tasks| {
            let idx = position(tasks, key)?;
            Ok(tasks.remove(idx))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn draft(key: &str, title: &str) -> TaskDraft {
        TaskDraft {
            key: key.to_string(),
            title: title.to_string(),
            category: "default".to_string(),
            ..TaskDraft::default()
        }
    }

    #[test]
    fn missing_file_lists_empty() {
        let temp = TempDir::new().expect("tempdir");
        let backend = JsonTaskBackend::new(temp.path().join("data"));
        assert!(backend.list().expect("list").is_empty());
        assert!(!backend.data_dir().exists());
    }

    #[test]
    fn add_creates_data_dir_and_file() {
        let temp = TempDir::new().expect("tempdir");
        let backend = JsonTaskBackend::new(temp.path().join("data"));
        backend.add(draft("T-1", "One")).expect("add");
        assert!(backend.path().exists());
        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(backend.path()).expect("read")).expect("json");
        assert_eq!(raw.as_array().map(Vec::len), Some(1));
        assert_eq!(raw[0]["key"], serde_json::json!("T-1"));
    }

    #[test]
    fn list_keeps_insertion_order() {
        let temp = TempDir::new().expect("tempdir");
        let backend = JsonTaskBackend::new(temp.path());
        for key in ["T-3", "T-1", "T-2"] {
            backend.add(draft(key, key)).expect("add");
        }
        let keys: Vec<String> = backend
            .list()
            .expect("list")
            .into_iter()
            .map(|task| task.key)
            .collect();
        assert_eq!(keys, vec!["T-3", "T-1", "T-2"]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let backend = JsonTaskBackend::new(temp.path());
        backend.add(draft("T-1", "One")).expect("add");
        let mut other = draft("T-1", "Other");
        other.category = "work".to_string();
        assert!(matches!(backend.add(other), Err(BackendError::DuplicateKey(key)) if key == "T-1"));
        assert_eq!(backend.list().expect("list").len(), 1);
    }

    #[test]
    fn update_can_rename_but_not_onto_existing_key() {
        let temp = TempDir::new().expect("tempdir");
        let backend = JsonTaskBackend::new(temp.path());
        backend.add(draft("T-1", "One")).expect("add");
        backend.add(draft("T-2", "Two")).expect("add");

        assert!(matches!(
            backend.update("T-1", draft("T-2", "Clash")),
            Err(BackendError::DuplicateKey(_))
        ));

        let renamed = backend.update("T-1", draft("T-9", "Renamed")).expect("rename");
        assert_eq!(renamed.key, "T-9");
        assert!(matches!(backend.get("T-1"), Err(BackendError::NotFound(_))));
        assert_eq!(backend.get("T-9").expect("get").title, "Renamed");
    }

    #[test]
    fn update_and_delete_missing_key_are_not_found() {
        let temp = TempDir::new().expect("tempdir");
        let backend = JsonTaskBackend::new(temp.path());
        assert!(matches!(
            backend.update("T-404", draft("T-404", "x")),
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(backend.delete("T-404"), Err(BackendError::NotFound(_))));
        assert!(matches!(backend.get("T-404"), Err(BackendError::NotFound(_))));
    }

    #[test]
    fn update_preserves_identity() {
        let temp = TempDir::new().expect("tempdir");
        let backend = JsonTaskBackend::new(temp.path());
        let created = backend.add(draft("T-1", "One")).expect("add");
        let mut change = created.draft();
        change.status = TaskStatus::Flag(true);
        let updated = backend.update("T-1", change).expect("update");
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(backend.get("T-1").expect("get"), updated);
    }

    #[test]
    fn corrupt_file_is_left_untouched() {
        let temp = TempDir::new().expect("tempdir");
        let backend = JsonTaskBackend::new(temp.path());
        fs::write(backend.path(), "[{\"key\": ").expect("seed");
        assert!(matches!(backend.list(), Err(BackendError::Corrupt { .. })));
        let err = backend.add(draft("T-1", "One")).unwrap_err();
        assert!(err.is_storage());
        assert_eq!(fs::read_to_string(backend.path()).expect("read"), "[{\"key\": ");
    }

    #[test]
    fn threaded_adds_are_all_kept() {
        const THREADS: usize = 8;
        const TASKS_PER_THREAD: usize = 15;

        let temp = TempDir::new().expect("tempdir");
        let dir = temp.path().join("data");

        std::thread::scope(|scope| {
            for thread in 0..THREADS {
                let dir = &dir;
                scope.spawn(move || {
                    let backend = JsonTaskBackend::new(dir);
                    for n in 0..TASKS_PER_THREAD {
                        let key = format!("W{}-{}", thread, n);
                        backend.add(draft(&key, &key)).expect("add");
                    }
                });
            }
        });

        let tasks = JsonTaskBackend::new(&dir).list().expect("list");
        assert_eq!(tasks.len(), THREADS * TASKS_PER_THREAD);
        let mut ids: Vec<&str> = tasks.iter().map(|task| task.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), tasks.len());
    }
}
