//! File helpers shared by the config store and the file backends: sidecar
//! advisory locks, atomic replace and the on-disk JSON layout.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

/// `<path>.<suffix>`, keeping the full original file name
/// (`tasks.json` -> `tasks.json.lock`, `.tskrc` -> `.tskrc.lock`).
pub fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Advisory lock held on `<target>.lock` for as long as the guard lives.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    pub fn exclusive(target: &Path) -> io::Result<Self> {
        let (file, path) = open_lock_file(target)?;
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file, path })
    }

    pub fn shared(target: &Path) -> io::Result<Self> {
        let (file, path) = open_lock_file(target)?;
        FileExt::lock_shared(&file)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!("failed to release lock {}: {}", self.path.display(), err);
        }
    }
}

fn open_lock_file(target: &Path) -> io::Result<(File, PathBuf)> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let path = sidecar_path(target, "lock");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;
    Ok((file, path))
}

/// Writes `bytes` to `<path>.tmp`, syncs it and renames it over `path`.
/// On failure the previous contents of `path` are untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = sidecar_path(path, "tmp");
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Four-space indented JSON with a trailing newline.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    out.push(b'\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn sidecar_keeps_full_file_name() {
        assert_eq!(
            sidecar_path(Path::new("/data/tasks.json"), "lock"),
            PathBuf::from("/data/tasks.json.lock")
        );
        assert_eq!(
            sidecar_path(Path::new("/home/u/.tskrc"), "tmp"),
            PathBuf::from("/home/u/.tskrc.tmp")
        );
    }

    #[test]
    fn write_atomic_replaces_contents_and_cleans_temp() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("doc.json");
        fs::write(&path, "old").expect("seed");
        write_atomic(&path, b"new").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "new");
        assert!(!sidecar_path(&path, "tmp").exists());
    }

    #[test]
    fn write_atomic_failure_leaves_target_intact() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("doc.json");
        fs::write(&path, "old").expect("seed");
        // A directory in the temp file's place makes File::create fail.
        fs::create_dir(sidecar_path(&path, "tmp")).expect("block tmp");
        assert!(write_atomic(&path, b"new").is_err());
        assert_eq!(fs::read_to_string(&path).expect("read"), "old");
    }

    #[test]
    fn pretty_json_uses_four_space_indent() {
        let bytes = to_pretty_json(&json!({"a": {"b": 1}})).expect("json");
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(text, "{\n    \"a\": {\n        \"b\": 1\n    }\n}\n");
    }

    #[test]
    fn exclusive_lock_creates_parent_and_lock_file() {
        let temp = TempDir::new().expect("tempdir");
        let target = temp.path().join("nested").join("tasks.json");
        let lock = FileLock::exclusive(&target).expect("lock");
        assert!(lock.path().exists());
        assert_eq!(lock.path(), sidecar_path(&target, "lock"));
    }
}
