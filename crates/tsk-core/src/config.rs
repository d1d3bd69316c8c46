//! The per-user configuration document.
//!
//! The document is a single JSON object addressed by dotted paths. Every
//! mutation is write-through: it takes an exclusive lock on the sidecar lock
//! file, re-reads the document from disk, applies the change to that copy,
//! replaces the file atomically and only then swaps the in-memory copy.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::fsio::{self, FileLock};
use crate::keypath::{self, KeyPath, PathError};
use crate::paths::AppPaths;

pub const DEFAULT_CATEGORY: &str = "default";
pub const DEFAULT_STATUSES: [&str; 3] = ["todo", "doing", "done"];

const VERSION_KEY: &str = "system.version";
const MODE_KEY: &str = "system.mode";
const DATA_DIR_KEY: &str = "system.file.dataDirectory";
const CATEGORIES_KEY: &str = "categories";
const DEFAULT_CATEGORY_KEY: &str = "defaultCategory";
const PROPERTIES_KEY: &str = "properties";
const PREFERENCES_KEY: &str = "preferences";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Key {0} not found in config")]
    KeyNotFound(String),
    #[error("Invalid config path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("Invalid value for `{path}`: {reason}")]
    InvalidValue { path: String, reason: String },
    #[error("Config IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    fn from_path(raw: &str, err: PathError) -> Self {
        match err {
            PathError::NotFound(path) => ConfigError::KeyNotFound(path),
            other => ConfigError::InvalidPath {
                path: raw.to_string(),
                reason: other.to_string(),
            },
        }
    }

    fn invalid_value(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        ConfigError::InvalidValue {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Which task backend the document selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemMode {
    File,
}

impl SystemMode {
    pub const ALL: [SystemMode; 1] = [SystemMode::File];

    pub fn as_str(self) -> &'static str {
        match self {
            SystemMode::File => "file",
        }
    }
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SystemMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown system mode `{}`", s))
    }
}

/// How tasks in a category represent completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusMode {
    Bool,
    Enum,
}

impl StatusMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusMode::Bool => "bool",
            StatusMode::Enum => "enum",
        }
    }
}

impl fmt::Display for StatusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" => Ok(StatusMode::Bool),
            "enum" => Ok(StatusMode::Enum),
            other => Err(format!("unknown status mode `{}`", other)),
        }
    }
}

pub fn initial_document(paths: &AppPaths) -> Value {
    json!({
        "system": {
            "version": crate::version(),
            "mode": SystemMode::File,
            "file": {
                "dataDirectory": paths.default_data_dir.to_string_lossy(),
            },
        },
        "categories": [DEFAULT_CATEGORY],
        "defaultCategory": DEFAULT_CATEGORY,
        "properties": {
            DEFAULT_CATEGORY: { "statusMode": StatusMode::Bool },
        },
        "preferences": {
            DEFAULT_CATEGORY: {},
        },
    })
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    document: Value,
}

impl ConfigStore {
    /// Loads the document at `paths.config_file`, creating it when absent.
    /// An existing document gets `system.version` refreshed.
    pub fn open(paths: &AppPaths) -> Result<Self, ConfigError> {
        let path = paths.config_file.clone();
        let _lock = FileLock::exclusive(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        if !path.exists() {
            let document = initial_document(paths);
            write_document(&path, &document)?;
            info!("initialised config at {}", path.display());
            return Ok(Self { path, document });
        }

        let mut document = read_document(&path)?;
        let version = Value::String(crate::version().to_string());
        if lookup_str(&document, VERSION_KEY).ok() != version.as_str() {
            assign(&mut document, VERSION_KEY, version)?;
            write_document(&path, &document)?;
            debug!("refreshed {} in {}", VERSION_KEY, path.display());
        }
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Re-reads the document from disk.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let _lock = self.lock_shared()?;
        self.document = read_document(&self.path)?;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Result<&Value, ConfigError> {
        let key = parse_path(path)?;
        keypath::lookup(&self.document, &key).map_err(|err| ConfigError::from_path(path, err))
    }

    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConfigError> {
        let value = self.get(path)?;
        T::deserialize(value).map_err(|err| ConfigError::invalid_value(path, err))
    }

    pub fn set(&mut self, path: &str, value: Value) -> Result<(), ConfigError> {
        let key = parse_path(path)?;
        self.mutate("set", |doc| {
            keypath::assign(doc, &key, value).map_err(|err| ConfigError::from_path(path, err))?;
            Ok(())
        })
    }

    pub fn remove(&mut self, path: &str) -> Result<Value, ConfigError> {
        let key = parse_path(path)?;
        self.mutate("remove", |doc| {
            keypath::detach(doc, &key).map_err(|err| ConfigError::from_path(path, err))
        })
    }

    pub fn get_mode(&self) -> Result<SystemMode, ConfigError> {
        self.get_as(MODE_KEY)
    }

    pub fn set_mode(&mut self, mode: SystemMode) -> Result<(), ConfigError> {
        self.set(MODE_KEY, json!(mode))
    }

    pub fn get_data_dir(&self) -> Result<PathBuf, ConfigError> {
        self.get_as::<String>(DATA_DIR_KEY).map(PathBuf::from)
    }

    pub fn set_data_dir(&mut self, dir: &Path) -> Result<(), ConfigError> {
        if !dir.is_absolute() {
            return Err(ConfigError::invalid_value(
                DATA_DIR_KEY,
                format!("{} is not an absolute path", dir.display()),
            ));
        }
        self.set(DATA_DIR_KEY, json!(dir.to_string_lossy()))
    }

    pub fn get_categories(&self) -> Result<Vec<String>, ConfigError> {
        categories_of(&self.document)
    }

    pub fn has_category(&self, name: &str) -> Result<bool, ConfigError> {
        Ok(self.get_categories()?.iter().any(|c| c == name))
    }

    /// Appends `name` unless it is already present. Returns whether the
    /// category was added.
    pub fn add_category(&mut self, name: &str) -> Result<bool, ConfigError> {
        validate_category_name(name)?;
        self.mutate("add_category", |doc| insert_category(doc, name))
    }

    /// Removes a category together with its properties and preferences.
    /// The default category and the last remaining category stay.
    pub fn remove_category(&mut self, name: &str) -> Result<(), ConfigError> {
        self.mutate("remove_category", |doc| {
            let mut categories = categories_of(doc)?;
            if !categories.iter().any(|c| c == name) {
                return Err(ConfigError::UnknownCategory(name.to_string()));
            }
            if lookup_str(doc, DEFAULT_CATEGORY_KEY)? == name {
                return Err(ConfigError::invalid_value(
                    CATEGORIES_KEY,
                    format!("`{}` is the default category", name),
                ));
            }
            if categories.len() == 1 {
                return Err(ConfigError::invalid_value(
                    CATEGORIES_KEY,
                    "at least one category is required",
                ));
            }
            categories.retain(|c| c != name);
            assign(doc, CATEGORIES_KEY, json!(categories))?;
            for root in [PROPERTIES_KEY, PREFERENCES_KEY] {
                let key = category_path(root, name, &[])?;
                match keypath::detach(doc, &key) {
                    Ok(_) | Err(PathError::NotFound(_)) => {}
                    Err(err) => return Err(ConfigError::from_path(root, err)),
                }
            }
            Ok(())
        })
    }

    pub fn get_default_category(&self) -> Result<String, ConfigError> {
        self.get_as(DEFAULT_CATEGORY_KEY)
    }

    /// Makes `name` the default, adding it to `categories` first if needed.
    pub fn set_default_category(&mut self, name: &str) -> Result<(), ConfigError> {
        validate_category_name(name)?;
        self.mutate("set_default_category", |doc| {
            insert_category(doc, name)?;
            assign(doc, DEFAULT_CATEGORY_KEY, json!(name))?;
            Ok(())
        })
    }

    pub fn get_status_mode(&self, category: &str) -> Result<StatusMode, ConfigError> {
        ensure_category(&self.document, category)?;
        let key = category_path(PROPERTIES_KEY, category, &["statusMode"])?;
        match keypath::lookup(&self.document, &key) {
            Ok(value) => StatusMode::deserialize(value)
                .map_err(|err| ConfigError::invalid_value(key.to_string(), err)),
            Err(PathError::NotFound(_)) => Ok(StatusMode::Bool),
            Err(err) => Err(ConfigError::from_path(PROPERTIES_KEY, err)),
        }
    }

    pub fn set_status_mode(&mut self, category: &str, mode: StatusMode) -> Result<(), ConfigError> {
        let key = category_path(PROPERTIES_KEY, category, &["statusMode"])?;
        self.mutate("set_status_mode", |doc| {
            ensure_category(doc, category)?;
            keypath::assign(doc, &key, json!(mode))
                .map_err(|err| ConfigError::from_path(PROPERTIES_KEY, err))?;
            Ok(())
        })
    }

    /// Allowed states for `enum` categories; the last one means done.
    pub fn get_statuses(&self, category: &str) -> Result<Vec<String>, ConfigError> {
        ensure_category(&self.document, category)?;
        let key = category_path(PROPERTIES_KEY, category, &["statuses"])?;
        match keypath::lookup(&self.document, &key) {
            Ok(value) => Vec::<String>::deserialize(value)
                .map_err(|err| ConfigError::invalid_value(key.to_string(), err)),
            Err(PathError::NotFound(_)) => {
                Ok(DEFAULT_STATUSES.iter().map(|s| s.to_string()).collect())
            }
            Err(err) => Err(ConfigError::from_path(PROPERTIES_KEY, err)),
        }
    }

    pub fn set_statuses(&mut self, category: &str, statuses: &[String]) -> Result<(), ConfigError> {
        let key = category_path(PROPERTIES_KEY, category, &["statuses"])?;
        if statuses.is_empty() {
            return Err(ConfigError::invalid_value(key.to_string(), "no states given"));
        }
        for (idx, state) in statuses.iter().enumerate() {
            if state.trim().is_empty() {
                return Err(ConfigError::invalid_value(key.to_string(), "empty state name"));
            }
            if statuses[..idx].contains(state) {
                return Err(ConfigError::invalid_value(
                    key.to_string(),
                    format!("duplicate state `{}`", state),
                ));
            }
        }
        self.mutate("set_statuses", |doc| {
            ensure_category(doc, category)?;
            keypath::assign(doc, &key, json!(statuses))
                .map_err(|err| ConfigError::from_path(PROPERTIES_KEY, err))?;
            Ok(())
        })
    }

    /// Preference `key` of `category`, or the whole category map when `key`
    /// is `None`. Missing categories and keys read as `None`.
    pub fn get_preference(&self, category: &str, key: Option<&str>) -> Option<Value> {
        let prefs = self.document.get(PREFERENCES_KEY)?.get(category)?;
        match key {
            None => Some(prefs.clone()),
            Some(key) => prefs.get(key).cloned(),
        }
    }

    pub fn set_preference(&mut self, category: &str, key: &str, value: Value) -> Result<(), ConfigError> {
        let path = category_path(PREFERENCES_KEY, category, &[key])?;
        self.mutate("set_preference", |doc| {
            ensure_category(doc, category)?;
            keypath::assign(doc, &path, value)
                .map_err(|err| ConfigError::from_path(PREFERENCES_KEY, err))?;
            Ok(())
        })
    }

    /// Deep-merges `patch` (`{category: {key: value, ..}, ..}`) into the
    /// preferences tree.
    pub fn merge_preferences(&mut self, patch: &Value) -> Result<(), ConfigError> {
        let entries = patch
            .as_object()
            .ok_or_else(|| ConfigError::invalid_value(PREFERENCES_KEY, "patch must be an object"))?;
        for (category, prefs) in entries {
            if !prefs.is_object() {
                return Err(ConfigError::invalid_value(
                    format!("{}.{}", PREFERENCES_KEY, category),
                    "category preferences must be an object",
                ));
            }
        }
        self.mutate("merge_preferences", |doc| {
            for category in entries.keys() {
                ensure_category(doc, category)?;
            }
            let prefs = preferences_mut(doc)?;
            keypath::merge(prefs, patch);
            Ok(())
        })
    }

    pub fn remove_preference(&mut self, category: &str, key: &str) -> Result<Option<Value>, ConfigError> {
        let path = category_path(PREFERENCES_KEY, category, &[key])?;
        self.mutate("remove_preference", |doc| match keypath::detach(doc, &path) {
            Ok(value) => Ok(Some(value)),
            Err(PathError::NotFound(_)) => Ok(None),
            Err(err) => Err(ConfigError::from_path(PREFERENCES_KEY, err)),
        })
    }

    pub fn clean_preferences(&mut self) -> Result<(), ConfigError> {
        self.set(PREFERENCES_KEY, Value::Object(Map::new()))
    }

    fn mutate<T>(
        &mut self,
        op: &str,
        apply: impl FnOnce(&mut Value) -> Result<T, ConfigError>,
    ) -> Result<T, ConfigError> {
        let _lock = FileLock::exclusive(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut document = read_document(&self.path)?;
        let out = apply(&mut document)?;
        write_document(&self.path, &document)?;
        debug!("config {} persisted to {}", op, self.path.display());
        self.document = document;
        Ok(out)
    }

    fn lock_shared(&self) -> Result<FileLock, ConfigError> {
        FileLock::shared(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn parse_path(raw: &str) -> Result<KeyPath, ConfigError> {
    KeyPath::parse(raw).map_err(|err| ConfigError::from_path(raw, err))
}

fn category_path(root: &str, category: &str, rest: &[&str]) -> Result<KeyPath, ConfigError> {
    let segments = std::iter::once(root)
        .chain(std::iter::once(category))
        .chain(rest.iter().copied());
    KeyPath::from_segments(segments).map_err(|err| ConfigError::from_path(root, err))
}

fn assign(doc: &mut Value, path: &str, value: Value) -> Result<(), ConfigError> {
    let key = parse_path(path)?;
    keypath::assign(doc, &key, value).map_err(|err| ConfigError::from_path(path, err))?;
    Ok(())
}

fn lookup_str<'a>(doc: &'a Value, path: &str) -> Result<&'a str, ConfigError> {
    let key = parse_path(path)?;
    keypath::lookup(doc, &key)
        .map_err(|err| ConfigError::from_path(path, err))?
        .as_str()
        .ok_or_else(|| ConfigError::invalid_value(path, "expected a string"))
}

fn categories_of(doc: &Value) -> Result<Vec<String>, ConfigError> {
    let value = doc
        .get(CATEGORIES_KEY)
        .ok_or_else(|| ConfigError::KeyNotFound(CATEGORIES_KEY.to_string()))?;
    Vec::<String>::deserialize(value).map_err(|err| ConfigError::invalid_value(CATEGORIES_KEY, err))
}

fn ensure_category(doc: &Value, name: &str) -> Result<(), ConfigError> {
    if categories_of(doc)?.iter().any(|c| c == name) {
        Ok(())
    } else {
        Err(ConfigError::UnknownCategory(name.to_string()))
    }
}

fn validate_category_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::invalid_value(CATEGORIES_KEY, "category name is empty"));
    }
    if name.trim() != name {
        return Err(ConfigError::invalid_value(
            CATEGORIES_KEY,
            format!("category `{}` has surrounding whitespace", name),
        ));
    }
    if name.contains('.') {
        return Err(ConfigError::invalid_value(
            CATEGORIES_KEY,
            format!("category `{}` must not contain `.`", name),
        ));
    }
    Ok(())
}

fn insert_category(doc: &mut Value, name: &str) -> Result<bool, ConfigError> {
    let mut categories = categories_of(doc)?;
    if categories.iter().any(|c| c == name) {
        return Ok(false);
    }
    categories.push(name.to_string());
    assign(doc, CATEGORIES_KEY, json!(categories))?;

    let mode_key = category_path(PROPERTIES_KEY, name, &["statusMode"])?;
    if keypath::lookup(doc, &mode_key).is_err() {
        keypath::assign(doc, &mode_key, json!(StatusMode::Bool))
            .map_err(|err| ConfigError::from_path(PROPERTIES_KEY, err))?;
    }
    Ok(true)
}

fn preferences_mut(doc: &mut Value) -> Result<&mut Value, ConfigError> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| ConfigError::invalid_value("<root>", "config document must be an object"))?;
    let prefs = root
        .entry(PREFERENCES_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if !prefs.is_object() {
        return Err(ConfigError::invalid_value(PREFERENCES_KEY, "expected an object"));
    }
    Ok(prefs)
}

fn read_document(path: &Path) -> Result<Value, ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: Value = serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if !document.is_object() {
        return Err(ConfigError::invalid_value("<root>", "config document must be an object"));
    }
    Ok(document)
}

fn write_document(path: &Path, document: &Value) -> Result<(), ConfigError> {
    let bytes = fsio::to_pretty_json(document).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fsio::write_atomic(path, &bytes).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
