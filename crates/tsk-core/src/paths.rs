use std::path::{Path, PathBuf};

use thiserror::Error;

pub const CONFIG_FILENAME: &str = ".tskrc";
pub const DATA_DIRNAME: &str = ".tskdata";

/// Environment variables consulted for the home directory, in order.
pub const HOME_VARS: [&str; 2] = ["HOME", "USERPROFILE"];

#[derive(Debug, Error)]
#[error("Unable to resolve home directory: none of {} is set", HOME_VARS.join(", "))]
pub struct HomeDirError;

/// Where the config document lives and which data directory a freshly
/// initialised document points at. Built once per invocation and handed to
/// whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub default_data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(config_file: impl Into<PathBuf>, default_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            default_data_dir: default_data_dir.into(),
        }
    }

    /// `~/.tskrc` and `~/.tskdata`.
    pub fn from_home(home: &Path) -> Self {
        Self::new(home.join(CONFIG_FILENAME), home.join(DATA_DIRNAME))
    }

    pub fn resolve() -> Result<Self, HomeDirError> {
        Self::resolve_with(|name| std::env::var(name).ok())
    }

    /// Like [`AppPaths::resolve`], reading variables through `var`.
    pub fn resolve_with(var: impl Fn(&str) -> Option<String>) -> Result<Self, HomeDirError> {
        home_dir_with(var)
            .map(|home| Self::from_home(&home))
            .ok_or(HomeDirError)
    }
}

/// First of [`HOME_VARS`] that holds a non-blank value.
pub fn home_dir() -> Option<PathBuf> {
    home_dir_with(|name| std::env::var(name).ok())
}

fn home_dir_with(var: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    HOME_VARS.into_iter().find_map(|name| {
        let value = var(name)?;
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    })
}

/// Expands a leading `~` against the home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    let home = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => home_dir(),
        _ => None,
    };
    match home {
        Some(home) if raw == "~" => home,
        Some(home) => home.join(&raw[2..]),
        None => PathBuf::from(raw),
    }
}
