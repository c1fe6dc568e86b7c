//! Global configuration model for the Bastion runtime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_RAW_ROOT, HOME_ENV_VARS, ROOT_ENV_VAR};
use crate::error::{BastionError, Result};

/// Root configuration for the Bastion runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BastionConfig {
    /// Absolute, home-expanded working root.
    pub root: PathBuf,
    /// Working root exactly as the user wrote it (may contain `~`).
    pub raw_root: String,
    /// Default timeout for dispatched work, in seconds.
    pub dispatch_timeout_secs: Option<u64>,
}

impl BastionConfig {
    /// Builds a configuration from a raw root string, expanding `~` and
    /// making the result absolute.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory is needed and unreadable.
    pub fn from_raw_root(raw_root: impl Into<String>) -> Result<Self> {
        let raw_root = raw_root.into();
        let expanded = expand_home(&raw_root);
        let root = std::path::absolute(&expanded).map_err(|e| BastionError::Io {
            path: expanded.clone(),
            source: e,
        })?;
        Ok(Self {
            root,
            raw_root,
            dispatch_timeout_secs: None,
        })
    }

    /// Reads the root from `BASTION_ROOT`, falling back to `~/.bastion`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be made absolute.
    pub fn from_env() -> Result<Self> {
        let raw = std::env::var(ROOT_ENV_VAR).unwrap_or_else(|_| DEFAULT_RAW_ROOT.to_string());
        Self::from_raw_root(raw)
    }

    /// Sets the default dispatch timeout.
    #[must_use]
    pub const fn with_dispatch_timeout(mut self, secs: Option<u64>) -> Self {
        self.dispatch_timeout_secs = secs;
        self
    }
}

/// Expands a leading `~` or `~/` against the user's home directory.
///
/// Paths without a leading tilde, and `~user` forms, are returned unchanged.
/// When no home variable is set the input is returned unchanged as well.
#[must_use]
pub fn expand_home(raw: &str) -> PathBuf {
    if !is_home_relative(raw) {
        return PathBuf::from(raw);
    }
    let rest = raw.get(2..).unwrap_or_default();
    home_dir().map_or_else(|| PathBuf::from(raw), |home| home.join(rest))
}

fn home_dir() -> Option<PathBuf> {
    HOME_ENV_VARS
        .iter()
        .find_map(|var| std::env::var_os(var))
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

/// Returns whether a raw root refers to the user's home directory.
#[must_use]
pub fn is_home_relative(raw: &str) -> bool {
    raw == "~" || raw.starts_with("~/") || raw.starts_with("~\\")
}

/// Renders a path for storage as a raw root.
#[must_use]
pub fn raw_form(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
