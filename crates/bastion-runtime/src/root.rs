//! The working root: one base directory every other path resolves against.
//!
//! [`WorkingRoot`] is an ordinary value that can be constructed and passed
//! around explicitly. For hosts that want ambient access, a process-wide
//! instance is exposed through [`global`] and the `*_root` / `resolve_*`
//! free functions.
//!
//! Reconfiguration replaces the resolved and raw forms together under a
//! single write lock; readers never observe a half-updated root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use bastion_common::config::{BastionConfig, raw_form};
use bastion_common::constants::{GUID_FILE_NAME, PRIVATE_DIR_NAME};
use bastion_common::error::{BastionError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct RootState {
    resolved: PathBuf,
    raw: String,
}

/// A reconfigurable base directory with a reserved private area.
#[derive(Debug, Default)]
pub struct WorkingRoot {
    state: RwLock<Option<RootState>>,
}

impl WorkingRoot {
    /// Creates an unconfigured root.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(None),
        }
    }

    /// Creates a root already configured from a [`BastionConfig`].
    #[must_use]
    pub fn from_config(config: &BastionConfig) -> Self {
        let root = Self::new();
        root.configure(&config.root, config.raw_root.clone());
        root
    }

    /// Replaces both the resolved and the raw form of the root.
    ///
    /// `path` is used for every resolution; `raw` is stored verbatim and only
    /// returned by [`raw`](Self::raw). No filesystem check is performed.
    pub fn configure(&self, path: impl Into<PathBuf>, raw: impl Into<String>) {
        let next = RootState {
            resolved: path.into(),
            raw: raw.into(),
        };
        tracing::info!(root = %next.resolved.display(), raw = %next.raw, "working root configured");
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(next);
    }

    /// Returns whether [`configure`](Self::configure) has been called.
    pub fn is_configured(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn snapshot(&self) -> Result<RootState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BastionError::NotConfigured)
    }

    /// Returns the resolved root itself.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::NotConfigured`] before configuration.
    pub fn root(&self) -> Result<PathBuf> {
        Ok(self.snapshot()?.resolved)
    }

    /// Returns the root exactly as it was given, without expansion.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::NotConfigured`] before configuration.
    pub fn raw(&self) -> Result<String> {
        Ok(self.snapshot()?.raw)
    }

    /// Joins `segments` onto the root, in order.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::NotConfigured`] before configuration.
    pub fn path<I, S>(&self, segments: I) -> Result<PathBuf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        Ok(join_all(self.snapshot()?.resolved, segments))
    }

    /// Joins `segments` onto the private area beneath the root.
    ///
    /// The private directory is created if it is missing, so the parent of
    /// a single-segment private path always exists.
    ///
    /// # Errors
    ///
    /// Returns [`BastionError::NotConfigured`] before configuration, or an
    /// error if the private directory cannot be created.
    pub fn private_path<I, S>(&self, segments: I) -> Result<PathBuf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let private = self.snapshot()?.resolved.join(PRIVATE_DIR_NAME);
        ensure_directory(&private)?;
        Ok(join_all(private, segments))
    }

    /// Returns the identifier of this installation, creating it on first use.
    ///
    /// The identifier lives in the private area and is stable for as long as
    /// that file survives.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is unconfigured or the identifier file
    /// cannot be read or written.
    pub fn instance_guid(&self) -> Result<String> {
        let path = self.private_path([GUID_FILE_NAME])?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let existing = content.lines().map(str::trim).find(|l| !l.is_empty());
                if let Some(guid) = existing.and_then(|l| uuid::Uuid::parse_str(l).ok()) {
                    return Ok(guid.to_string());
                }
                tracing::warn!(path = %path.display(), "instance identifier unreadable, regenerating");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(BastionError::Io { path, source: e }),
        }

        let guid = uuid::Uuid::new_v4().to_string();
        std::fs::write(&path, format!("{guid}\n")).map_err(|e| BastionError::Io {
            path: path.clone(),
            source: e,
        })?;
        tracing::info!(path = %path.display(), %guid, "instance identifier created");
        Ok(guid)
    }
}

fn join_all<I, S>(base: PathBuf, segments: I) -> PathBuf
where
    I: IntoIterator<Item = S>,
    S: AsRef<Path>,
{
    segments
        .into_iter()
        .fold(base, |acc, segment| acc.join(segment))
}

/// Creates `path` and any missing parents.
///
/// Succeeds without side effects when `path` already is a directory.
///
/// # Errors
///
/// Returns [`BastionError::NotADirectory`] if `path` exists as something
/// other than a directory, or [`BastionError::Io`] if creation fails.
pub fn ensure_directory(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(BastionError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(BastionError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    }

    std::fs::create_dir_all(path).map_err(|e| BastionError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), "directory created");
    Ok(())
}

static GLOBAL: WorkingRoot = WorkingRoot::new();

/// Returns the process-wide working root.
pub fn global() -> &'static WorkingRoot {
    &GLOBAL
}

/// Configures the process-wide root; the raw form is `path` itself.
pub fn configure_root(path: impl AsRef<Path>) {
    let path = path.as_ref();
    GLOBAL.configure(path, raw_form(path));
}

/// Configures the process-wide root with a separate raw form.
pub fn configure_root_with_raw(path: impl AsRef<Path>, raw: impl Into<String>) {
    GLOBAL.configure(path.as_ref(), raw);
}

/// Configures the process-wide root from a [`BastionConfig`].
pub fn apply_config(config: &BastionConfig) {
    GLOBAL.configure(&config.root, config.raw_root.clone());
}

/// Returns the process-wide root.
///
/// # Errors
///
/// Returns [`BastionError::NotConfigured`] before configuration.
pub fn root_path() -> Result<PathBuf> {
    GLOBAL.root()
}

/// Joins `segments` onto the process-wide root.
///
/// # Errors
///
/// Returns [`BastionError::NotConfigured`] before configuration.
pub fn resolve_path<I, S>(segments: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<Path>,
{
    GLOBAL.path(segments)
}

/// Joins `segments` onto the process-wide private area.
///
/// # Errors
///
/// See [`WorkingRoot::private_path`].
pub fn resolve_private_path<I, S>(segments: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<Path>,
{
    GLOBAL.private_path(segments)
}

/// Returns the process-wide root as originally given.
///
/// # Errors
///
/// Returns [`BastionError::NotConfigured`] before configuration.
pub fn raw_root() -> Result<String> {
    GLOBAL.raw()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_root_refuses_resolution() {
        let root = WorkingRoot::new();
        assert!(!root.is_configured());
        assert!(matches!(root.root(), Err(BastionError::NotConfigured)));
        assert!(matches!(root.raw(), Err(BastionError::NotConfigured)));
        assert!(matches!(root.path(["a"]), Err(BastionError::NotConfigured)));
        assert!(matches!(
            root.private_path(["a"]),
            Err(BastionError::NotConfigured)
        ));
    }

    #[test]
    fn segments_join_in_order() {
        let root = WorkingRoot::new();
        root.configure("/tmp/foo", "/tmp/foo");
        assert_eq!(root.root().unwrap(), PathBuf::from("/tmp/foo"));
        assert_eq!(root.path(["a"]).unwrap(), Path::new("/tmp/foo").join("a"));
        assert_eq!(
            root.path(["a", "b"]).unwrap(),
            Path::new("/tmp/foo").join("a").join("b")
        );
    }

    #[test]
    fn raw_form_is_returned_verbatim() {
        let root = WorkingRoot::new();
        root.configure("/home/user/.x", "~/.x");
        assert_eq!(root.raw().unwrap(), "~/.x");
        assert_eq!(root.root().unwrap(), PathBuf::from("/home/user/.x"));
    }

    #[test]
    fn reconfiguration_replaces_both_forms() {
        let root = WorkingRoot::new();
        root.configure("/first", "~/first");
        root.configure("/second", "/second");
        assert_eq!(root.root().unwrap(), PathBuf::from("/second"));
        assert_eq!(root.raw().unwrap(), "/second");
    }

    #[test]
    fn private_path_lives_under_root_and_parent_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = WorkingRoot::new();
        root.configure(dir.path(), raw_form(dir.path()));

        let guids = root.private_path([GUID_FILE_NAME]).expect("private path");
        assert!(guids.starts_with(dir.path()));
        assert_eq!(guids.parent(), Some(dir.path().join(PRIVATE_DIR_NAME).as_path()));
        assert!(guids.parent().is_some_and(Path::is_dir));
    }

    #[test]
    fn instance_guid_is_stable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = WorkingRoot::new();
        root.configure(dir.path(), raw_form(dir.path()));

        let first = root.instance_guid().expect("first");
        let second = root.instance_guid().expect("second");
        assert_eq!(first, second);
        assert!(uuid::Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn instance_guid_replaces_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = WorkingRoot::new();
        root.configure(dir.path(), raw_form(dir.path()));
        let path = root.private_path([GUID_FILE_NAME]).unwrap();
        std::fs::write(&path, "not a guid\n").unwrap();

        let guid = root.instance_guid().expect("regenerated");
        assert!(uuid::Uuid::parse_str(&guid).is_ok());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), guid);
    }

    #[test]
    fn from_config_uses_both_forms() {
        let config = BastionConfig::from_raw_root("/opt/bastion").unwrap();
        let root = WorkingRoot::from_config(&config);
        assert_eq!(root.root().unwrap(), config.root);
        assert_eq!(root.raw().unwrap(), "/opt/bastion");
    }

    #[test]
    fn ensure_directory_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        ensure_directory(dir.path()).expect("existing dir");
        ensure_directory(dir.path()).expect("again");
        assert!(dir.path().is_dir());
    }

    #[test]
    fn ensure_directory_creates_missing_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b").join("c");
        assert!(!nested.exists());
        ensure_directory(&nested).expect("create nested");
        assert!(nested.is_dir());
    }

    #[test]
    fn ensure_directory_rejects_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();
        let err = ensure_directory(&file).unwrap_err();
        assert!(matches!(err, BastionError::NotADirectory { path } if path == file));
    }
}
