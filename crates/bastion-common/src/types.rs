//! Domain primitive types used across the Bastion workspace.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Operating system family the process is running on.
///
/// Classified exactly once per process; see [`Platform::current`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Microsoft Windows.
    Windows,
    /// Linux.
    Linux,
    /// Apple macOS.
    MacOsx,
    /// Anything else (BSDs, illumos, ...).
    Other,
}

static CURRENT: OnceLock<Platform> = OnceLock::new();

impl Platform {
    /// Classifies an OS name as reported by [`std::env::consts::OS`].
    #[must_use]
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Self::Windows,
            "linux" => Self::Linux,
            "macos" => Self::MacOsx,
            _ => Self::Other,
        }
    }

    /// Returns the platform of the running process.
    ///
    /// The classification is computed on first use and cached, so every
    /// caller observes the same answer for the lifetime of the process.
    pub fn current() -> Self {
        *CURRENT.get_or_init(|| Self::from_os(std::env::consts::OS))
    }

    /// Returns whether this is Windows.
    #[must_use]
    pub const fn is_windows(self) -> bool {
        matches!(self, Self::Windows)
    }

    /// Returns whether this is Linux.
    #[must_use]
    pub const fn is_linux(self) -> bool {
        matches!(self, Self::Linux)
    }

    /// Returns whether this is macOS.
    #[must_use]
    pub const fn is_macosx(self) -> bool {
        matches!(self, Self::MacOsx)
    }

    /// Returns whether this is one of the three supported platforms.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::Linux => write!(f, "linux"),
            Self::MacOsx => write!(f, "macosx"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Result of a timed dispatch.
///
/// A timeout is an ordinary outcome, distinct from both a returned value
/// (however falsy) and a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome<T> {
    /// The work finished in time and produced a value.
    Completed(T),
    /// No answer arrived before the timeout elapsed.
    TimedOut,
}

impl<T> DispatchOutcome<T> {
    /// Returns whether the dispatch timed out.
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// Returns the completed value, or `None` on timeout.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::TimedOut => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_os_classifies_known_families() {
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("linux"), Platform::Linux);
        assert_eq!(Platform::from_os("macos"), Platform::MacOsx);
        assert_eq!(Platform::from_os("freebsd"), Platform::Other);
    }

    #[test]
    fn current_is_stable_across_calls() {
        assert_eq!(Platform::current(), Platform::current());
    }

    #[test]
    fn exactly_one_predicate_holds_on_supported_platforms() {
        for platform in [Platform::Windows, Platform::Linux, Platform::MacOsx] {
            let hits = [
                platform.is_windows(),
                platform.is_linux(),
                platform.is_macosx(),
            ]
            .into_iter()
            .filter(|hit| *hit)
            .count();
            assert_eq!(hits, 1, "{platform}");
        }
        assert!(!Platform::Other.is_supported());
    }

    #[test]
    fn platform_serializes_lowercase() {
        let json = serde_json::to_string(&Platform::MacOsx).unwrap();
        assert_eq!(json, "\"macosx\"");
    }

    #[test]
    fn timed_out_is_not_a_falsy_completion() {
        let zero: DispatchOutcome<i32> = DispatchOutcome::Completed(0);
        assert!(!zero.is_timed_out());
        assert_eq!(zero.completed(), Some(0));
        assert_eq!(DispatchOutcome::<i32>::TimedOut.completed(), None);
    }
}
