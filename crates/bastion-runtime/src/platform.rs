//! Platform identity queries.

use bastion_common::error::Result;
pub use bastion_common::types::Platform;

/// Returns the platform of the running process.
pub fn current() -> Platform {
    Platform::current()
}

/// Returns whether the process runs on Windows.
pub fn is_windows() -> bool {
    Platform::current().is_windows()
}

/// Returns whether the process runs on Linux.
pub fn is_linux() -> bool {
    Platform::current().is_linux()
}

/// Returns whether the process runs on macOS.
pub fn is_macosx() -> bool {
    Platform::current().is_macosx()
}

/// Returns the login name of the user owning this process.
///
/// Looks up the real user ID in the system password database.
///
/// # Errors
///
/// Returns an error if the user database has no entry for the current UID.
#[cfg(unix)]
pub fn current_user() -> Result<String> {
    use bastion_common::error::BastionError;
    use nix::unistd::{Uid, User};

    const LOOKUP: &str = "user database lookup";

    let uid = Uid::current();
    match User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.name),
        Ok(None) => Err(BastionError::Os {
            operation: LOOKUP,
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no entry for uid {uid}"),
            ),
        }),
        Err(errno) => Err(BastionError::Os {
            operation: LOOKUP,
            source: errno.into(),
        }),
    }
}

/// Returns the login name of the user owning this process.
///
/// # Errors
///
/// Always returns [`BastionError::UnsupportedPlatform`](bastion_common::error::BastionError::UnsupportedPlatform):
/// there is no password database on this platform.
#[cfg(not(unix))]
pub fn current_user() -> Result<String> {
    Err(bastion_common::error::BastionError::UnsupportedPlatform {
        facility: "user database lookup",
        platform: Platform::current(),
    })
}
