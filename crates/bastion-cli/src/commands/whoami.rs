//! `bastion whoami` — Print the current user's login name.

use clap::Args;

use crate::output;

/// Arguments for the `whoami` command.
#[derive(Args, Debug)]
pub struct WhoamiArgs {}

/// Executes the `whoami` command.
///
/// # Errors
///
/// Returns an error if the platform has no user database.
pub fn execute(_args: &WhoamiArgs) -> anyhow::Result<()> {
    output::line(bastion_runtime::platform::current_user()?);
    Ok(())
}
