//! `bastion guid` — Print this installation's identifier.

use clap::Args;

use crate::output;

/// Arguments for the `guid` command.
#[derive(Args, Debug)]
pub struct GuidArgs {}

/// Executes the `guid` command.
///
/// # Errors
///
/// Returns an error if the identifier file cannot be read or written.
pub fn execute(_args: &GuidArgs) -> anyhow::Result<()> {
    output::line(bastion_runtime::root::global().instance_guid()?);
    Ok(())
}
