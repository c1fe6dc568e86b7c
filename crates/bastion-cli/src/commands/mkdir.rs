//! `bastion mkdir` — Create directories idempotently.

use std::path::PathBuf;

use bastion_runtime::root;
use clap::Args;

/// Arguments for the `mkdir` command.
#[derive(Args, Debug)]
pub struct MkdirArgs {
    /// Directories to create.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Interpret relative paths against the working root.
    #[arg(long)]
    pub in_root: bool,
}

/// Executes the `mkdir` command.
///
/// # Errors
///
/// Returns an error if a path exists as a file or cannot be created.
pub fn execute(args: &MkdirArgs) -> anyhow::Result<()> {
    for path in &args.paths {
        let target = if args.in_root && path.is_relative() {
            root::resolve_path([path])?
        } else {
            path.clone()
        };
        root::ensure_directory(&target)?;
        tracing::info!(path = %target.display(), "directory ready");
    }
    Ok(())
}
