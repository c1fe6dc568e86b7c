//! `bastion root` — Print a path resolved against the working root.

use bastion_runtime::root;
use clap::Args;

use crate::output;

/// Arguments for the `root` command.
#[derive(Args, Debug)]
pub struct RootArgs {
    /// Path segments to join onto the root.
    pub segments: Vec<String>,

    /// Resolve inside the private area.
    #[arg(long, conflicts_with = "raw")]
    pub private: bool,

    /// Print the root exactly as configured, without expansion.
    #[arg(long)]
    pub raw: bool,
}

/// Executes the `root` command.
///
/// # Errors
///
/// Returns an error if the private area cannot be created.
pub fn execute(args: &RootArgs) -> anyhow::Result<()> {
    if args.raw {
        output::line(root::raw_root()?);
        return Ok(());
    }

    let path = if args.private {
        root::resolve_private_path(&args.segments)?
    } else {
        root::resolve_path(&args.segments)?
    };
    output::line(path.display());
    Ok(())
}
