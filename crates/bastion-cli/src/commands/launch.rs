//! `bastion launch` — Launch a process and wait for it.

use bastion_runtime::process::{self, LaunchSpec};
use clap::Args;

use crate::output;

/// Arguments for the `launch` command.
#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct LaunchArgs {
    /// Run the command line through the platform shell.
    #[arg(long)]
    pub shell: bool,

    /// Keep inherited descriptors from reaching the child (ignored where unsupported).
    #[arg(long)]
    pub close_fds: bool,

    /// Capture standard output instead of inheriting it.
    #[arg(long)]
    pub capture_stdout: bool,

    /// Capture standard error instead of inheriting it.
    #[arg(long)]
    pub capture_stderr: bool,

    /// Program and arguments.
    #[arg(trailing_var_arg = true, required = true)]
    pub argv: Vec<String>,
}

impl LaunchArgs {
    fn spec(self) -> LaunchSpec {
        let mut spec = LaunchSpec::new(self.argv)
            .shell(self.shell)
            .close_inherited_fds(self.close_fds);
        spec.captured.stdout = self.capture_stdout;
        spec.captured.stderr = self.capture_stderr;
        spec
    }
}

/// Executes the `launch` command.
///
/// Forwards any captured output and exits with the child's exit code.
///
/// # Errors
///
/// Returns an error if the process cannot be started or waited on.
pub fn execute(args: LaunchArgs) -> anyhow::Result<()> {
    let spec = args.spec();
    let handle = process::launch(&spec)?;
    tracing::debug!(pid = handle.pid(), "waiting for child");
    let out = handle.communicate()?;

    output::forward(&out);
    std::process::exit(output::exit_code(out.exit_code));
}
