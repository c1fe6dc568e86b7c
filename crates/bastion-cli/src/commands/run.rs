//! `bastion run` — Launch a process inside a timed dispatch.
//!
//! Composes the launcher with the dispatcher: the child is started and
//! waited on by the dispatched work, so the timeout bounds the whole run.

use std::time::Duration;

use bastion_common::config::BastionConfig;
use bastion_common::types::DispatchOutcome;
use bastion_runtime::dispatch::{DispatchRequest, Kwargs, dispatch};
use bastion_runtime::process::{self, LaunchSpec, ProcessOutput};
use clap::Args;

use crate::output;

/// Exit code reported when the dispatch times out, as `timeout(1)` does.
const TIMED_OUT_EXIT_CODE: i32 = 124;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Give up after this many seconds (overrides the configured default).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Run the dispatch in a child process that is killed on timeout.
    #[arg(long)]
    pub isolate: bool,

    /// Run the command line through the platform shell.
    #[arg(long)]
    pub shell: bool,

    /// Program and arguments.
    #[arg(trailing_var_arg = true, required = true)]
    pub argv: Vec<String>,
}

/// Launches and waits for `spec`, flattening failures into a message so the
/// result can cross a process boundary.
fn launch_and_collect(spec: LaunchSpec, _kwargs: Kwargs) -> Result<ProcessOutput, String> {
    process::launch(&spec)
        .and_then(process::ProcessHandle::communicate)
        .map_err(|e| e.to_string())
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the dispatch contract is violated or the process
/// cannot be started.
pub fn execute(args: RunArgs, config: &BastionConfig) -> anyhow::Result<()> {
    let timeout = args
        .timeout
        .or(config.dispatch_timeout_secs)
        .map(Duration::from_secs);
    let spec = LaunchSpec::new(args.argv)
        .shell(args.shell)
        .capture_stdout()
        .capture_stderr();

    let request = DispatchRequest::new(launch_and_collect, spec)
        .timeout_opt(timeout)
        .use_process(args.isolate);

    match dispatch(request)? {
        DispatchOutcome::Completed(Ok(out)) => {
            output::forward(&out);
            std::process::exit(output::exit_code(out.exit_code));
        }
        DispatchOutcome::Completed(Err(message)) => anyhow::bail!(message),
        DispatchOutcome::TimedOut => {
            output::diagnostic(output::timed_out_message(timeout, args.isolate));
            std::process::exit(TIMED_OUT_EXIT_CODE);
        }
    }
}
