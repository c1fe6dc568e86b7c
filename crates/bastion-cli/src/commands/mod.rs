//! CLI command definitions and dispatch.

pub mod guid;
pub mod launch;
pub mod mkdir;
pub mod platform;
pub mod root;
pub mod run;
pub mod whoami;

use bastion_common::config::BastionConfig;
use bastion_common::constants::{
    BIN_NAME, DEFAULT_RAW_ROOT, DISPATCH_TIMEOUT_ENV_VAR, ROOT_ENV_VAR,
};
use clap::{Parser, Subcommand};

/// Bastion — working root, process launching, and timed dispatch utilities.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Working root; a leading `~` is expanded, the raw form is kept.
    #[arg(long, global = true, env = ROOT_ENV_VAR, default_value = DEFAULT_RAW_ROOT)]
    pub root: String,

    /// Default timeout in seconds for `run` when `--timeout` is not given.
    #[arg(long, global = true, env = DISPATCH_TIMEOUT_ENV_VAR)]
    pub dispatch_timeout: Option<u64>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a path resolved against the working root.
    Root(root::RootArgs),
    /// Create directories (and missing parents) idempotently.
    Mkdir(mkdir::MkdirArgs),
    /// Print the login name of the current user.
    Whoami(whoami::WhoamiArgs),
    /// Show the detected platform.
    Platform(platform::PlatformArgs),
    /// Launch a process and wait for it.
    Launch(launch::LaunchArgs),
    /// Launch a process inside a timed dispatch.
    Run(run::RunArgs),
    /// Print this installation's identifier.
    Guid(guid::GuidArgs),
}

/// Configures the working root and dispatches the parsed command.
///
/// # Errors
///
/// Returns an error if the root cannot be resolved or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config =
        BastionConfig::from_raw_root(cli.root)?.with_dispatch_timeout(cli.dispatch_timeout);
    bastion_runtime::root::apply_config(&config);

    match cli.command {
        Command::Root(args) => root::execute(&args),
        Command::Mkdir(args) => mkdir::execute(&args),
        Command::Whoami(args) => whoami::execute(&args),
        Command::Platform(args) => platform::execute(&args),
        Command::Launch(args) => launch::execute(args),
        Command::Run(args) => run::execute(args, &config),
        Command::Guid(args) => guid::execute(&args),
    }
}
