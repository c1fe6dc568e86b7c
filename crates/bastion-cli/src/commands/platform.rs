//! `bastion platform` — Show the detected platform.

use bastion_runtime::platform;
use clap::Args;
use serde::Serialize;

use crate::output;

/// Arguments for the `platform` command.
#[derive(Args, Debug)]
pub struct PlatformArgs {
    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct PlatformReport {
    platform: platform::Platform,
    windows: bool,
    linux: bool,
    macosx: bool,
    arch: &'static str,
}

/// Executes the `platform` command.
///
/// # Errors
///
/// Returns an error if JSON encoding fails.
pub fn execute(args: &PlatformArgs) -> anyhow::Result<()> {
    let report = PlatformReport {
        platform: platform::current(),
        windows: platform::is_windows(),
        linux: platform::is_linux(),
        macosx: platform::is_macosx(),
        arch: std::env::consts::ARCH,
    };

    if args.json {
        output::line(serde_json::to_string_pretty(&report)?);
    } else {
        output::line(render_text(&report));
    }
    Ok(())
}

fn render_text(report: &PlatformReport) -> String {
    [
        format!("{:<10} {}", "PLATFORM", report.platform),
        format!("{:<10} {}", "ARCH", report.arch),
        format!("{:<10} {}", "WINDOWS", report.windows),
        format!("{:<10} {}", "LINUX", report.linux),
        format!("{:<10} {}", "MACOSX", report.macosx),
    ]
    .join("\n")
}
