//! Formatted output helpers for CLI commands.
//!
//! Every write to the terminal goes through this module.

use std::fmt::Display;
use std::time::Duration;

use bastion_runtime::process::ProcessOutput;

/// Prints one line of command output to stdout.
#[allow(clippy::print_stdout)]
pub fn line(text: impl Display) {
    println!("{text}");
}

/// Prints one diagnostic line to stderr.
#[allow(clippy::print_stderr)]
pub fn diagnostic(text: impl Display) {
    eprintln!("{text}");
}

/// Writes captured child output to our own stdout and stderr.
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn forward(out: &ProcessOutput) {
    if !out.stdout.is_empty() {
        print!("{}", out.stdout);
    }
    if !out.stderr.is_empty() {
        eprint!("{}", out.stderr);
    }
}

/// Message printed when `run` gives up waiting.
#[must_use]
pub fn timed_out_message(timeout: Option<Duration>, isolated: bool) -> String {
    format!(
        "timed out after {}{}",
        format_timeout(timeout),
        if isolated { "" } else { " (child left running)" }
    )
}

/// Maps a child's exit code onto ours; signal deaths become 128.
#[must_use]
pub fn exit_code(code: Option<i32>) -> i32 {
    code.unwrap_or(128)
}

/// Formats a timeout for humans (e.g., "5s", "1m 30s", "none").
#[must_use]
pub fn format_timeout(timeout: Option<Duration>) -> String {
    let Some(timeout) = timeout else {
        return "none".to_string();
    };
    let secs = timeout.as_secs();
    if secs >= 60 {
        let rest = secs % 60;
        if rest == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}m {rest}s", secs / 60)
        }
    } else if secs > 0 {
        format!("{secs}s")
    } else {
        format!("{}ms", timeout.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_passes_through() {
        assert_eq!(exit_code(Some(0)), 0);
        assert_eq!(exit_code(Some(3)), 3);
    }

    #[test]
    fn exit_code_for_signal_death() {
        assert_eq!(exit_code(None), 128);
    }

    #[test]
    fn format_timeout_displays_none() {
        assert_eq!(format_timeout(None), "none");
    }

    #[test]
    fn format_timeout_displays_seconds() {
        assert_eq!(format_timeout(Some(Duration::from_secs(5))), "5s");
    }

    #[test]
    fn format_timeout_displays_minutes() {
        assert_eq!(format_timeout(Some(Duration::from_secs(90))), "1m 30s");
        assert_eq!(format_timeout(Some(Duration::from_secs(120))), "2m");
    }

    #[test]
    fn timed_out_message_notes_leftover_child() {
        let timeout = Some(Duration::from_secs(5));
        assert_eq!(timed_out_message(timeout, true), "timed out after 5s");
        assert_eq!(
            timed_out_message(timeout, false),
            "timed out after 5s (child left running)"
        );
    }

    #[test]
    fn format_timeout_displays_millis() {
        assert_eq!(format_timeout(Some(Duration::from_millis(250))), "250ms");
    }
}
