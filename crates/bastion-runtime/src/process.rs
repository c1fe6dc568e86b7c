//! Cross-platform child process launching.
//!
//! A [`LaunchSpec`] is first resolved into a [`NativeInvocation`] for the
//! target platform, then turned into a [`std::process::Command`]. Keeping
//! the plan as plain data lets callers and tests see exactly what reaches
//! the OS, including whether descriptor closing survived translation.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use bastion_common::error::{BastionError, Result};
use bastion_common::types::Platform;
use serde::{Deserialize, Serialize};

/// Which standard streams are captured through pipes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamSet {
    /// Capture standard output.
    pub stdout: bool,
    /// Capture standard error.
    pub stderr: bool,
}

/// Extra options handed to the native process builder unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeOptions {
    /// Environment variables added to (or overriding) the inherited set.
    pub env: Vec<(String, String)>,
    /// Start from an empty environment instead of inheriting.
    pub env_clear: bool,
    /// Working directory of the child.
    pub current_dir: Option<PathBuf>,
    /// Connect stdin to the null device instead of inheriting it.
    pub null_stdin: bool,
}

/// Portable description of a process to start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Run `argv`, joined by spaces, through the platform shell.
    pub shell: bool,
    /// Keep descriptors other than stdio from reaching the child.
    ///
    /// Dropped silently on platforms without descriptor inheritance control.
    pub close_inherited_fds: bool,
    /// Streams to capture.
    pub captured: StreamSet,
    /// Passthrough options for the native builder.
    pub native: NativeOptions,
}

impl LaunchSpec {
    /// Creates a spec that runs `argv` directly with inherited streams.
    #[must_use]
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Routes the command line through the platform shell.
    #[must_use]
    pub const fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    /// Requests that inherited descriptors be closed in the child.
    #[must_use]
    pub const fn close_inherited_fds(mut self, close: bool) -> Self {
        self.close_inherited_fds = close;
        self
    }

    /// Captures standard output.
    #[must_use]
    pub const fn capture_stdout(mut self) -> Self {
        self.captured.stdout = true;
        self
    }

    /// Captures standard error.
    #[must_use]
    pub const fn capture_stderr(mut self) -> Self {
        self.captured.stderr = true;
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.native.env.push((key.into(), value.into()));
        self
    }

    /// Sets the child's working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.native.current_dir = Some(dir.into());
        self
    }

    /// Connects the child's stdin to the null device.
    #[must_use]
    pub const fn null_stdin(mut self) -> Self {
        self.native.null_stdin = true;
        self
    }
}

/// How a standard stream is wired in the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Shares the caller's stream.
    Inherit,
    /// Connected to a pipe readable by the caller.
    Piped,
    /// Connected to the null device.
    Null,
}

impl StdioMode {
    const fn capture(captured: bool) -> Self {
        if captured { Self::Piped } else { Self::Inherit }
    }

    fn stdio(self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Piped => Stdio::piped(),
            Self::Null => Stdio::null(),
        }
    }
}

/// A [`LaunchSpec`] resolved for one specific platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeInvocation {
    /// Program handed to the OS.
    pub program: String,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Whether descriptor closing is applied in the child.
    pub close_inherited_fds: bool,
    /// Wiring of stdin.
    pub stdin: StdioMode,
    /// Wiring of stdout.
    pub stdout: StdioMode,
    /// Wiring of stderr.
    pub stderr: StdioMode,
}

/// Returns whether `platform` lets a parent control descriptor inheritance.
#[must_use]
pub const fn supports_fd_inheritance_control(platform: Platform) -> bool {
    !platform.is_windows()
}

/// Resolves `spec` for the running platform.
///
/// # Errors
///
/// Returns [`BastionError::InvalidLaunch`] if `argv` is empty.
pub fn plan(spec: &LaunchSpec) -> Result<NativeInvocation> {
    plan_for(spec, Platform::current())
}

/// Resolves `spec` for an explicit platform.
///
/// # Errors
///
/// Returns [`BastionError::InvalidLaunch`] if `argv` is empty.
pub fn plan_for(spec: &LaunchSpec, platform: Platform) -> Result<NativeInvocation> {
    let Some((first, rest)) = spec.argv.split_first() else {
        return Err(BastionError::InvalidLaunch {
            reason: "argv is empty".into(),
        });
    };

    let (program, args) = if spec.shell {
        let line = spec.argv.join(" ");
        if platform.is_windows() {
            let comspec = std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".into());
            (comspec, vec!["/C".to_string(), line])
        } else {
            (posix_shell(), vec!["-c".to_string(), line])
        }
    } else {
        (first.clone(), rest.to_vec())
    };

    let close_inherited_fds = spec.close_inherited_fds && supports_fd_inheritance_control(platform);
    if spec.close_inherited_fds && !close_inherited_fds {
        tracing::debug!(%platform, "descriptor closing unsupported, dropping request");
    }

    Ok(NativeInvocation {
        program,
        args,
        close_inherited_fds,
        stdin: if spec.native.null_stdin {
            StdioMode::Null
        } else {
            StdioMode::Inherit
        },
        stdout: StdioMode::capture(spec.captured.stdout),
        stderr: StdioMode::capture(spec.captured.stderr),
    })
}

fn posix_shell() -> String {
    which::which("sh").map_or_else(
        |_| "/bin/sh".to_string(),
        |path| path.to_string_lossy().into_owned(),
    )
}

impl NativeInvocation {
    /// Builds the native command for this invocation.
    #[must_use]
    pub fn command(&self, native: &NativeOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        let _ = cmd
            .args(&self.args)
            .stdin(self.stdin.stdio())
            .stdout(self.stdout.stdio())
            .stderr(self.stderr.stdio());
        if native.env_clear {
            let _ = cmd.env_clear();
        }
        let _ = cmd.envs(native.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &native.current_dir {
            let _ = cmd.current_dir(dir);
        }
        #[cfg(unix)]
        if self.close_inherited_fds {
            mark_inherited_fds_cloexec(&mut cmd);
        }
        cmd
    }
}

/// Marks every descriptor above stderr close-on-exec in the child.
///
/// Descriptors are flagged rather than closed so the standard library's own
/// exec-error pipe keeps working; exec then drops them all at once.
#[cfg(unix)]
fn mark_inherited_fds_cloexec(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    let limit = open_fd_limit();
    // SAFETY: the hook runs between fork and exec and only issues
    // close_range(2) and fcntl(2), both async-signal-safe. It allocates
    // nothing and takes no locks.
    unsafe {
        let _ = cmd.pre_exec(move || {
            if !cloexec_range_from(3) {
                for fd in 3..limit {
                    let flags = libc::fcntl(fd, libc::F_GETFD);
                    if flags >= 0 && flags & libc::FD_CLOEXEC == 0 {
                        let _ = libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
                    }
                }
            }
            Ok(())
        });
    }
}

/// Flags every descriptor from `first` upward close-on-exec in one call.
/// Returns `false` when the kernel lacks `CLOSE_RANGE_CLOEXEC` (before 5.11).
#[cfg(target_os = "linux")]
fn cloexec_range_from(first: u32) -> bool {
    const CLOSE_RANGE_CLOEXEC: libc::c_uint = 1 << 2;

    // SAFETY: close_range(2) with CLOSE_RANGE_CLOEXEC only changes descriptor flags.
    unsafe { libc::syscall(libc::SYS_close_range, first, u32::MAX, CLOSE_RANGE_CLOEXEC) == 0 }
}

#[cfg(all(unix, not(target_os = "linux")))]
const fn cloexec_range_from(_first: u32) -> bool {
    false
}

#[cfg(unix)]
fn open_fd_limit() -> i32 {
    use bastion_common::constants::MAX_INHERITED_FD_SWEEP;
    use nix::unistd::{SysconfVar, sysconf};

    sysconf(SysconfVar::OPEN_MAX)
        .ok()
        .flatten()
        .and_then(|n| i32::try_from(n).ok())
        .map_or(1024, |n| n.min(MAX_INHERITED_FD_SWEEP))
}

/// Output collected from a finished child.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Captured standard output (empty when not captured).
    pub stdout: String,
    /// Captured standard error (empty when not captured).
    pub stderr: String,
    /// Exit code, or `None` if the child was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    /// Returns whether the child exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// A running child process.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    program: String,
}

impl ProcessHandle {
    /// Returns the OS process ID.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Waits for the child to exit and collects any captured output.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting or reading the pipes fails.
    pub fn communicate(self) -> Result<ProcessOutput> {
        let program = self.program;
        let output = self.child.wait_with_output().map_err(|e| BastionError::Os {
            operation: "wait for child",
            source: e,
        })?;
        tracing::debug!(program = %program, status = %output.status, "process exited");
        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    /// Waits for the child to exit, returning its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().map_err(|e| BastionError::Os {
            operation: "wait for child",
            source: e,
        })?;
        Ok(status.code())
    }

    /// Forcibly terminates the child.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    pub fn kill(&mut self) -> Result<()> {
        self.child.kill().map_err(|e| BastionError::Os {
            operation: "kill child",
            source: e,
        })
    }

    /// Borrows the underlying native handle.
    #[must_use]
    pub const fn native(&self) -> &Child {
        &self.child
    }

    /// Mutably borrows the underlying native handle.
    pub fn native_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Consumes the handle, returning the native one.
    #[must_use]
    pub fn into_native(self) -> Child {
        self.child
    }
}

/// Starts the process described by `spec`.
///
/// No retries and no timeout: compose with
/// [`dispatch`](crate::dispatch::dispatch) for bounded waits.
///
/// # Errors
///
/// Returns [`BastionError::InvalidLaunch`] for an empty `argv` and
/// [`BastionError::Launch`] if the OS refuses to create the process.
pub fn launch(spec: &LaunchSpec) -> Result<ProcessHandle> {
    let invocation = plan(spec)?;
    tracing::info!(
        program = %invocation.program,
        args = ?invocation.args,
        shell = spec.shell,
        close_fds = invocation.close_inherited_fds,
        "launching process"
    );

    let child = invocation
        .command(&spec.native)
        .spawn()
        .map_err(|e| BastionError::Launch {
            program: invocation.program.clone(),
            source: e,
        })?;
    tracing::debug!(pid = child.id(), program = %invocation.program, "process started");

    Ok(ProcessHandle {
        child,
        program: invocation.program,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_argv_maps_to_program_and_args() {
        let spec = LaunchSpec::new(["foo", "bar"]);
        let inv = plan_for(&spec, Platform::Linux).unwrap();
        assert_eq!(inv.program, "foo");
        assert_eq!(inv.args, vec!["bar"]);
        assert!(!inv.close_inherited_fds);
        assert_eq!(inv.stdin, StdioMode::Inherit);
        assert_eq!(inv.stdout, StdioMode::Inherit);
        assert_eq!(inv.stderr, StdioMode::Inherit);
    }

    #[test]
    fn captured_streams_become_pipes() {
        let spec = LaunchSpec::new(["foo"]).capture_stdout().capture_stderr();
        let inv = plan_for(&spec, Platform::MacOsx).unwrap();
        assert_eq!(inv.stdout, StdioMode::Piped);
        assert_eq!(inv.stderr, StdioMode::Piped);
    }

    #[test]
    fn close_fds_kept_on_posix() {
        let spec = LaunchSpec::new(["foo", "bar"]).close_inherited_fds(true);
        assert!(plan_for(&spec, Platform::Linux).unwrap().close_inherited_fds);
        assert!(plan_for(&spec, Platform::MacOsx).unwrap().close_inherited_fds);
    }

    #[test]
    fn close_fds_dropped_on_windows() {
        let spec = LaunchSpec::new(["foo", "bar"])
            .close_inherited_fds(true)
            .capture_stdout()
            .capture_stderr();
        let inv = plan_for(&spec, Platform::Windows).expect("must not fail");
        assert!(!inv.close_inherited_fds);
        assert_eq!(inv.program, "foo");
        assert_eq!(inv.stdout, StdioMode::Piped);
    }

    #[test]
    fn shell_mode_wraps_joined_line() {
        let spec = LaunchSpec::new(["echo", "123"]).shell(true);
        let posix = plan_for(&spec, Platform::Linux).unwrap();
        assert!(posix.program.ends_with("sh"));
        assert_eq!(posix.args, vec!["-c", "echo 123"]);

        let windows = plan_for(&spec, Platform::Windows).unwrap();
        assert_eq!(windows.args, vec!["/C", "echo 123"]);
    }

    #[test]
    fn empty_argv_is_rejected() {
        let err = plan(&LaunchSpec::default()).unwrap_err();
        assert!(matches!(err, BastionError::InvalidLaunch { .. }));
        assert!(launch(&LaunchSpec::default()).is_err());
    }

    #[test]
    fn null_stdin_is_planned() {
        let spec = LaunchSpec::new(["cat"]).null_stdin();
        assert_eq!(plan(&spec).unwrap().stdin, StdioMode::Null);
    }

    #[test]
    fn shell_echo_is_captured() {
        let out = launch(&LaunchSpec::new(["echo", "123"]).shell(true).capture_stdout())
            .expect("launch")
            .communicate()
            .expect("communicate");
        assert_eq!(out.stdout.trim(), "123");
        assert!(out.stderr.is_empty());
        assert!(out.success());
    }

    #[test]
    fn close_fds_is_accepted_with_shell() {
        let spec = LaunchSpec::new(["echo", "1234"])
            .shell(true)
            .close_inherited_fds(true)
            .capture_stdout();
        let out = launch(&spec).expect("launch").communicate().expect("communicate");
        assert_eq!(out.stdout.trim(), "1234");
        assert!(out.stderr.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn direct_echo_is_captured() {
        let out = launch(&LaunchSpec::new(["echo", "123"]).capture_stdout())
            .expect("launch")
            .communicate()
            .expect("communicate");
        assert_eq!(out.stdout.trim(), "123");
        assert!(out.stderr.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn stderr_is_captured_separately() {
        let spec = LaunchSpec::new(["echo oops 1>&2"])
            .shell(true)
            .capture_stdout()
            .capture_stderr();
        let out = launch(&spec).unwrap().communicate().unwrap();
        assert!(out.stdout.is_empty());
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn env_and_current_dir_are_passed_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = LaunchSpec::new(["echo $BASTION_TEST_VAR; pwd"])
            .shell(true)
            .env("BASTION_TEST_VAR", "hello")
            .current_dir(dir.path())
            .capture_stdout();
        let out = launch(&spec).unwrap().communicate().unwrap();
        let mut lines = out.stdout.lines();
        assert_eq!(lines.next(), Some("hello"));
        let cwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(cwd, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_is_reported() {
        let out = launch(&LaunchSpec::new(["exit 3"]).shell(true))
            .unwrap()
            .communicate()
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
        assert!(out.stdout.is_empty());
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let err = launch(&LaunchSpec::new(["/nonexistent/bastion-no-such-binary"])).unwrap_err();
        assert!(matches!(err, BastionError::Launch { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn handle_exposes_native_child() {
        let mut handle = launch(&LaunchSpec::new(["sleep", "5"])).expect("launch");
        assert_eq!(handle.native().id(), handle.pid());
        handle.kill().expect("kill");
        assert_eq!(handle.wait().expect("wait"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn close_fds_hides_inheritable_descriptors() {
        use std::os::fd::AsRawFd;

        let file = tempfile::tempfile().expect("tempfile");
        let fd = file.as_raw_fd();
        // SAFETY: fd is owned by `file`, which outlives this call.
        let cleared = unsafe { libc::fcntl(fd, libc::F_SETFD, 0) };
        assert_eq!(cleared, 0);

        let check = format!("test -e /proc/self/fd/{fd} && echo open || echo closed");
        let run = |close: bool| {
            let spec = LaunchSpec::new([check.as_str()])
                .shell(true)
                .close_inherited_fds(close)
                .capture_stdout();
            launch(&spec).unwrap().communicate().unwrap().stdout
        };

        assert_eq!(run(false).trim(), "open");
        assert_eq!(run(true).trim(), "closed");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn close_fds_reaches_descriptors_beyond_the_sweep_bound() {
        use std::os::fd::AsRawFd;

        use bastion_common::constants::MAX_INHERITED_FD_SWEEP;

        let high = MAX_INHERITED_FD_SWEEP + 4;
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: getrlimit/setrlimit only read and write `limit`.
        unsafe {
            assert_eq!(libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit), 0);
            let wanted = libc::rlim_t::try_from(high + 1).unwrap();
            if limit.rlim_max < wanted {
                return;
            }
            if limit.rlim_cur < wanted {
                limit.rlim_cur = wanted;
                assert_eq!(libc::setrlimit(libc::RLIMIT_NOFILE, &limit), 0);
            }
        }

        let file = tempfile::tempfile().expect("tempfile");
        // SAFETY: dup2 onto an unused slot; the copy is closed below.
        let duped = unsafe { libc::dup2(file.as_raw_fd(), high) };
        assert_eq!(duped, high);

        let check = format!("test -e /proc/self/fd/{high} && echo open || echo closed");
        let spec = LaunchSpec::new([check.as_str()])
            .shell(true)
            .close_inherited_fds(true)
            .capture_stdout();
        let out = launch(&spec).unwrap().communicate().unwrap().stdout;

        // SAFETY: closes only the descriptor duplicated above.
        let _ = unsafe { libc::close(high) };
        assert_eq!(out.trim(), "closed");
    }
}
