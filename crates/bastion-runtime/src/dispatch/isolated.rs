//! Process-mode dispatch: fork, run the work in the child, relay the result
//! back over a pipe as one length-prefixed JSON frame.
//!
//! The parent stops reading once the frame is complete. Anything the work
//! leaves running (background children holding a copy of the pipe) cannot
//! delay the outcome.

use std::time::Duration;

use bastion_common::error::Result;
use bastion_common::types::DispatchOutcome;
use serde::Serialize;
use serde::de::DeserializeOwned;

#[cfg(unix)]
pub(super) fn run<T, W>(work: W, timeout: Option<Duration>) -> Result<DispatchOutcome<T>>
where
    W: FnOnce() -> T,
    T: Serialize + DeserializeOwned,
{
    unix::run(work, timeout)
}

#[cfg(not(unix))]
pub(super) fn run<T, W>(_work: W, _timeout: Option<Duration>) -> Result<DispatchOutcome<T>>
where
    W: FnOnce() -> T,
    T: Serialize + DeserializeOwned,
{
    Err(bastion_common::error::BastionError::UnsupportedPlatform {
        facility: "process-isolated dispatch",
        platform: bastion_common::types::Platform::current(),
    })
}

#[cfg(unix)]
mod unix {
    use std::fs::File;
    use std::io::{ErrorKind, Read, Write};
    use std::os::fd::OwnedFd;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::mpsc;
    use std::time::Duration;

    use bastion_common::error::{BastionError, Result};
    use bastion_common::types::DispatchOutcome;
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::sys::wait::{WaitStatus, waitpid};
    use nix::unistd::{ForkResult, Pid, fork, setpgid};
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Serialize};

    use super::super::panic_message;

    /// What the child sends back to the parent.
    #[derive(Debug, Serialize, Deserialize)]
    enum Relay<T> {
        Value(T),
        Panicked(String),
        Unserializable(String),
    }

    /// Size of the big-endian length header preceding the JSON payload.
    const FRAME_HEADER_LEN: usize = 8;

    fn os_error(operation: &'static str, errno: Errno) -> BastionError {
        BastionError::Os {
            operation,
            source: errno.into(),
        }
    }

    /// Creates the result pipe with both ends close-on-exec, so programs the
    /// work executes never hold the write end.
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    fn relay_pipe() -> Result<(OwnedFd, OwnedFd)> {
        nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC).map_err(|e| os_error("pipe2", e))
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    fn relay_pipe() -> Result<(OwnedFd, OwnedFd)> {
        use std::os::fd::AsRawFd;

        let (read_end, write_end) = nix::unistd::pipe().map_err(|e| os_error("pipe", e))?;
        for fd in [&read_end, &write_end] {
            // SAFETY: fcntl on a descriptor we own; F_SETFD only touches its flags.
            if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
                return Err(os_error("fcntl", Errno::last()));
            }
        }
        Ok((read_end, write_end))
    }

    /// Prefixes `payload` with its length.
    pub(super) fn frame(payload: &[u8]) -> Vec<u8> {
        let mut framed = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        framed.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        framed.extend_from_slice(payload);
        framed
    }

    /// Reads exactly one frame. `None` means the writer went away before a
    /// complete frame arrived.
    pub(super) fn read_frame(reader: &mut impl Read) -> std::io::Result<Option<Vec<u8>>> {
        let mut header = [0_u8; FRAME_HEADER_LEN];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = usize::try_from(u64::from_be_bytes(header))
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        let mut payload = vec![0_u8; len];
        match reader.read_exact(&mut payload) {
            Ok(()) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(super) fn run<T, W>(work: W, timeout: Option<Duration>) -> Result<DispatchOutcome<T>>
    where
        W: FnOnce() -> T,
        T: Serialize + DeserializeOwned,
    {
        let (read_end, write_end) = relay_pipe()?;

        // SAFETY: the child only runs the caller's work, writes to its end
        // of the pipe, and leaves through _exit(2); it never returns into
        // the caller's stack.
        match unsafe { fork() }.map_err(|e| os_error("fork", e))? {
            ForkResult::Child => {
                drop(read_end);
                child_main(work, write_end)
            }
            ForkResult::Parent { child } => {
                drop(write_end);
                // Also done by the child; whichever runs first wins the race.
                let _ = setpgid(child, child);
                tracing::debug!(pid = child.as_raw(), "isolated worker forked");
                wait_for_child(child, read_end, timeout)
            }
        }
    }

    fn child_main<T, W>(work: W, channel: OwnedFd) -> !
    where
        W: FnOnce() -> T,
        T: Serialize,
    {
        let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));

        let relay = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(value) => Relay::Value(value),
            Err(payload) => Relay::Panicked(panic_message(&*payload)),
        };
        let payload = serde_json::to_vec(&relay)
            .or_else(|e| serde_json::to_vec(&Relay::<T>::Unserializable(e.to_string())));

        let mut file = File::from(channel);
        let code = match payload {
            Ok(bytes) if file.write_all(&frame(&bytes)).is_ok() => 0,
            _ => 1,
        };
        drop(file);

        // SAFETY: _exit(2) skips atexit handlers and destructors copied from
        // the parent, which belong to the parent and must not run here.
        unsafe { libc::_exit(code) }
    }

    fn wait_for_child<T>(
        child: Pid,
        channel: OwnedFd,
        timeout: Option<Duration>,
    ) -> Result<DispatchOutcome<T>>
    where
        T: DeserializeOwned,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let reader = std::thread::Builder::new()
            .name("bastion-relay".into())
            .spawn(move || {
                let mut file = File::from(channel);
                let _ = tx.send(read_frame(&mut file));
            });
        if let Err(e) = reader {
            terminate(child);
            return Err(BastionError::Os {
                operation: "spawn relay thread",
                source: e,
            });
        }

        let received = match timeout {
            None => rx.recv().ok(),
            Some(limit) => match rx.recv_timeout(limit) {
                Ok(read) => Some(read),
                Err(mpsc::RecvTimeoutError::Disconnected) => None,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    terminate(child);
                    tracing::warn!(pid = child.as_raw(), ?limit, "isolated dispatch timed out, worker killed");
                    return Ok(DispatchOutcome::TimedOut);
                }
            },
        };

        let status = reap(child)?;
        let bytes = match received {
            Some(Ok(Some(bytes))) => bytes,
            Some(Err(e)) => {
                return Err(BastionError::Os {
                    operation: "read dispatch result",
                    source: e,
                });
            }
            Some(Ok(None)) | None => {
                return Err(BastionError::WorkerLost {
                    status: describe(status),
                });
            }
        };

        match serde_json::from_slice::<Relay<T>>(&bytes)? {
            Relay::Value(value) => {
                tracing::debug!(pid = child.as_raw(), "isolated worker completed");
                Ok(DispatchOutcome::Completed(value))
            }
            Relay::Panicked(message) => Err(BastionError::WorkPanicked { message }),
            Relay::Unserializable(reason) => Err(BastionError::invalid_dispatch(format!(
                "result cannot cross the process boundary: {reason}"
            ))),
        }
    }

    /// Kills the child's process group (falling back to the child alone)
    /// and reaps it.
    fn terminate(child: Pid) {
        if killpg(child, Signal::SIGKILL).is_err() {
            let _ = kill(child, Signal::SIGKILL);
        }
        let _ = reap(child);
    }

    fn reap(child: Pid) -> Result<WaitStatus> {
        loop {
            match waitpid(child, None) {
                Err(Errno::EINTR) => {}
                other => return other.map_err(|e| os_error("waitpid", e)),
            }
        }
    }

    fn describe(status: WaitStatus) -> String {
        match status {
            WaitStatus::Exited(_, code) => format!("exit code {code}"),
            WaitStatus::Signaled(_, signal, _) => format!("killed by {signal}"),
            other => format!("{other:?}"),
        }
    }
}
