//! Thread-mode dispatch: run on a worker thread, abandon it on timeout.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use bastion_common::constants::DISPATCH_THREAD_NAME;
use bastion_common::error::{BastionError, Result};
use bastion_common::types::DispatchOutcome;

use super::panic_message;

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

static ABANDONED_WORKERS: AtomicUsize = AtomicUsize::new(0);

/// Returns how many timed-out worker threads are still running.
///
/// Each thread-mode timeout leaves its worker behind; the count drops again
/// when such a worker eventually returns. A steadily growing value means
/// work that never finishes is being dispatched without process isolation.
pub fn abandoned_workers() -> usize {
    ABANDONED_WORKERS.load(Ordering::Acquire)
}

pub(super) fn run<T, W>(work: W, timeout: Option<Duration>) -> Result<DispatchOutcome<T>>
where
    W: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    let state = Arc::new(AtomicU8::new(RUNNING));
    let worker_state = Arc::clone(&state);

    let _worker = std::thread::Builder::new()
        .name(DISPATCH_THREAD_NAME.into())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(work));
            if worker_state
                .compare_exchange(RUNNING, FINISHED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                let _ = ABANDONED_WORKERS.fetch_sub(1, Ordering::AcqRel);
                tracing::debug!("abandoned dispatch worker returned");
                return;
            }
            let _ = tx.send(result);
        })
        .map_err(|e| BastionError::Os {
            operation: "spawn dispatch worker",
            source: e,
        })?;

    let received = match timeout {
        None => rx.recv().ok(),
        Some(limit) => match rx.recv_timeout(limit) {
            Ok(result) => Some(result),
            Err(mpsc::RecvTimeoutError::Disconnected) => None,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Counted before the state flips so the worker's decrement
                // can never run first.
                let _ = ABANDONED_WORKERS.fetch_add(1, Ordering::AcqRel);
                if state
                    .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    tracing::warn!(
                        ?limit,
                        abandoned = abandoned_workers(),
                        "dispatch timed out, worker thread abandoned"
                    );
                    return Ok(DispatchOutcome::TimedOut);
                }
                let _ = ABANDONED_WORKERS.fetch_sub(1, Ordering::AcqRel);
                // Finished right at the deadline; its send is already under way.
                rx.recv().ok()
            }
        },
    };

    match received {
        Some(Ok(value)) => Ok(DispatchOutcome::Completed(value)),
        Some(Err(payload)) => Err(BastionError::WorkPanicked {
            message: panic_message(&*payload),
        }),
        None => Err(BastionError::WorkerLost {
            status: "worker thread exited without a result".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;

    #[test]
    fn abandoned_worker_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let outcome = run(
            move || {
                std::thread::sleep(Duration::from_millis(400));
                flag.store(true, Ordering::SeqCst);
            },
            Some(Duration::from_millis(50)),
        )
        .unwrap();

        assert!(outcome.is_timed_out());
        assert!(abandoned_workers() >= 1);
        std::thread::sleep(Duration::from_millis(800));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn zero_timeout_on_blocked_work_times_out() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let outcome = run(
            move || {
                let _ = release_rx.recv();
                1
            },
            Some(Duration::ZERO),
        )
        .unwrap();
        assert_eq!(outcome, DispatchOutcome::TimedOut);
        release_tx.send(()).unwrap();
    }

    #[test]
    fn no_timeout_waits_for_completion() {
        let outcome = run(
            || {
                std::thread::sleep(Duration::from_millis(100));
                "done"
            },
            None,
        )
        .unwrap();
        assert_eq!(outcome, DispatchOutcome::Completed("done"));
    }

    #[test]
    fn worker_runs_on_named_thread() {
        let outcome = run(
            || std::thread::current().name().map(str::to_string),
            None,
        )
        .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Completed(Some(DISPATCH_THREAD_NAME.to_string()))
        );
    }
}
