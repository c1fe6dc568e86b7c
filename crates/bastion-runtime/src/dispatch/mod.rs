//! One-shot, timeout-bounded invocation of caller-supplied work.
//!
//! Work runs either on a fresh worker thread (the default) or in a forked
//! child process. The two modes differ only in what happens on timeout:
//!
//! - **Thread mode** abandons the worker. It is never stopped and may keep
//!   running in the background; [`abandoned_workers`] counts such threads.
//!   Repeated timeouts therefore leak threads. Callers that need the work to
//!   actually stop must opt into process mode.
//! - **Process mode** kills the child's whole process group and reaps it.
//!   The result crosses the boundary as JSON, so the result type must
//!   implement [`Serialize`] and [`DeserializeOwned`].
//!
//! A timeout is reported as [`DispatchOutcome::TimedOut`], never as an error.
//! Panics inside the work surface as [`BastionError::WorkPanicked`].

mod isolated;
mod thread;

use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

use bastion_common::error::{BastionError, Result};
use bastion_common::types::DispatchOutcome;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use thread::abandoned_workers;

/// Named arguments passed alongside the positional ones.
pub type Kwargs = BTreeMap<String, serde_json::Value>;

/// A single unit of work and how to run it.
///
/// Every container is optional so that an incomplete request can be
/// expressed and rejected by [`dispatch`] before anything runs.
#[derive(Debug, Clone)]
pub struct DispatchRequest<F, A, K = Kwargs> {
    /// The work itself, called as `work(args, kwargs)`.
    pub work: Option<F>,
    /// Positional arguments.
    pub args: Option<A>,
    /// Named arguments.
    pub kwargs: Option<K>,
    /// Wall-clock limit; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Run in a child process instead of a thread.
    pub use_process: bool,
}

impl<F, A, K> Default for DispatchRequest<F, A, K> {
    fn default() -> Self {
        Self {
            work: None,
            args: None,
            kwargs: None,
            timeout: None,
            use_process: false,
        }
    }
}

impl<F, A, K: Default> DispatchRequest<F, A, K> {
    /// Creates a thread-mode request without a timeout and with default
    /// named arguments.
    #[must_use]
    pub fn new(work: F, args: A) -> Self {
        Self {
            work: Some(work),
            args: Some(args),
            kwargs: Some(K::default()),
            ..Self::default()
        }
    }
}

impl<F, A, K> DispatchRequest<F, A, K> {
    /// Replaces the named arguments.
    #[must_use]
    pub fn kwargs(mut self, kwargs: K) -> Self {
        self.kwargs = Some(kwargs);
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets or clears the timeout.
    #[must_use]
    pub fn timeout_opt(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Chooses between process and thread isolation.
    #[must_use]
    pub fn use_process(mut self, use_process: bool) -> Self {
        self.use_process = use_process;
        self
    }
}

/// Runs the requested work once and waits for it, up to the timeout.
///
/// The calling thread blocks until the work returns or the timeout elapses,
/// whichever comes first.
///
/// # Errors
///
/// - [`BastionError::InvalidDispatch`] if the work, positional arguments, or
///   named arguments are absent, or if a process-mode result fails to
///   serialize.
/// - [`BastionError::WorkPanicked`] if the work panics.
/// - [`BastionError::WorkerLost`] if a child process dies without answering.
/// - [`BastionError::UnsupportedPlatform`] for process mode on platforms
///   without `fork(2)`.
pub fn dispatch<F, A, K, T>(request: DispatchRequest<F, A, K>) -> Result<DispatchOutcome<T>>
where
    F: FnOnce(A, K) -> T + Send + 'static,
    A: Send + 'static,
    K: Send + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
{
    let DispatchRequest {
        work,
        args,
        kwargs,
        timeout,
        use_process,
    } = request;

    let work = work.ok_or_else(|| BastionError::invalid_dispatch("no work was supplied"))?;
    let args = args.ok_or_else(|| BastionError::invalid_dispatch("positional arguments are absent"))?;
    let kwargs = kwargs.ok_or_else(|| BastionError::invalid_dispatch("named arguments are absent"))?;

    tracing::info!(?timeout, use_process, "dispatching work");
    let call = move || work(args, kwargs);
    if use_process {
        isolated::run(call, timeout)
    } else {
        thread::run(call, timeout)
    }
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
