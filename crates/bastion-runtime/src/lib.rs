//! Runtime utilities for the Bastion host: the working root, child process
//! launching, and timeout-bounded dispatch of work.
//!
//! The three components are independent of each other:
//!
//! - [`root`]: the configured base directory, its private area, and
//!   idempotent directory creation.
//! - [`process`]: a single cross-platform entry point for spawning children.
//! - [`dispatch`]: one-shot work with an optional timeout, in a thread or in
//!   a forked child.
//!
//! [`platform`] classifies the running OS for callers that branch on it.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod dispatch;
pub mod platform;
pub mod process;
pub mod root;
