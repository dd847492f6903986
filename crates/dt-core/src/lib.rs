//! Device Tuner Core Library
//!
//! On-device diagnostics and kernel tuning for rooted devices:
//! - Privileged shell execution (one-shot and batched)
//! - Root detection
//! - Fact probing with denial memoization
//! - Static and dynamic snapshot builders, plus the background poller
//! - Tunable catalog and the batch applier
//!
//! The binary entry point is in `main.rs`.

pub mod events;
pub mod exit_codes;
pub mod logging;
pub mod platform;
pub mod poller;
pub mod probe;
pub mod props;
pub mod root;
pub mod shell;
pub mod snapshot;
pub mod sysfs;
pub mod tuning;

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
