//! Autonomous iteration supervisor for unattended agent work loops.
//!
//! Repeatedly spawns an opaque worker session against a project's work-item
//! backlog, watches it for stalls, aggregates per-session telemetry from two
//! independently-timed producers, and decides after every session whether to
//! continue, stop, or exit resumable. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (telemetry merge rules, the
//!   continuation decision, sandbox policy documents). No I/O, fully testable
//!   in isolation.
//! - **[`io`]**: Side-effecting operations (shared artifacts on disk, child
//!   processes, the watchdog and poller threads). Isolated to enable mocking
//!   in tests.
//!
//! Orchestration modules ([`looping`], [`session`]) coordinate core logic
//! with I/O to implement the CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
