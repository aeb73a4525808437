//! Pure, deterministic supervisor logic. No I/O.

pub mod decision;
pub mod policy;
pub mod telemetry;
