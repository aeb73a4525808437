//! Side-effecting adapters for the supervisor.

pub mod goal;
pub mod instruction;
pub mod liveness;
pub mod paths;
pub mod poller;
pub mod process;
pub mod sandbox;
pub mod session_log;
pub mod telemetry_store;
pub mod watchdog;
pub mod work_items;
pub mod worker;

/// Current time as unix seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
