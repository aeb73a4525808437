//! Background progress poller: the interval-timed half of the telemetry pair.
//!
//! Reads the shared artifact on a fixed interval and renders one
//! human-readable progress line per tick. Strictly read-only: the action hook
//! owns all mid-session writes. A malformed or foreign artifact produces no
//! output for that tick and no error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::io::telemetry_store;

/// Interval between progress ticks.
const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Granularity at which a stop request is honored mid-sleep.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Handle to a running progress poller thread.
pub struct ProgressPoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressPoller {
    /// Start polling `telemetry_path` for the given session.
    pub fn start(telemetry_path: PathBuf, session_id: String) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::spawn(move || {
            debug!(session_id, "progress poller started");
            while !stop_flag.load(Ordering::Relaxed) {
                let mut slept = Duration::ZERO;
                while slept < POLL_INTERVAL {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::sleep(STOP_CHECK_INTERVAL);
                    slept += STOP_CHECK_INTERVAL;
                }
                if let Some(line) = progress_line(&telemetry_path, &session_id) {
                    eprintln!("{line}");
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the thread and wait for it to finish. Must be called before the
    /// next session resets the artifact, so a late tick cannot read across
    /// the session boundary.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Render one progress line, or `None` when the artifact is absent,
/// malformed, or belongs to a different session.
pub fn progress_line(telemetry_path: &Path, session_id: &str) -> Option<String> {
    let record = telemetry_store::load_record(telemetry_path)?;
    if record.session_id != session_id {
        return None;
    }
    let last_action = record.last_action.as_deref().unwrap_or("-");
    Some(format!(
        "[{}] {} actions | context {:.0}% | {} files changed | last: {}",
        record.session_id,
        record.invocations,
        record.context_pct,
        record.modified_files.len(),
        last_action,
    ))
}
