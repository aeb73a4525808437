//! Stall watchdog: force-kills the worker's process group when the liveness
//! file stops updating.
//!
//! The worker is spawned as its own process-group leader, so termination is a
//! single group kill instead of pattern-matching command lines. Killing is
//! best-effort and idempotent; signalling an already-dead tree is a no-op.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use crate::io::liveness;

/// How long the liveness file may go without an attributable update before
/// the worker tree is killed.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Interval between liveness checks.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Granularity at which a stop request is honored mid-sleep.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// The watched process exited (or the supervisor asked us to stand down).
    Exited,
    /// The stall clock fired and the process group was killed.
    Killed,
}

/// Stall accumulator driven by watchdog polls.
///
/// The clock resets on every attributable liveness update and only advances
/// while none is observed. A missing or never-attributable file leaves the
/// baseline at watch start, so the clock still fires from the initial state.
/// Once fired it stays fired: the kill happens exactly once.
#[derive(Debug)]
pub struct StallClock {
    baseline: Instant,
    last_seen: Option<SystemTime>,
    timeout: Duration,
    fired: bool,
}

impl StallClock {
    pub fn new(start: Instant, timeout: Duration) -> Self {
        Self {
            baseline: start,
            last_seen: None,
            timeout,
            fired: false,
        }
    }

    /// Feed one poll observation. `update` is the current attributable mtime,
    /// if any. Returns `true` exactly once, when the stall crosses the
    /// timeout.
    pub fn observe(&mut self, now: Instant, update: Option<SystemTime>) -> bool {
        if self.fired {
            return false;
        }
        if let Some(mtime) = update
            && self.last_seen.is_none_or(|prev| mtime > prev)
        {
            self.last_seen = Some(mtime);
            self.baseline = now;
        }
        if now.duration_since(self.baseline) >= self.timeout {
            self.fired = true;
            return true;
        }
        false
    }

    /// Time accumulated since the last attributable update.
    pub fn stalled_for(&self, now: Instant) -> Duration {
        now.duration_since(self.baseline)
    }
}

/// Parameters for one watch.
#[derive(Debug)]
pub struct WatchRequest {
    /// Process-group leader to watch (and, on stall, to kill).
    pub pid: u32,
    pub liveness_path: PathBuf,
    pub timeout: Duration,
    /// When set, liveness updates only count if the stamp attributes to this
    /// session; anything else is treated as no activity.
    pub session_filter: Option<String>,
    /// Set by the supervisor once the worker has been reaped.
    pub stop: Arc<AtomicBool>,
}

/// Block until the watched process exits or the stall clock fires.
///
/// On stall the entire process group rooted at `pid` is force-killed, once.
pub fn watch(request: &WatchRequest) -> WatchdogOutcome {
    let mut clock = StallClock::new(Instant::now(), request.timeout);
    loop {
        if request.stop.load(Ordering::Relaxed) || !process_alive(request.pid) {
            debug!(pid = request.pid, "watched process gone, standing down");
            return WatchdogOutcome::Exited;
        }

        let update = attributable_mtime(&request.liveness_path, request.session_filter.as_deref());
        let now = Instant::now();
        if clock.observe(now, update) {
            warn!(
                pid = request.pid,
                stalled_secs = clock.stalled_for(now).as_secs(),
                "no attributable liveness updates within timeout, killing worker tree"
            );
            kill_process_group(request.pid);
            return WatchdogOutcome::Killed;
        }

        let mut slept = Duration::ZERO;
        while slept < POLL_INTERVAL {
            if request.stop.load(Ordering::Relaxed) {
                return WatchdogOutcome::Exited;
            }
            thread::sleep(STOP_CHECK_INTERVAL);
            slept += STOP_CHECK_INTERVAL;
        }
    }
}

fn attributable_mtime(path: &Path, filter: Option<&str>) -> Option<SystemTime> {
    let mtime = liveness::modified_at(path)?;
    match filter {
        Some(session_id) if !liveness::attributes_to(path, session_id) => None,
        _ => Some(mtime),
    }
}

/// `kill -0` probe. Shelling out keeps the crate free of raw signal calls.
pub fn process_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Force-kill the whole process group rooted at `pid`, then sweep the root
/// itself in case it escaped its group. Failures mean the tree is already
/// gone.
pub fn kill_process_group(pid: u32) {
    let group = format!("-{pid}");
    if let Err(err) = Command::new("kill").args(["-KILL", "--", &group]).status() {
        warn!(pid, err = %err, "process group kill failed");
    }
    let _ = Command::new("kill")
        .args(["-KILL", "--", &pid.to_string()])
        .status();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::liveness::LivenessStamp;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn clock_fires_exactly_once() {
        let start = Instant::now();
        let mut clock = StallClock::new(start, secs(10));

        assert!(!clock.observe(start + secs(5), None));
        assert!(clock.observe(start + secs(10), None));
        // Terminal: later polls must not re-fire.
        assert!(!clock.observe(start + secs(60), None));
        assert!(!clock.observe(start + secs(600), None));
    }

    #[test]
    fn attributable_update_resets_the_clock() {
        let start = Instant::now();
        let epoch = SystemTime::UNIX_EPOCH;
        let mut clock = StallClock::new(start, secs(10));

        assert!(!clock.observe(start + secs(8), Some(epoch + secs(1))));
        // 8s of quiet would have fired without the reset above.
        assert!(!clock.observe(start + secs(16), None));
        assert!(clock.observe(start + secs(18), None));
    }

    #[test]
    fn unchanged_mtime_does_not_reset_the_clock() {
        let start = Instant::now();
        let epoch = SystemTime::UNIX_EPOCH;
        let mut clock = StallClock::new(start, secs(10));

        let stamp_time = epoch + secs(1);
        assert!(!clock.observe(start + secs(2), Some(stamp_time)));
        // Same mtime observed again: no new activity.
        assert!(!clock.observe(start + secs(8), Some(stamp_time)));
        assert!(clock.observe(start + secs(12), Some(stamp_time)));
    }

    #[test]
    fn missing_file_is_eligible_from_watch_start() {
        let start = Instant::now();
        let mut clock = StallClock::new(start, secs(10));
        // Never any update: fires one timeout after the start baseline.
        assert!(clock.observe(start + secs(10), None));
    }

    #[test]
    fn foreign_session_stamp_does_not_count_as_activity() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("liveness.json");
        liveness::write_stamp(
            &path,
            &LivenessStamp {
                session_id: "s0001-100".to_string(),
                last_action: "Edit".to_string(),
                updated_at: 100,
            },
        )
        .expect("write");

        assert!(attributable_mtime(&path, Some("s0001-100")).is_some());
        assert!(attributable_mtime(&path, Some("s0002-200")).is_none());
        // No filter: any mtime counts.
        assert!(attributable_mtime(&path, None).is_some());
    }

    #[cfg(unix)]
    mod live_process {
        use super::*;
        use std::os::unix::process::CommandExt;

        fn spawn_group_leader(args: &[&str]) -> std::process::Child {
            let mut cmd = Command::new(args[0]);
            cmd.args(&args[1..]).process_group(0);
            cmd.spawn().expect("spawn test child")
        }

        /// A stalled child (no liveness file at all) is killed once the
        /// timeout elapses, and the kill actually takes the process down.
        #[test]
        fn stalled_process_is_killed() {
            let temp = tempfile::tempdir().expect("tempdir");
            let mut child = spawn_group_leader(&["sleep", "30"]);

            let request = WatchRequest {
                pid: child.id(),
                liveness_path: temp.path().join("liveness.json"),
                timeout: Duration::from_millis(300),
                session_filter: Some("s0001-100".to_string()),
                stop: Arc::new(AtomicBool::new(false)),
            };
            let outcome = watch(&request);
            assert_eq!(outcome, WatchdogOutcome::Killed);

            let status = child.wait().expect("wait killed child");
            assert!(!status.success());
        }

        /// Standing down via the stop flag issues no kill.
        #[test]
        fn stop_flag_stands_the_watchdog_down() {
            let temp = tempfile::tempdir().expect("tempdir");
            let mut child = spawn_group_leader(&["sleep", "30"]);

            let stop = Arc::new(AtomicBool::new(true));
            let request = WatchRequest {
                pid: child.id(),
                liveness_path: temp.path().join("liveness.json"),
                timeout: secs(300),
                session_filter: None,
                stop,
            };
            assert_eq!(watch(&request), WatchdogOutcome::Exited);

            // Child is still alive; clean it up ourselves.
            kill_process_group(child.id());
            let _ = child.wait();
        }

        /// A pid that is already gone resolves to Exited immediately.
        #[test]
        fn dead_process_resolves_exited() {
            let temp = tempfile::tempdir().expect("tempdir");
            let mut child = spawn_group_leader(&["true"]);
            let pid = child.id();
            child.wait().expect("reap child");

            let request = WatchRequest {
                pid,
                liveness_path: temp.path().join("liveness.json"),
                timeout: secs(300),
                session_filter: None,
                stop: Arc::new(AtomicBool::new(false)),
            };
            assert_eq!(watch(&request), WatchdogOutcome::Exited);
        }
    }
}
