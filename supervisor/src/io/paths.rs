//! Canonical paths under `.supervisor/` for a project root.

use std::path::PathBuf;

/// Resolved supervisor-owned paths for a project.
#[derive(Debug, Clone)]
pub struct SupervisorPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub goal_path: PathBuf,
    pub telemetry_path: PathBuf,
    pub liveness_path: PathBuf,
    pub sessions_dir: PathBuf,
}

impl SupervisorPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(".supervisor");
        Self {
            root: root.clone(),
            state_dir: state_dir.clone(),
            goal_path: state_dir.join("GOAL.md"),
            telemetry_path: state_dir.join("telemetry.json"),
            liveness_path: state_dir.join("liveness.json"),
            sessions_dir: state_dir.join("sessions"),
        }
    }

    /// Directory holding one session's artifacts.
    pub fn session_dir(&self, seq: u32) -> PathBuf {
        self.sessions_dir.join(seq.to_string())
    }

    /// Captured worker output for a session.
    pub fn session_log_path(&self, seq: u32) -> PathBuf {
        self.session_dir(seq).join("session.log")
    }

    /// Archived session record.
    pub fn session_meta_path(&self, seq: u32) -> PathBuf {
        self.session_dir(seq).join("meta.json")
    }

    /// Materialized sandbox policy for a session.
    pub fn session_policy_path(&self, seq: u32) -> PathBuf {
        self.session_dir(seq).join("policy.json")
    }
}
