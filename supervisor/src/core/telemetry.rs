//! Per-session telemetry record and its merge rules.
//!
//! Two independently-timed producers feed one shared record: the worker-side
//! action hook (after every observable action) and the supervisor's reset at
//! session start. Concurrent hook invocations may race on the artifact, so
//! the merge must be commutative: counters take the maximum, file sets union
//! in first-seen order, last-seen fields follow the newest timestamp. A
//! record belongs to exactly one session; a stale session id invalidates the
//! whole record rather than merging across sessions.

use serde::{Deserialize, Serialize};

/// Fixed context-window budget used to derive [`TelemetryRecord::context_pct`].
pub const CONTEXT_BUDGET_TOKENS: u64 = 200_000;

/// Best-effort activity summary for one worker session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryRecord {
    /// Supervising session this record belongs to.
    pub session_id: String,
    /// Observable worker actions seen so far. Monotonically non-decreasing.
    pub invocations: u64,
    /// Cumulative token usage recovered from the session transcript.
    pub token_estimate: u64,
    /// `token_estimate` as a percentage of [`CONTEXT_BUDGET_TOKENS`], capped at 100.
    pub context_pct: f64,
    /// Files the worker modified, in first-touch order, deduplicated.
    pub modified_files: Vec<String>,
    /// Files the worker read, in first-touch order, deduplicated.
    pub read_files: Vec<String>,
    /// Most recently observed action name.
    pub last_action: Option<String>,
    /// Unix seconds of the most recent update.
    pub updated_at: u64,
}

impl TelemetryRecord {
    /// Fresh zeroed record for a new session.
    pub fn new(session_id: impl Into<String>, now: u64) -> Self {
        Self {
            session_id: session_id.into(),
            invocations: 0,
            token_estimate: 0,
            context_pct: 0.0,
            modified_files: Vec::new(),
            read_files: Vec::new(),
            last_action: None,
            updated_at: now,
        }
    }

    /// Reconcile a record read from disk against the active session: a
    /// matching id is kept, anything else (missing, stale) is replaced by a
    /// fresh record so counts never bleed across sessions.
    pub fn adopt(disk: Option<TelemetryRecord>, session_id: &str, now: u64) -> TelemetryRecord {
        match disk {
            Some(record) if record.session_id == session_id => record,
            _ => TelemetryRecord::new(session_id, now),
        }
    }

    /// Record one observable action.
    pub fn record_action(&mut self, action: &str, now: u64) {
        self.invocations += 1;
        self.last_action = Some(action.to_string());
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Record a file the worker modified.
    pub fn record_modified(&mut self, path: &str) {
        push_unique(&mut self.modified_files, path);
    }

    /// Record a file the worker read.
    pub fn record_read(&mut self, path: &str) {
        push_unique(&mut self.read_files, path);
    }

    /// Fold in a newer cumulative usage figure. Estimates never move backward.
    pub fn record_usage(&mut self, token_estimate: u64) {
        if token_estimate > self.token_estimate {
            self.token_estimate = token_estimate;
            self.context_pct = context_pct(token_estimate);
        }
    }

    /// Merge `other` into `self`. Commutative for records of the same session,
    /// so racing writers cannot corrupt each other's contributions.
    pub fn merge(&mut self, other: &TelemetryRecord) {
        self.invocations = self.invocations.max(other.invocations);
        self.record_usage(other.token_estimate);
        for path in &other.modified_files {
            push_unique(&mut self.modified_files, path);
        }
        for path in &other.read_files {
            push_unique(&mut self.read_files, path);
        }
        if other.updated_at > self.updated_at {
            self.updated_at = other.updated_at;
            if other.last_action.is_some() {
                self.last_action = other.last_action.clone();
            }
        }
    }

    /// One-line usage note injected back into the worker session, if an
    /// estimate has been recovered yet.
    pub fn context_note(&self) -> Option<String> {
        if self.token_estimate == 0 {
            return None;
        }
        Some(format!(
            "Context usage: {:.1}% ({} / {} tokens)",
            self.context_pct, self.token_estimate, CONTEXT_BUDGET_TOKENS
        ))
    }
}

/// Derive the context-usage percentage for a token estimate.
pub fn context_pct(tokens: u64) -> f64 {
    ((tokens as f64 / CONTEXT_BUDGET_TOKENS as f64) * 100.0).min(100.0)
}

fn push_unique(set: &mut Vec<String>, path: &str) {
    if !set.iter().any(|p| p == path) {
        set.push(path.to_string());
    }
}
