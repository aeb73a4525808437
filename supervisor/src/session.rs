//! Session bookkeeping: one supervised spawn of the worker.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::decision::Continuation;

/// Terminal outcome of one worker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionOutcome {
    /// Worker printed the completion sentinel.
    CompletionSignal,
    /// The loop stopped after this session because the iteration budget ran out.
    IterationBudgetExhausted,
    /// The store reported nothing left after this session.
    NoRemainingWork,
    /// Non-zero exit, or the watchdog killed a stalled worker.
    Crashed,
    /// Clean exit with work remaining; the loop advanced to the next session.
    Advanced,
}

/// One supervised spawn of the worker. Exactly one session is live at a time;
/// the record is archived under `.supervisor/sessions/<seq>/meta.json` when
/// the session ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IterationSession {
    /// Monotonically increasing sequence number, 1-indexed.
    pub seq: u32,
    /// Identifier shared with the telemetry and liveness artifacts.
    pub session_id: String,
    /// Unix seconds at launch.
    pub started_at: u64,
    /// Captured worker output for this session.
    pub log_path: PathBuf,
    /// Materialized sandbox policy, when sandboxing was active.
    pub policy_path: Option<PathBuf>,
    pub outcome: SessionOutcome,
    /// Worker exit code; `None` when the process died to a signal.
    pub exit_status: Option<i32>,
}

/// Classify how a finished session ended.
///
/// The sentinel outranks the exit status: a worker that announces completion
/// and then exits uncleanly still completed. A kill or non-zero exit is a
/// crash; a clean exit takes its outcome from the continuation decision.
pub fn classify(
    sentinel_seen: bool,
    killed: bool,
    clean_exit: bool,
    continuation: Continuation,
) -> SessionOutcome {
    if sentinel_seen {
        return SessionOutcome::CompletionSignal;
    }
    if killed || !clean_exit {
        return SessionOutcome::Crashed;
    }
    match continuation {
        Continuation::CompleteByStore => SessionOutcome::NoRemainingWork,
        Continuation::BudgetExhausted => SessionOutcome::IterationBudgetExhausted,
        _ => SessionOutcome::Advanced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_outranks_exit_status() {
        let outcome = classify(true, false, false, Continuation::CompleteBySentinel);
        assert_eq!(outcome, SessionOutcome::CompletionSignal);
    }

    #[test]
    fn watchdog_kill_is_a_crash() {
        let outcome = classify(false, true, false, Continuation::Continue);
        assert_eq!(outcome, SessionOutcome::Crashed);
    }

    #[test]
    fn crashed_session_at_budget_boundary_stays_crashed() {
        // The loop still exits with the resumable code; the session record
        // keeps the crash.
        let outcome = classify(false, false, false, Continuation::BudgetExhausted);
        assert_eq!(outcome, SessionOutcome::Crashed);
    }

    #[test]
    fn clean_exit_follows_the_continuation() {
        assert_eq!(
            classify(false, false, true, Continuation::CompleteByStore),
            SessionOutcome::NoRemainingWork
        );
        assert_eq!(
            classify(false, false, true, Continuation::BudgetExhausted),
            SessionOutcome::IterationBudgetExhausted
        );
        assert_eq!(
            classify(false, false, true, Continuation::Continue),
            SessionOutcome::Advanced
        );
    }

    #[test]
    fn outcome_serializes_kebab_case() {
        let json = serde_json::to_string(&SessionOutcome::CompletionSignal).expect("serialize");
        assert_eq!(json, "\"completion-signal\"");
        let json = serde_json::to_string(&SessionOutcome::IterationBudgetExhausted)
            .expect("serialize");
        assert_eq!(json, "\"iteration-budget-exhausted\"");
    }
}
