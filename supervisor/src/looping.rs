//! The supervision loop: one worker session at a time, watched and telemetered,
//! until the backlog is done or the iteration budget runs out.
//!
//! The loop itself is strictly sequential. Within a session, three units of
//! execution run concurrently: the worker process, the stall watchdog thread,
//! and the progress poller thread. They share nothing but the artifacts under
//! `.supervisor/`, which keeps the watchdog free to kill a worker that may be
//! running under a different isolation boundary. Recovery happens at session
//! granularity: a crashed or stalled worker ends its session, and the next
//! session is the retry.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, warn};

use crate::core::decision::{self, Continuation};
use crate::io::instruction::{INSTRUCTION_BUDGET_BYTES, InstructionBuilder, InstructionInputs};
use crate::io::liveness::{self, LivenessStamp};
use crate::io::paths::SupervisorPaths;
use crate::io::poller::ProgressPoller;
use crate::io::watchdog::{self, STALL_TIMEOUT, WatchRequest, WatchdogOutcome};
use crate::io::work_items::WorkItemStore;
use crate::io::worker::{LaunchRequest, Worker, WorkerExit, WorkerHandle};
use crate::io::{goal, now_secs, sandbox, session_log, telemetry_store};
use crate::session::{self, IterationSession, SessionOutcome};

/// Options for a loop run, taken from the CLI surface.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Maximum worker sessions before stopping with a resumable exit.
    pub max_iterations: u32,
    /// Launch the worker under the sandbox enforcement wrapper.
    pub sandbox_enabled: bool,
    /// Model selection passed through to the worker.
    pub model: Option<String>,
    /// Project initialization text: persists the goal document and seeds the
    /// first session's one-time guidance.
    pub init: Option<String>,
    /// One-time request injected into the first session of an existing
    /// project.
    pub request: Option<String>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            sandbox_enabled: true,
            model: None,
            init: None,
            request: None,
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// All work is done (completion sentinel seen, or the store is empty).
    Complete,
    /// The iteration budget ran out with work remaining; rerun to resume.
    BudgetExhausted { iterations: u32, remaining: u64 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub sessions_run: u32,
    pub stop: LoopStop,
}

/// Run worker sessions until the backlog completes, the iteration budget is
/// exhausted, or a fatal startup error occurs.
///
/// Fatal errors (missing goal, empty backlog with nothing to seed it, a
/// worker command that cannot launch) return `Err` before or instead of the
/// affected session; everything else is absorbed into the session outcome and
/// the loop proceeds.
pub fn run_loop<W: Worker, S: WorkItemStore>(
    root: &Path,
    worker: &W,
    store: &S,
    options: &LoopOptions,
) -> Result<LoopOutcome> {
    let paths = SupervisorPaths::new(root);

    if let Some(text) = &options.init {
        goal::persist_goal(&paths.goal_path, text)?;
    }
    let goal = goal::load_goal(&paths.goal_path)?.ok_or_else(|| {
        anyhow!(
            "missing goal document {} (run with --init \"<project goal>\" to create it)",
            paths.goal_path.display()
        )
    })?;

    let mut remaining = store
        .remaining()
        .context("query work-item store at startup")?;
    let mut guidance = options.init.clone().or_else(|| options.request.clone());
    if remaining == 0 && guidance.is_none() {
        bail!(
            "no pending work items and no --init/--request text; \
             pass --request \"<what to do>\" to seed new work"
        );
    }

    info!(
        remaining,
        max_iterations = options.max_iterations,
        sandbox = options.sandbox_enabled,
        "starting supervision loop"
    );

    let mut last_outcome: Option<SessionOutcome> = None;
    let mut sessions_run = 0u32;

    for seq in 1..=options.max_iterations {
        let started_at = now_secs();
        let session_id = format!("s{seq:04}-{started_at}");

        let instruction = InstructionBuilder::new(INSTRUCTION_BUDGET_BYTES).build(
            &InstructionInputs {
                goal: goal.clone(),
                guidance: guidance.take(),
                remaining,
                last_outcome,
            },
        );

        let policy_path = materialize_policy(&paths, seq, options.sandbox_enabled)?;

        // Reset the shared artifacts before launch. The previous session's
        // poller has already been joined, so nothing races this.
        telemetry_store::reset_for_session(&paths.telemetry_path, &session_id, started_at)?;
        liveness::write_stamp(
            &paths.liveness_path,
            &LivenessStamp {
                session_id: session_id.clone(),
                last_action: "session-start".to_string(),
                updated_at: started_at,
            },
        )?;

        let log_path = paths.session_log_path(seq);
        let request = LaunchRequest {
            workdir: paths.root.clone(),
            instruction,
            session_id: session_id.clone(),
            model: options.model.clone(),
            policy_path: policy_path.clone(),
            log_path: log_path.clone(),
        };
        let mut handle = worker
            .launch(&request)
            .with_context(|| format!("launch worker for session {session_id}"))?;

        info!(seq, session_id = %session_id, pid = handle.pid(), "worker session started");

        // Monitors start only once the process handle exists.
        let stop = Arc::new(AtomicBool::new(false));
        let watch_request = WatchRequest {
            pid: handle.pid(),
            liveness_path: paths.liveness_path.clone(),
            timeout: STALL_TIMEOUT,
            session_filter: Some(session_id.clone()),
            stop: stop.clone(),
        };
        let watchdog_thread = thread::spawn(move || watchdog::watch(&watch_request));
        let poller = ProgressPoller::start(paths.telemetry_path.clone(), session_id.clone());

        let wait_result = handle.wait();

        // Stand the monitors down before reconciliation so nothing writes
        // across the next session's artifact reset.
        stop.store(true, Ordering::Relaxed);
        let watchdog_outcome = watchdog_thread.join().unwrap_or(WatchdogOutcome::Exited);
        poller.stop();

        let exit = match wait_result {
            Ok(exit) => exit,
            Err(err) => {
                warn!(seq, err = %err, "failed to collect worker exit, treating as crash");
                WorkerExit {
                    exit_status: None,
                    success: false,
                    log_tail: String::new(),
                }
            }
        };

        let sentinel = decision::sentinel_seen(&exit.log_tail);
        let killed = watchdog_outcome == WatchdogOutcome::Killed;

        match store.reconcile() {
            Ok(report) => debug!(seq, report = %report.trim(), "reconciled work items"),
            Err(err) => warn!(seq, err = %err, "work-item reconciliation failed"),
        }
        match store.remaining() {
            Ok(count) => remaining = count,
            // An unreadable count must not end the loop as success; keep the
            // previous count and let the next session retry.
            Err(err) => warn!(seq, err = %err, "could not refresh remaining count"),
        }

        sessions_run = seq;
        let continuation = decision::decide(sentinel, remaining, seq, options.max_iterations);
        let outcome = session::classify(sentinel, killed, exit.success, continuation);
        last_outcome = Some(outcome);

        let record = IterationSession {
            seq,
            session_id: session_id.clone(),
            started_at,
            log_path: log_path.clone(),
            policy_path,
            outcome,
            exit_status: exit.exit_status,
        };
        session_log::archive_session(&paths, &record)?;

        info!(
            seq,
            session_id = %session_id,
            outcome = ?outcome,
            exit_status = ?exit.exit_status,
            remaining,
            log = %log_path.display(),
            "worker session finished"
        );

        match continuation {
            Continuation::CompleteBySentinel | Continuation::CompleteByStore => {
                return Ok(LoopOutcome {
                    sessions_run,
                    stop: LoopStop::Complete,
                });
            }
            Continuation::BudgetExhausted => {
                return Ok(LoopOutcome {
                    sessions_run,
                    stop: LoopStop::BudgetExhausted {
                        iterations: seq,
                        remaining,
                    },
                });
            }
            Continuation::Continue => {}
        }
    }

    // Only reachable with max_iterations == 0: nothing launched, nothing done.
    Ok(LoopOutcome {
        sessions_run,
        stop: LoopStop::BudgetExhausted {
            iterations: 0,
            remaining,
        },
    })
}

/// Write the per-session sandbox policy, or fall back to unsandboxed
/// execution when the enforcement wrapper is unavailable.
fn materialize_policy(
    paths: &SupervisorPaths,
    seq: u32,
    sandbox_enabled: bool,
) -> Result<Option<std::path::PathBuf>> {
    if !sandbox_enabled {
        return Ok(None);
    }
    if !sandbox::runtime_available() {
        warn!("sandbox runtime unavailable, continuing unsandboxed");
        eprintln!(
            "warning: sandbox runtime '{}' not found; running the worker unsandboxed",
            sandbox::RUNTIME_BIN
        );
        return Ok(None);
    }
    let home = std::env::var("HOME").context("resolve HOME for sandbox policy")?;
    let policy = crate::core::policy::materialize(Path::new(&home), &paths.root);
    let policy_path = paths.session_policy_path(seq);
    sandbox::write_policy(&policy_path, &policy)?;
    Ok(Some(policy_path))
}
