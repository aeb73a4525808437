//! Test-only scripted collaborators and project scaffolding.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::io::paths::SupervisorPaths;
use crate::io::work_items::WorkItemStore;
use crate::io::worker::{LaunchRequest, Worker, WorkerExit, WorkerHandle};
use crate::session::IterationSession;

/// One scripted worker session outcome.
#[derive(Debug, Clone)]
pub struct ScriptedExit {
    pub log: String,
    pub exit_status: Option<i32>,
}

impl ScriptedExit {
    /// Clean exit with the given captured output.
    pub fn ok(log: &str) -> Self {
        Self {
            log: log.to_string(),
            exit_status: Some(0),
        }
    }

    /// Failed exit with the given code and captured output.
    pub fn failed(code: i32, log: &str) -> Self {
        Self {
            log: log.to_string(),
            exit_status: Some(code),
        }
    }
}

/// Worker that replays scripted exits without spawning processes.
pub struct ScriptedWorker {
    script: RefCell<VecDeque<ScriptedExit>>,
    instructions: RefCell<Vec<String>>,
}

impl ScriptedWorker {
    pub fn new(script: Vec<ScriptedExit>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            instructions: RefCell::new(Vec::new()),
        }
    }

    /// Number of sessions launched so far.
    pub fn launches(&self) -> usize {
        self.instructions.borrow().len()
    }

    /// Instruction payloads received, in launch order.
    pub fn instructions(&self) -> Vec<String> {
        self.instructions.borrow().clone()
    }
}

impl Worker for ScriptedWorker {
    type Handle = ScriptedHandle;

    fn launch(&self, request: &LaunchRequest) -> Result<ScriptedHandle> {
        let exit = self
            .script
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted worker exhausted"))?;
        self.instructions
            .borrow_mut()
            .push(request.instruction.clone());
        Ok(ScriptedHandle {
            exit,
            log_path: request.log_path.clone(),
        })
    }
}

/// Handle for a scripted session: writes the scripted log on wait.
pub struct ScriptedHandle {
    exit: ScriptedExit,
    log_path: PathBuf,
}

impl WorkerHandle for ScriptedHandle {
    fn pid(&self) -> u32 {
        // Our own pid: alive for the watchdog's probes, reaped never.
        std::process::id()
    }

    fn wait(&mut self) -> Result<WorkerExit> {
        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.log_path, &self.exit.log)?;
        Ok(WorkerExit {
            exit_status: self.exit.exit_status,
            success: self.exit.exit_status == Some(0),
            log_tail: self.exit.log.clone(),
        })
    }
}

/// Store that replays scripted remaining counts and records reconcile calls.
pub struct ScriptedStore {
    remaining: RefCell<VecDeque<u64>>,
    last_remaining: Cell<u64>,
    reconcile_calls: Cell<u32>,
}

impl ScriptedStore {
    /// Counts returned by successive `remaining()` calls; the last value
    /// repeats once the script runs out.
    pub fn with_remaining(counts: Vec<u64>) -> Self {
        let last = counts.last().copied().unwrap_or(0);
        Self {
            remaining: RefCell::new(counts.into()),
            last_remaining: Cell::new(last),
            reconcile_calls: Cell::new(0),
        }
    }

    pub fn reconcile_calls(&self) -> u32 {
        self.reconcile_calls.get()
    }
}

impl WorkItemStore for ScriptedStore {
    fn remaining(&self) -> Result<u64> {
        match self.remaining.borrow_mut().pop_front() {
            Some(count) => {
                self.last_remaining.set(count);
                Ok(count)
            }
            None => Ok(self.last_remaining.get()),
        }
    }

    fn reconcile(&self) -> Result<String> {
        self.reconcile_calls.set(self.reconcile_calls.get() + 1);
        Ok("reconciled".to_string())
    }
}

/// Temporary project directory with `.supervisor/` helpers.
pub struct TestProject {
    temp: tempfile::TempDir,
}

impl TestProject {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            temp: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn goal_path(&self) -> PathBuf {
        SupervisorPaths::new(self.root()).goal_path
    }

    /// Seed the goal document, as `--init` would have on a previous run.
    pub fn write_goal(&self, text: &str) {
        let path = self.goal_path();
        fs::create_dir_all(path.parent().expect("goal parent")).expect("create state dir");
        fs::write(&path, format!("{text}\n")).expect("write goal");
    }

    /// Load a session's archived record.
    pub fn read_session_meta(&self, seq: u32) -> IterationSession {
        let path = SupervisorPaths::new(self.root()).session_meta_path(seq);
        let contents = fs::read_to_string(&path).expect("read session meta");
        serde_json::from_str(&contents).expect("parse session meta")
    }
}
