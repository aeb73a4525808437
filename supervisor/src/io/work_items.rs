//! Work-item store collaborator adapter.
//!
//! The store owns item CRUD, prioritization and dependency ordering. The
//! supervisor only reads an aggregate remaining count and triggers the
//! post-session reconciliation pass; it never mutates individual items.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::process::run_command_with_timeout;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const OUTPUT_LIMIT_BYTES: usize = 100_000;

/// Aggregate view of the external work-item store.
pub trait WorkItemStore {
    /// Count of items still pending or in progress.
    fn remaining(&self) -> Result<u64>;

    /// Align persisted item status with authoritative commit history:
    /// complete items whose changes were committed, reset items left dangling
    /// in progress. Idempotent by the store's contract. Returns the store's
    /// human-readable report.
    fn reconcile(&self) -> Result<String>;
}

/// Store adapter shelling out to the project's `tools/tasks.py` CLI.
pub struct TasksCliStore {
    workdir: PathBuf,
}

impl TasksCliStore {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    fn run(&self, subcommand: &str) -> Result<String> {
        let mut cmd = Command::new("python3");
        cmd.arg("tools/tasks.py")
            .arg(subcommand)
            .current_dir(&self.workdir);
        let output = run_command_with_timeout(cmd, None, COMMAND_TIMEOUT, OUTPUT_LIMIT_BYTES)
            .with_context(|| format!("run work-item store command '{subcommand}'"))?;
        if output.timed_out {
            return Err(anyhow!("work-item store command '{subcommand}' timed out"));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "work-item store command '{subcommand}' failed with status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(output.stdout_lossy())
    }
}

impl WorkItemStore for TasksCliStore {
    #[instrument(skip_all)]
    fn remaining(&self) -> Result<u64> {
        let out = self.run("remaining")?;
        let count = out
            .trim()
            .parse::<u64>()
            .with_context(|| format!("parse remaining count from '{}'", out.trim()))?;
        debug!(count, "work items remaining");
        Ok(count)
    }

    #[instrument(skip_all)]
    fn reconcile(&self) -> Result<String> {
        let report = self.run("reconcile")?;
        debug!(report = %report.trim(), "reconciled work items");
        Ok(report)
    }
}
