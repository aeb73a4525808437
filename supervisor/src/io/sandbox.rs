//! Sandbox enforcement runtime adapter.
//!
//! Policy generation is pure ([`crate::core::policy`]); this module writes
//! the per-session policy document and probes for the external enforcement
//! wrapper. Enforcement itself is entirely the wrapper's job, and its absence
//! degrades to unsandboxed execution with a warning at the call site.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::policy::SandboxPolicy;
use crate::io::process::run_command_with_timeout;

/// The enforcement wrapper the worker command is launched under.
pub const RUNTIME_BIN: &str = "srt";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether the enforcement wrapper responds to a version probe.
pub fn runtime_available() -> bool {
    let mut cmd = Command::new(RUNTIME_BIN);
    cmd.arg("--version");
    match run_command_with_timeout(cmd, None, PROBE_TIMEOUT, 4096) {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Persist the policy document for a session.
pub fn write_policy(path: &Path, policy: &SandboxPolicy) -> Result<()> {
    debug!(path = %path.display(), "writing sandbox policy");
    let mut buf = serde_json::to_string_pretty(policy)?;
    buf.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create policy dir {}", parent.display()))?;
    }
    fs::write(path, buf).with_context(|| format!("write policy {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::materialize;
    use std::path::PathBuf;

    #[test]
    fn policy_round_trips_through_the_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("policy.json");
        let policy = materialize(&PathBuf::from("/home/dev"), temp.path());

        write_policy(&path, &policy).expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        let loaded: SandboxPolicy = serde_json::from_str(&contents).expect("parse");
        assert_eq!(loaded, policy);
    }
}
