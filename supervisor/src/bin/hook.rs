//! Worker-side telemetry event hook.
//!
//! Registered as the worker runtime's post-action hook. Receives one action
//! event as JSON on stdin, folds it into the shared telemetry record, stamps
//! the liveness file, and prints a context-usage note for the runtime to
//! inject back into the session. When not running under a supervised session
//! (no session id in the environment) it is a silent no-op, and it always
//! exits zero: a hook failure must never break the worker's own action.

use std::io::Read;

use anyhow::{Context, Result};

use supervisor::io::now_secs;
use supervisor::io::paths::SupervisorPaths;
use supervisor::io::telemetry_store::{ActionEvent, apply_action_event};
use supervisor::io::worker::SESSION_ENV_VAR;

fn main() {
    let _ = run();
}

fn run() -> Result<()> {
    let Some(session_id) = std::env::var(SESSION_ENV_VAR)
        .ok()
        .filter(|id| !id.is_empty())
    else {
        return Ok(());
    };

    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("read hook event")?;
    let event: ActionEvent = match serde_json::from_str(&raw) {
        Ok(event) => event,
        // Malformed events are swallowed; the previous record stands.
        Err(_) => return Ok(()),
    };

    let root = std::env::current_dir().context("resolve working directory")?;
    let paths = SupervisorPaths::new(&root);
    let record = apply_action_event(
        &paths.telemetry_path,
        &paths.liveness_path,
        &session_id,
        &event,
        now_secs(),
    )?;

    if let Some(note) = record.context_note() {
        println!("{note}");
    }
    Ok(())
}
