//! Goal document persistence (`.supervisor/GOAL.md`).
//!
//! The goal is written once at project initialization and read on every
//! subsequent run; it is the standing instruction every session receives.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Read the goal document, returning `None` when the project has not been
/// initialized yet.
pub fn load_goal(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

/// Persist the goal document if it does not exist yet. An existing goal is
/// kept untouched; initialization happens once.
pub fn persist_goal(path: &Path, text: &str) -> Result<()> {
    if path.exists() {
        debug!(path = %path.display(), "goal already persisted, keeping it");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create goal dir {}", parent.display()))?;
    }
    let mut contents = text.trim().to_string();
    contents.push('\n');
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
