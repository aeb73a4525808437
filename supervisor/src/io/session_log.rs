//! Session archive writer for `.supervisor/sessions/<seq>/`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::io::paths::SupervisorPaths;
use crate::session::IterationSession;

/// Archive a finished session's record as `meta.json` in its session
/// directory. The session log and policy document already live there; the
/// worker's own progress-notes artifact is never touched.
pub fn archive_session(paths: &SupervisorPaths, session: &IterationSession) -> Result<PathBuf> {
    let dir = paths.session_dir(session.seq);
    fs::create_dir_all(&dir).with_context(|| format!("create session dir {}", dir.display()))?;

    let meta_path = paths.session_meta_path(session.seq);
    let mut buf = serde_json::to_string_pretty(session)?;
    buf.push('\n');
    fs::write(&meta_path, buf)
        .with_context(|| format!("write session meta {}", meta_path.display()))?;
    Ok(meta_path)
}
