//! Liveness stamp shared between the worker's action hook and the watchdog.
//!
//! The file's modification time is the liveness signal; its content ties the
//! signal to a session so a leftover stamp from a crashed run cannot mask a
//! genuine stall in the current one.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Content of the liveness artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LivenessStamp {
    /// Supervising session the stamp belongs to.
    pub session_id: String,
    /// Name of the action that produced the stamp.
    pub last_action: String,
    /// Unix seconds when the stamp was written.
    pub updated_at: u64,
}

/// Atomically write a stamp (temp file + rename), touching the mtime.
pub fn write_stamp(path: &Path, stamp: &LivenessStamp) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(stamp)?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("liveness path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp liveness stamp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace liveness stamp {}", path.display()))?;
    Ok(())
}

/// Read the stamp, tolerating a missing or malformed file.
pub fn read_stamp(path: &Path) -> Option<LivenessStamp> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Modification time of the liveness file, if it exists.
pub fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether the current stamp attributes to the given session.
pub fn attributes_to(path: &Path, session_id: &str) -> bool {
    read_stamp(path).is_some_and(|stamp| stamp.session_id == session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("liveness.json");
        let stamp = LivenessStamp {
            session_id: "s0001-100".to_string(),
            last_action: "Edit".to_string(),
            updated_at: 100,
        };

        write_stamp(&path, &stamp).expect("write");
        assert_eq!(read_stamp(&path), Some(stamp));
        assert!(modified_at(&path).is_some());
    }

    #[test]
    fn attribution_requires_matching_session() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("liveness.json");
        let stamp = LivenessStamp {
            session_id: "s0001-100".to_string(),
            last_action: "Bash".to_string(),
            updated_at: 100,
        };
        write_stamp(&path, &stamp).expect("write");

        assert!(attributes_to(&path, "s0001-100"));
        assert!(!attributes_to(&path, "s0002-200"));
    }

    #[test]
    fn malformed_stamp_reads_as_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("liveness.json");
        fs::write(&path, "{not json").expect("write");

        assert!(read_stamp(&path).is_none());
        assert!(!attributes_to(&path, "s0001-100"));
        // The mtime is still observable even when the content is unreadable.
        assert!(modified_at(&path).is_some());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("liveness.json");
        assert!(read_stamp(&path).is_none());
        assert!(modified_at(&path).is_none());
    }
}
