//! Shared telemetry artifact: session-start reset and the action-hook merge path.
//!
//! The hook binary is the artifact's only mid-session writer; the progress
//! poller reads it and the supervisor resets it between sessions. Every write
//! is whole-file and atomic, and the hook merges through
//! [`TelemetryRecord::merge`] so racing hook invocations stay commutative.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::telemetry::TelemetryRecord;
use crate::io::liveness::{self, LivenessStamp};

/// How far back into the session transcript the usage scan reaches.
const TRANSCRIPT_SCAN_WINDOW_BYTES: u64 = 256 * 1024;

/// One observable worker action, as delivered to the hook on stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionEvent {
    /// The worker runtime's own session identifier. Informational only; the
    /// supervising session id comes from the environment.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Path to the worker's session transcript, when the runtime provides it.
    #[serde(default)]
    pub transcript_path: Option<PathBuf>,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: ToolInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolInput {
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Read the artifact, tolerating a missing or malformed file.
pub fn load_record(path: &Path) -> Option<TelemetryRecord> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Atomically write the artifact (temp file + rename).
pub fn write_record(path: &Path, record: &TelemetryRecord) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(record)?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("telemetry path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp telemetry {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace telemetry {}", path.display()))?;
    Ok(())
}

/// Replace the artifact with a fresh record at session start. Whatever was on
/// disk belonged to the previous session and is discarded wholesale.
pub fn reset_for_session(path: &Path, session_id: &str, now: u64) -> Result<TelemetryRecord> {
    debug!(session_id, "resetting telemetry artifact");
    let record = TelemetryRecord::new(session_id, now);
    write_record(path, &record)?;
    Ok(record)
}

/// Fold one action event into the shared record and refresh the liveness
/// stamp. Returns the merged record so the caller can surface a usage note.
pub fn apply_action_event(
    telemetry_path: &Path,
    liveness_path: &Path,
    session_id: &str,
    event: &ActionEvent,
    now: u64,
) -> Result<TelemetryRecord> {
    let mut record = TelemetryRecord::adopt(load_record(telemetry_path), session_id, now);
    record.record_action(&event.tool_name, now);
    if let Some(path) = &event.tool_input.file_path {
        if modifies_files(&event.tool_name) {
            record.record_modified(path);
        } else if reads_files(&event.tool_name) {
            record.record_read(path);
        }
    }
    if let Some(transcript) = &event.transcript_path
        && let Some(estimate) = latest_usage_estimate(transcript)
    {
        record.record_usage(estimate);
    }

    // A concurrent hook may have written since we loaded; merge through
    // whatever is on disk now so neither write is lost outright.
    if let Some(disk) = load_record(telemetry_path)
        && disk.session_id == session_id
    {
        record.merge(&disk);
    }
    write_record(telemetry_path, &record)?;

    liveness::write_stamp(
        liveness_path,
        &LivenessStamp {
            session_id: session_id.to_string(),
            last_action: event.tool_name.clone(),
            updated_at: now,
        },
    )?;

    Ok(record)
}

fn modifies_files(tool_name: &str) -> bool {
    matches!(tool_name, "Write" | "Edit" | "MultiEdit" | "NotebookEdit")
}

fn reads_files(tool_name: &str) -> bool {
    tool_name == "Read"
}

/// Recover the latest cumulative token usage from the tail of a session
/// transcript (JSONL, newest entries last). Scans backward through a bounded
/// trailing window; any line that fails to parse is skipped.
pub fn latest_usage_estimate(transcript: &Path) -> Option<u64> {
    let mut file = fs::File::open(transcript).ok()?;
    let len = file.metadata().ok()?.len();
    let start = len.saturating_sub(TRANSCRIPT_SCAN_WINDOW_BYTES);
    file.seek(SeekFrom::Start(start)).ok()?;
    let mut tail = String::new();
    file.read_to_string(&mut tail).ok()?;

    let mut lines: Vec<&str> = tail.lines().collect();
    if start > 0 && !lines.is_empty() {
        // The first line of a mid-file window is almost certainly partial.
        lines.remove(0);
    }
    for line in lines.iter().rev() {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if let Some(total) = usage_total(&value) {
            return Some(total);
        }
    }
    None
}

/// Sum the token fields of a usage accounting entry, if the value carries one.
fn usage_total(value: &Value) -> Option<u64> {
    let usage = value
        .get("message")
        .and_then(|m| m.get("usage"))
        .or_else(|| value.get("usage"))?;
    let fields = [
        "input_tokens",
        "cache_creation_input_tokens",
        "cache_read_input_tokens",
        "output_tokens",
    ];
    let mut total = 0u64;
    let mut any = false;
    for field in fields {
        if let Some(n) = usage.get(field).and_then(Value::as_u64) {
            total += n;
            any = true;
        }
    }
    any.then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(tool_name: &str, file_path: Option<&str>) -> ActionEvent {
        ActionEvent {
            session_id: Some("worker-internal".to_string()),
            transcript_path: None,
            tool_name: tool_name.to_string(),
            tool_input: ToolInput {
                file_path: file_path.map(str::to_string),
            },
        }
    }

    #[test]
    fn reset_discards_previous_session_counts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("telemetry.json");
        let liveness = temp.path().join("liveness.json");

        apply_action_event(&path, &liveness, "s0001-100", &event("Bash", None), 100)
            .expect("apply");
        let record = reset_for_session(&path, "s0002-200", 200).expect("reset");

        assert_eq!(record.session_id, "s0002-200");
        assert_eq!(record.invocations, 0);
        let on_disk = load_record(&path).expect("load");
        assert_eq!(on_disk, record);
    }

    #[test]
    fn stale_session_record_is_reinitialized_not_merged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("telemetry.json");
        let liveness = temp.path().join("liveness.json");

        // Leftover artifact from an earlier crashed run.
        apply_action_event(&path, &liveness, "s0001-100", &event("Bash", None), 100)
            .expect("apply");

        let record = apply_action_event(&path, &liveness, "s0002-200", &event("Edit", None), 200)
            .expect("apply");
        assert_eq!(record.session_id, "s0002-200");
        assert_eq!(record.invocations, 1);
    }

    #[test]
    fn events_classify_touched_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("telemetry.json");
        let liveness = temp.path().join("liveness.json");

        apply_action_event(
            &path,
            &liveness,
            "s0001-100",
            &event("Edit", Some("src/lib.rs")),
            100,
        )
        .expect("apply");
        apply_action_event(
            &path,
            &liveness,
            "s0001-100",
            &event("Read", Some("README.md")),
            101,
        )
        .expect("apply");
        let record = apply_action_event(
            &path,
            &liveness,
            "s0001-100",
            &event("Edit", Some("src/lib.rs")),
            102,
        )
        .expect("apply");

        assert_eq!(record.modified_files, vec!["src/lib.rs"]);
        assert_eq!(record.read_files, vec!["README.md"]);
        assert_eq!(record.invocations, 3);
        assert_eq!(record.last_action.as_deref(), Some("Edit"));
    }

    #[test]
    fn events_refresh_the_liveness_stamp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("telemetry.json");
        let liveness_path = temp.path().join("liveness.json");

        apply_action_event(&path, &liveness_path, "s0001-100", &event("Bash", None), 100)
            .expect("apply");

        let stamp = liveness::read_stamp(&liveness_path).expect("stamp");
        assert_eq!(stamp.session_id, "s0001-100");
        assert_eq!(stamp.last_action, "Bash");
    }

    #[test]
    fn malformed_artifact_is_replaced_on_next_event() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("telemetry.json");
        let liveness = temp.path().join("liveness.json");
        fs::write(&path, "{corrupt").expect("write");

        let record = apply_action_event(&path, &liveness, "s0001-100", &event("Bash", None), 100)
            .expect("apply");
        assert_eq!(record.invocations, 1);
    }

    #[test]
    fn usage_scan_finds_newest_accounting_entry() {
        let temp = tempfile::tempdir().expect("tempdir");
        let transcript = temp.path().join("transcript.jsonl");
        let lines = [
            r#"{"type":"user","message":{"content":"hi"}}"#,
            r#"{"type":"assistant","message":{"usage":{"input_tokens":1000,"output_tokens":50}}}"#,
            "not json at all",
            r#"{"type":"assistant","message":{"usage":{"input_tokens":2000,"cache_read_input_tokens":500,"output_tokens":80}}}"#,
        ];
        fs::write(&transcript, lines.join("\n")).expect("write");

        assert_eq!(latest_usage_estimate(&transcript), Some(2580));
    }

    #[test]
    fn usage_scan_tolerates_missing_transcript() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(latest_usage_estimate(&temp.path().join("absent.jsonl")), None);
    }

    #[test]
    fn usage_scan_ignores_entries_without_usage() {
        let temp = tempfile::tempdir().expect("tempdir");
        let transcript = temp.path().join("transcript.jsonl");
        fs::write(&transcript, "{\"type\":\"user\"}\n{\"type\":\"system\"}\n").expect("write");
        assert_eq!(latest_usage_estimate(&transcript), None);
    }
}
