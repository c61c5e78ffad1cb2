//! The append-only, hash-chained audit log itself. Spec §4.8.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chainwatch_core::ids::now_iso8601_millis;
use tracing::info;

use crate::entry::{AuditEntry, AuditEntrySer};
use crate::error::AuditError;
use crate::hash::{hash_line, GENESIS_HASH};

/// The last line of `bytes` that is terminated by a newline, i.e. was fully
/// flushed. A file that crashed mid-write leaves a trailing partial line,
/// which this deliberately excludes so a restart doesn't chain off garbage.
fn last_complete_line(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.is_empty() {
        return None;
    }
    let mut segments: Vec<&[u8]> = bytes.split(|&b| b == b'\n').collect();
    if segments.last() == Some(&&b""[..]) {
        // The file ends with a newline: drop the trailing empty segment it produces.
        segments.pop();
    } else {
        // No trailing newline: the final segment is an incomplete write, drop it too.
        segments.pop();
    }
    segments.last().map(|s| s.to_vec())
}

struct LogState {
    file: File,
    prev_hash: String,
}

/// One process's exclusive handle to an audit log file. Owns the file handle
/// and the running `prev_hash`; both are guarded by the same mutex so a write
/// is always "compute line, append, fsync, advance prev_hash" as one step.
pub struct AuditLog {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl AuditLog {
    /// Open (creating if absent) the log at `path`. The parent directory is
    /// created with mode `0700` if it doesn't exist. `prev_hash` is seeded from
    /// the last complete line already on disk, or the genesis hash if empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
                set_owner_only(parent)?;
            }
        }

        let existing = fs::read(&path).unwrap_or_default();
        let prev_hash = match last_complete_line(&existing) {
            Some(line) => hash_line(&line),
            None => GENESIS_HASH.to_string(),
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, state: Mutex::new(LogState { file, prev_hash }) })
    }

    /// Path this log was opened against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `entry`, filling `timestamp` if absent and `prev_hash` from the
    /// log's running chain state. Serializes to the exact field order spec §6
    /// mandates, appends the line, `fsync`s, then advances `prev_hash` — all
    /// under the log's single mutex, so concurrent writers serialize cleanly.
    pub fn record(&self, mut entry: AuditEntry) -> Result<(), AuditError> {
        let mut state = self.state.lock().expect("audit log mutex poisoned");

        if entry.timestamp.is_none() {
            entry.timestamp = Some(now_iso8601_millis());
        }
        entry.prev_hash = Some(state.prev_hash.clone());

        let ser = AuditEntrySer {
            ts: entry.timestamp.as_deref().unwrap_or_default(),
            trace_id: &entry.trace_id,
            action: &entry.action,
            decision: &entry.decision,
            reason: &entry.reason,
            tier: entry.tier,
            policy_hash: &entry.policy_hash,
            prev_hash: entry.prev_hash.as_deref().unwrap_or_default(),
            entry_type: entry.entry_type.as_deref(),
            token_id: entry.token_id.as_deref(),
            original_decision: entry.original_decision.as_deref(),
            overridden_to: entry.overridden_to.as_deref(),
            expires_at: entry.expires_at.as_deref(),
        };
        let line = serde_json::to_vec(&ser)?;

        state.file.write_all(&line)?;
        state.file.write_all(b"\n")?;
        state.file.sync_all()?;

        state.prev_hash = hash_line(&line);

        info!(
            trace_id = %entry.trace_id,
            tool = %entry.action.tool,
            decision = %entry.decision,
            tier = entry.tier,
            "audit entry recorded"
        );
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_only(dir: &Path) -> Result<(), AuditError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(dir)?.permissions();
    perms.set_mode(0o700);
    fs::set_permissions(dir, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only(_dir: &Path) -> Result<(), AuditError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditEntry;

    fn entry(trace_id: &str, decision: &str) -> AuditEntry {
        AuditEntry::new(trace_id, "command", "rm -rf /", decision, "test", 3, "sha256:deadbeef")
    }

    #[test]
    fn first_entry_chains_to_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();
        log.record(entry("t-000000000000", "deny")).unwrap();

        let contents = fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        let line = contents.lines().next().unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["prev_hash"], GENESIS_HASH);
    }

    #[test]
    fn second_entry_chains_to_hash_of_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        log.record(entry("t-000000000000", "deny")).unwrap();
        log.record(entry("t-000000000000", "allow")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let first = lines.next().unwrap();
        let second_value: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(second_value["prev_hash"].as_str().unwrap(), hash_line(first.as_bytes()));
    }

    #[test]
    fn reopening_an_existing_log_continues_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let log = AuditLog::open(&path).unwrap();
            log.record(entry("t-000000000000", "deny")).unwrap();
        }
        let log = AuditLog::open(&path).unwrap();
        log.record(entry("t-000000000000", "allow")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        log.record(entry("t-000000000000", "allow")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert!(value.get("type").is_none());
        assert!(value.get("token_id").is_none());
    }

    #[test]
    fn optional_fields_are_present_when_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();
        let entry = entry("t-000000000000", "allow")
            .with_type("break_glass")
            .with_token_id("bg-0123456789abcdef")
            .with_override("deny", "allow");
        log.record(entry).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(value["type"], "break_glass");
        assert_eq!(value["token_id"], "bg-0123456789abcdef");
        assert_eq!(value["original_decision"], "deny");
        assert_eq!(value["overridden_to"], "allow");
    }

    #[test]
    fn last_complete_line_ignores_trailing_partial_write() {
        assert_eq!(last_complete_line(b"line1\nline2\npartial"), Some(b"line2".to_vec()));
        assert_eq!(last_complete_line(b"line1\n"), Some(b"line1".to_vec()));
        assert_eq!(last_complete_line(b""), None);
        assert_eq!(last_complete_line(b"partial_only"), None);
    }
}
