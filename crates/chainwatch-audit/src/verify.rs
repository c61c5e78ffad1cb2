//! Batch verification of an on-disk audit log's hash chain. Spec §4.8, §8.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Serialize;

use crate::error::AuditError;
use crate::hash::{hash_line, GENESIS_HASH};

/// Result of scanning a log end to end. `error_line` and `error` are only
/// present when `valid` is `false`; scanning does not abort at the first
/// failure's line — it reports that line and stops, but the count of lines
/// successfully scanned up to that point is still given in `lines`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub lines: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationReport {
    fn ok(lines: u64) -> Self {
        Self { valid: true, lines, error_line: None, error: None }
    }

    fn broken(lines: u64, error_line: u64, error: impl Into<String>) -> Self {
        Self { valid: false, lines, error_line: Some(error_line), error: Some(error.into()) }
    }
}

/// Scan `path` line by line, verifying every line's `prev_hash` equals the
/// `sha256` of the exact preceding line's bytes, and that the first line's
/// `prev_hash` is the genesis hash. `O(n)` in the number of lines.
pub fn verify(path: impl AsRef<Path>) -> Result<VerificationReport, AuditError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut expected_prev_hash = GENESIS_HASH.to_string();
    let mut lines_seen: u64 = 0;

    for (index, line_result) in reader.lines().enumerate() {
        let line_no = index as u64 + 1;
        let line = line_result?;
        if line.is_empty() {
            continue;
        }
        lines_seen += 1;

        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                return Ok(VerificationReport::broken(lines_seen, line_no, format!("malformed JSON: {e}")))
            }
        };

        let prev_hash_in_line = match value.get("prev_hash").and_then(|v| v.as_str()) {
            Some(h) => h,
            None => {
                return Ok(VerificationReport::broken(lines_seen, line_no, "missing prev_hash field"))
            }
        };

        if prev_hash_in_line != expected_prev_hash {
            return Ok(VerificationReport::broken(
                lines_seen,
                line_no,
                format!("prev_hash mismatch: expected {expected_prev_hash}, found {prev_hash_in_line}"),
            ));
        }

        expected_prev_hash = hash_line(line.as_bytes());
    }

    Ok(VerificationReport::ok(lines_seen))
}
