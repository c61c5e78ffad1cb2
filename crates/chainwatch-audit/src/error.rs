//! Error kinds for the audit log. Spec §7: `IOError`, `ChainIntegrityError`.

use thiserror::Error;

/// Failures opening or writing the log. I/O errors surface to the caller but
/// never change a policy decision already made in memory (spec §7) — a caller
/// may choose to fail-closed on a write error, but that is its decision, not
/// this crate's.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The offending line and a message, reported by [`crate::verify::verify`]
/// without aborting the rest of the scan (spec §7: "does not abort further
/// scanning in batch tools" — callers that want to stop early can do so using
/// the returned [`crate::verify::VerificationReport::error_line`]).
#[derive(Debug, Error)]
#[error("chain integrity violation at line {line}: {reason}")]
pub struct ChainIntegrityError {
    pub line: u64,
    pub reason: String,
}
