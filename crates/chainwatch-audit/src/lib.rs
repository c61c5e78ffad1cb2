//! Tamper-evident, hash-chained append-only audit log. Spec §4.8.
//!
//! Every recorded [`entry::AuditEntry`] carries the `sha256` of the exact bytes
//! of the line before it (`prev_hash`), seeded from a genesis hash for a fresh
//! log. [`verify::verify`] re-walks that chain and reports the first line where
//! it breaks — from a tampered byte, a deleted line, or an inserted one.

#![deny(unsafe_code)]

pub mod entry;
pub mod error;
pub mod hash;
pub mod log;
pub mod verify;

pub use entry::{AuditAction, AuditEntry};
pub use error::{AuditError, ChainIntegrityError};
pub use hash::{hash_line, GENESIS_HASH};
pub use log::AuditLog;
pub use verify::{verify, VerificationReport};
