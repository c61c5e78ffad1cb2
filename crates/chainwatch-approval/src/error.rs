//! Errors raised by the approval and break-glass stores.

use thiserror::Error;

/// Errors raised by the approval store. Spec §4.6.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("io error operating on approval store: {0}")]
    Io(#[from] std::io::Error),
    #[error("approval record is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("approval key {0:?} is invalid: must be non-empty, contain no '..', and use only [A-Za-z0-9-]")]
    InvalidKey(String),
    #[error("no approval found for key {0:?}")]
    NotFound(String),
}

/// Errors raised by the break-glass store. Spec §4.7.
#[derive(Debug, Error)]
pub enum BreakGlassError {
    #[error("io error operating on break-glass store: {0}")]
    Io(#[from] std::io::Error),
    #[error("break-glass token is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("break-glass token id {0:?} is invalid")]
    InvalidId(String),
    #[error("no break-glass token found for id {0:?}")]
    NotFound(String),
    #[error("break-glass token {0:?} has already expired")]
    Expired(String),
    #[error("break-glass reason must not be empty")]
    EmptyReason,
}
