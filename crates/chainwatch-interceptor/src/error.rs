//! Error kinds surfaced by the interceptor. Spec §7: `Cancelled`,
//! `UpstreamError`, `ParseError`; policy decisions themselves are never errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("request cancelled")]
    Cancelled,
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("failed to parse response body: {0}")]
    Parse(#[from] serde_json::Error),
}
