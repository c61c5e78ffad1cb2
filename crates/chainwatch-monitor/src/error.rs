//! Errors surfaced by [`crate::watcher::Watcher`] implementations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("process {0} not found")]
    ProcessNotFound(u32),
    #[error("failed to kill process {0}")]
    KillFailed(u32),
}
