//! Process-tree poll loop. Spec §4.10.
//!
//! Walks descendants of a target PID every `poll_interval` (default 100ms)
//! through a [`Watcher`] seam, matching each newly-seen child against a
//! built-in rule set plus operator-supplied profile rules. A match is
//! resolved the same way every other tier-3 decision in this workspace is:
//! consult the approval store, then break-glass, and fail closed — kill the
//! process and leave a pending approval request — if neither grants it.

#![deny(unsafe_code)]

pub mod error;
pub mod monitor;
pub mod rule;
pub mod watcher;

pub use error::MonitorError;
pub use monitor::ProcessMonitor;
pub use rule::{builtin_rules, MonitorRule};
pub use watcher::{ProcessInfo, SysinfoWatcher, Watcher};
