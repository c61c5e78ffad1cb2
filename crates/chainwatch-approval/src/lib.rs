//! On-disk approval store and break-glass override tokens. Spec §4.6, §4.7.
//!
//! Both stores use the same write-to-temp + atomic-rename discipline,
//! grounded on the teacher's blob store: concurrent processes coordinate
//! through the filesystem rename and by re-reading, not through any
//! in-process lock shared across processes.

#![deny(unsafe_code)]

pub mod approval;
pub mod break_glass;
pub mod error;
mod fs_util;

pub use approval::{Approval, ApprovalStatus, ApprovalStore};
pub use break_glass::{BreakGlassStore, Token, MIN_TIER_FOR_BREAK_GLASS};
pub use error::{ApprovalError, BreakGlassError};
