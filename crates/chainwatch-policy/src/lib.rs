//! Chainwatch policy engine: action classification, the denylist matcher, the
//! zone classifier, and the deterministic policy evaluator.
//!
//! This crate layers interpretation on top of the inert data `chainwatch-core`
//! defines: it is where an `Action`'s resource string gets a sensitivity and a
//! set of tags, where zones get assigned, and where all of that plus a
//! `TraceState` and a `PolicyConfig` reduces to one `PolicyResult`.
//!
//! `Evaluate` (see [`evaluate::evaluate`]) never errors. Configuration loading
//! and validation, in [`config`], can fail — that failure belongs to the
//! YAML-owning collaborator, not to evaluation itself.

#![deny(unsafe_code)]

pub mod classify;
pub mod config;
pub mod denylist;
pub mod evaluate;
pub mod handle;
pub mod zone;

pub use config::{AlertTarget, ConfigError, Decision, EnforcementMode, LoadedPolicy, PolicyConfig, Rule};
pub use denylist::{Denylist, DenylistHit, DenylistKind};
pub use evaluate::{approval_key_for, evaluate, is_self_targeting, PolicyResult};
pub use handle::PolicyHandle;
pub use zone::{classify_zones, irreversibility_for};
