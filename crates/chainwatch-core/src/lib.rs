//! Chainwatch core primitives and shared types.
//!
//! This crate is deliberately inert: it defines the normalized [`Action`] shape,
//! the per-trace [`TraceState`] accumulator data, and the zone/irreversibility
//! lattice, but performs no classification or policy evaluation itself. Those
//! live one layer up, in `chainwatch-policy`.

#![deny(unsafe_code)]

pub mod action;
pub mod ids;
pub mod trace;
pub mod zone;

pub use action::{Action, ActionParams, Egress, Operation, RawMeta, Sensitivity, Tag, ToolCategory};
pub use trace::TraceState;
pub use zone::{Irreversibility, Zone};

/// Version of the chainwatch-core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
