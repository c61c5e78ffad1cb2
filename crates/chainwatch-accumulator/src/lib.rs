//! Per-trace accumulator: folds classified actions into running trace state
//! and emits the [`Event`] record for each one. Spec §4.2.

#![deny(unsafe_code)]

pub mod accumulator;
pub mod event;
pub mod registry;

pub use accumulator::TraceAccumulator;
pub use event::{Event, EventData, Volume};
pub use registry::TraceRegistry;
