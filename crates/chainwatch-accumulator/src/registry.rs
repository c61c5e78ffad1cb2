//! Process-wide map from trace id to its accumulator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::accumulator::TraceAccumulator;

/// Owns one [`TraceAccumulator`] per trace id, created on first use and kept
/// for the lifetime of the process. A session-scoped process (the
/// interceptor, the monitor) holds a single registry; there is no eviction
/// policy here, matching spec §3's silence on trace lifetime.
#[derive(Default)]
pub struct TraceRegistry {
    traces: Mutex<HashMap<String, Arc<TraceAccumulator>>>,
}

impl TraceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulator for `trace_id`, creating one if this is the first time
    /// it's been seen.
    pub fn get_or_create(&self, trace_id: &str) -> Arc<TraceAccumulator> {
        let mut traces = self.traces.lock().expect("trace registry mutex poisoned");
        traces
            .entry(trace_id.to_string())
            .or_insert_with(|| Arc::new(TraceAccumulator::with_trace_id(trace_id)))
            .clone()
    }

    /// A fresh accumulator under a newly minted trace id, registered and returned.
    pub fn create(&self) -> Arc<TraceAccumulator> {
        let accumulator = Arc::new(TraceAccumulator::new());
        let trace_id = accumulator.trace_id();
        self.traces.lock().expect("trace registry mutex poisoned").insert(trace_id, accumulator.clone());
        accumulator
    }

    /// The accumulator for `trace_id`, if one has been created.
    pub fn get(&self, trace_id: &str) -> Option<Arc<TraceAccumulator>> {
        self.traces.lock().expect("trace registry mutex poisoned").get(trace_id).cloned()
    }

    /// Number of traces currently tracked.
    pub fn len(&self) -> usize {
        self.traces.lock().expect("trace registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
