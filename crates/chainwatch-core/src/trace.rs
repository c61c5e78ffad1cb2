//! Per-session accumulator state, keyed by trace id.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::action::{Egress, Sensitivity, Tag, ToolCategory};
use crate::ids::new_trace_id;
use crate::zone::{Irreversibility, Zone};

/// Accumulated state for one trace. All fields are monotonically non-retreating;
/// only [`crate::trace::TraceState`]'s owner (the accumulator) may mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceState {
    pub trace_id: String,
    /// Tool categories observed this trace, in first-seen order.
    pub seen_sources: Vec<ToolCategory>,
    pub max_sensitivity: Sensitivity,
    pub volume_rows: u64,
    pub volume_bytes: u64,
    pub egress: Egress,
    pub tags: BTreeSet<Tag>,
    pub zones_entered: BTreeSet<Zone>,
    pub zone: Irreversibility,
}

impl TraceState {
    /// A fresh, empty state for a newly minted trace id.
    pub fn new() -> Self {
        Self::with_trace_id(new_trace_id())
    }

    /// A fresh, empty state for a caller-supplied trace id (e.g. one carried across a retry).
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            seen_sources: Vec::new(),
            max_sensitivity: Sensitivity::Low,
            volume_rows: 0,
            volume_bytes: 0,
            egress: Egress::Internal,
            tags: BTreeSet::new(),
            zones_entered: BTreeSet::new(),
            zone: Irreversibility::Safe,
        }
    }

    /// Add `source` to the seen set if this is the first time it's been observed.
    pub fn observe_source(&mut self, source: ToolCategory) {
        if !self.seen_sources.contains(&source) {
            self.seen_sources.push(source);
        }
    }

    /// Raise `max_sensitivity` if `sensitivity` is higher.
    pub fn raise_sensitivity(&mut self, sensitivity: Sensitivity) {
        if sensitivity > self.max_sensitivity {
            self.max_sensitivity = sensitivity;
        }
    }

    /// Add to the running volume totals.
    pub fn add_volume(&mut self, rows: u64, bytes: u64) {
        self.volume_rows += rows;
        self.volume_bytes += bytes;
    }

    /// Promote egress to external; a no-op once already external.
    pub fn promote_egress(&mut self, egress: Egress) {
        if egress > self.egress {
            self.egress = egress;
        }
    }

    /// Union in a set of tags.
    pub fn union_tags(&mut self, tags: &BTreeSet<Tag>) {
        self.tags.extend(tags.iter().copied());
    }

    /// Add newly entered zones and raise the irreversibility level accordingly.
    pub fn enter_zones(&mut self, zones: &BTreeSet<Zone>, level: Irreversibility) {
        self.zones_entered.extend(zones.iter().copied());
        self.zone = self.zone.max(level);
    }
}

impl Default for TraceState {
    fn default() -> Self {
        Self::new()
    }
}
