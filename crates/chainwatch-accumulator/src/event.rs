//! The in-memory trace entry emitted by [`crate::accumulator::TraceAccumulator::record_action`].
//! Spec §3: "Event — trace entry emitted by the accumulator"; not persisted by
//! the core itself — a collaborator may log or forward it.

use std::collections::BTreeSet;

use chainwatch_core::{Action, Egress, Irreversibility, Sensitivity, Tag, Zone};
use serde::{Deserialize, Serialize};

/// Running totals contributed by one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub rows: u64,
    pub bytes: u64,
}

/// Classification-derived fields carried alongside the raw action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub classification: Sensitivity,
    pub tags: BTreeSet<Tag>,
    pub volume: Volume,
    pub zones_entered: BTreeSet<Zone>,
    pub irreversibility_level: Irreversibility,
}

/// One accumulator-produced trace entry. `decision` is left `None` by
/// `record_action` itself — evaluation happens one layer up, and a caller that
/// has a [`chainwatch_policy::PolicyResult`] in hand attaches it with
/// [`Event::with_decision`] before logging or forwarding the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts: String,
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub actor: String,
    pub purpose: String,
    pub action: Action,
    pub data: EventData,
    pub egress: Egress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

impl Event {
    /// Attach a decision label once the caller has evaluated this action.
    #[must_use]
    pub fn with_decision(mut self, decision: impl Into<String>) -> Self {
        self.decision = Some(decision.into());
        self
    }
}
