//! The trace accumulator itself. Spec §4.2.

use std::sync::Mutex;

use chainwatch_core::ids::{next_monotonic_id, now_iso8601_millis};
use chainwatch_core::TraceState;
use chainwatch_policy::{classify_zones, irreversibility_for};
use tracing::info;

use crate::event::{Event, EventData, Volume};

/// Exclusive owner of one trace's [`TraceState`]. `record_action` is the only
/// way `TraceState` is ever mutated (spec §3 "Ownership"): every field update
/// happens under this accumulator's single mutex, in the exact eight-step
/// order spec §4.2 lists.
pub struct TraceAccumulator {
    state: Mutex<TraceState>,
}

impl TraceAccumulator {
    /// A fresh accumulator for a newly minted trace id.
    pub fn new() -> Self {
        Self { state: Mutex::new(TraceState::new()) }
    }

    /// A fresh accumulator for a caller-supplied trace id (e.g. one carried
    /// across a retried request).
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self { state: Mutex::new(TraceState::with_trace_id(trace_id)) }
    }

    pub fn trace_id(&self) -> String {
        self.state.lock().expect("trace accumulator mutex poisoned").trace_id.clone()
    }

    /// A point-in-time copy of the accumulated state, for callers (the policy
    /// evaluator, telemetry) that only need to read it.
    pub fn snapshot(&self) -> TraceState {
        self.state.lock().expect("trace accumulator mutex poisoned").clone()
    }

    /// Record one action against this trace, returning the [`Event`] it produced.
    ///
    /// Steps, all under one critical section: normalize is the caller's job
    /// (classification already happened in `chainwatch-policy`); this fuses
    /// source-set, sensitivity, volume, egress, tags, and zone/irreversibility
    /// updates, then builds the `Event`.
    pub fn record_action(
        &self,
        actor: impl Into<String>,
        purpose: impl Into<String>,
        action: chainwatch_core::Action,
        parent_span_id: Option<String>,
    ) -> Event {
        let mut state = self.state.lock().expect("trace accumulator mutex poisoned");

        state.observe_source(action.tool.clone());
        state.raise_sensitivity(action.raw_meta.sensitivity);
        state.add_volume(action.raw_meta.rows, action.raw_meta.bytes);
        state.promote_egress(action.raw_meta.egress);
        state.union_tags(&action.raw_meta.tags);

        let zones_added = classify_zones(&action);
        let mut union_zones = state.zones_entered.clone();
        union_zones.extend(zones_added.iter().copied());
        let level = irreversibility_for(&union_zones);
        state.enter_zones(&zones_added, level);

        let event = Event {
            ts: now_iso8601_millis(),
            trace_id: state.trace_id.clone(),
            span_id: format!("s-{:012x}", next_monotonic_id()),
            parent_span_id,
            actor: actor.into(),
            purpose: purpose.into(),
            data: EventData {
                classification: action.raw_meta.sensitivity,
                tags: action.raw_meta.tags.clone(),
                volume: Volume { rows: action.raw_meta.rows, bytes: action.raw_meta.bytes },
                zones_entered: zones_added,
                irreversibility_level: level,
            },
            egress: action.raw_meta.egress,
            action,
            decision: None,
        };

        info!(
            trace_id = %event.trace_id,
            span_id = %event.span_id,
            tool = %event.action.tool,
            irreversibility = ?event.data.irreversibility_level,
            "action recorded into trace"
        );
        event
    }
}

impl Default for TraceAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainwatch_core::Irreversibility;
    use chainwatch_policy::classify::{build_from_command, build_from_tool_call};
    use serde_json::json;

    #[test]
    fn record_action_raises_sensitivity_and_never_lowers_it() {
        let acc = TraceAccumulator::new();
        acc.record_action("agent-1", "ops", build_from_command("rm", &["-rf".into(), "/".into()]), None);
        acc.record_action("agent-1", "ops", build_from_command("ls", &["-la".into()]), None);
        assert_eq!(acc.snapshot().max_sensitivity, chainwatch_core::Sensitivity::High);
    }

    #[test]
    fn zone_escalation_across_two_actions_reaches_sensitive() {
        let acc = TraceAccumulator::new();
        acc.record_action(
            "agent-1",
            "ops",
            build_from_tool_call("read_file", json!({"path": "/data/hr/employees.csv"}).as_object().unwrap()),
            None,
        );
        acc.record_action(
            "agent-1",
            "ops",
            build_from_tool_call("fetch_url", json!({"url": "https://api.example.com/data"}).as_object().unwrap()),
            None,
        );
        let state = acc.snapshot();
        assert!(state.zone >= Irreversibility::Sensitive);
        assert!(state.zones_entered.contains(&chainwatch_core::Zone::SensitiveData));
        assert!(state.zones_entered.contains(&chainwatch_core::Zone::EgressCapable));
    }

    #[test]
    fn events_carry_monotonically_increasing_span_ids() {
        let acc = TraceAccumulator::new();
        let e1 = acc.record_action("agent-1", "ops", build_from_command("ls", &[]), None);
        let e2 = acc.record_action("agent-1", "ops", build_from_command("ls", &[]), None);
        assert_ne!(e1.span_id, e2.span_id);
    }

    #[test]
    fn event_decision_is_none_until_attached() {
        let acc = TraceAccumulator::new();
        let event = acc.record_action("agent-1", "ops", build_from_command("ls", &[]), None);
        assert!(event.decision.is_none());
        let event = event.with_decision("allow");
        assert_eq!(event.decision.as_deref(), Some("allow"));
    }
}
