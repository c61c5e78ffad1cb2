//! Action + accumulated zone set → newly entered zones, and the irreversibility
//! lattice those zones map to. Spec §4.3.

use std::collections::BTreeSet;

use chainwatch_core::{Action, Irreversibility, Operation, Sensitivity, Tag, ToolCategory, Zone};

/// The set of zones this single action adds, independent of trace history.
pub fn classify_zones(action: &Action) -> BTreeSet<Zone> {
    let mut zones = BTreeSet::new();

    if action.raw_meta.tags.iter().any(|t| {
        matches!(t, Tag::SensitiveFile | Tag::Sensitive | Tag::Payment | Tag::Credential)
    }) || action.raw_meta.sensitivity == Sensitivity::High
    {
        zones.insert(Zone::SensitiveData);
    }

    if action.raw_meta.egress == chainwatch_core::Egress::External {
        zones.insert(Zone::EgressCapable);
    }

    if action.raw_meta.tags.contains(&Tag::Credential) {
        zones.insert(Zone::Privileged);
    }

    if action.raw_meta.tags.contains(&Tag::Destructive) {
        zones.insert(Zone::Destructive);
    }

    let is_mutating_http = matches!(
        action.tool,
        ToolCategory::Http | ToolCategory::HttpProxy | ToolCategory::Browser
    ) && matches!(action.operation, Operation::Post | Operation::Put | Operation::Patch | Operation::Delete);
    if is_mutating_http {
        zones.insert(Zone::NetworkMutation);
    }

    zones
}

/// Irreversibility level for a (possibly accumulated) zone set, per the spec's lookup table.
/// The maximum is taken over every rule that applies; an empty set is `Safe`.
pub fn irreversibility_for(zones: &BTreeSet<Zone>) -> Irreversibility {
    let mut level = Irreversibility::Safe;

    if zones.contains(&Zone::Destructive) {
        level = level.max(Irreversibility::Critical);
    }
    if zones.contains(&Zone::SensitiveData) && zones.contains(&Zone::EgressCapable) {
        level = level.max(Irreversibility::Sensitive);
    }
    if zones.contains(&Zone::NetworkMutation) || zones.contains(&Zone::Privileged) {
        level = level.max(Irreversibility::Guarded);
    }
    if !zones.is_empty() {
        level = level.max(Irreversibility::Elevated);
    }

    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{build_from_command, build_from_tool_call};
    use serde_json::json;

    #[test]
    fn destructive_command_is_critical() {
        let action = build_from_command("rm", &["-rf".into(), "/".into()]);
        let zones = classify_zones(&action);
        assert_eq!(irreversibility_for(&zones), Irreversibility::Critical);
    }

    #[test]
    fn sudo_is_privileged_guarded() {
        let action = build_from_command("sudo", &["passwd".into()]);
        let zones = classify_zones(&action);
        assert!(zones.contains(&Zone::Privileged));
        assert_eq!(irreversibility_for(&zones), Irreversibility::Guarded);
    }

    #[test]
    fn sensitive_data_alone_is_elevated_not_sensitive() {
        let action = build_from_tool_call(
            "read_file",
            json!({"path": "/data/hr/employees.csv"}).as_object().unwrap(),
        );
        let zones = classify_zones(&action);
        assert!(zones.contains(&Zone::SensitiveData));
        assert_eq!(irreversibility_for(&zones), Irreversibility::Elevated);
    }

    #[test]
    fn sensitive_data_plus_egress_is_sensitive() {
        let hr_read = build_from_tool_call(
            "read_file",
            json!({"path": "/data/hr/employees.csv"}).as_object().unwrap(),
        );
        let http_get = build_from_tool_call(
            "fetch_url",
            json!({"url": "https://api.example.com/data"}).as_object().unwrap(),
        );
        let mut union = classify_zones(&hr_read);
        union.extend(classify_zones(&http_get));
        assert!(union.is_superset(&BTreeSet::from([Zone::SensitiveData, Zone::EgressCapable])));
        assert_eq!(irreversibility_for(&union), Irreversibility::Sensitive);
    }

    #[test]
    fn empty_zones_are_safe() {
        assert_eq!(irreversibility_for(&BTreeSet::new()), Irreversibility::Safe);
    }
}
