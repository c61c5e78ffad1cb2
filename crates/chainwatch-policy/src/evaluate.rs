//! The policy evaluator — spec §4.4, "the hard core". A total, deterministic
//! function from `(Action, TraceState, Purpose, Denylist, PolicyConfig)` to a
//! `PolicyResult`. Never panics, never errors; every input produces a decision.

use chainwatch_core::{Action, Sensitivity, TraceState};
use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::config::{Decision, EnforcementMode, PolicyConfig, Rule};
use crate::denylist::Denylist;
use crate::zone::{classify_zones, irreversibility_for};

/// Path and service-name fragments that identify chainwatch's own installation.
/// Matching any of these triggers the non-overridable Law of Self-Preservation.
const SELF_PATH_MARKERS: &[&str] =
    &["/opt/chainwatch", "/etc/chainwatch", "/var/lib/chainwatch", ".chainwatch/"];
const SELF_SERVICE_MARKERS: &[&str] =
    &["chainwatch.service", "chainwatch-core", "chainwatch-interceptor", "chainwatch-monitor", "chainwatch-proxy"];

/// Result of evaluating one action: what to do, why, and under what provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub decision: Decision,
    pub reason: String,
    pub policy_id: String,
    pub approval_key: Option<String>,
    /// Severity tier, `0..=3`.
    pub tier: u8,
}

impl PolicyResult {
    fn new(decision: Decision, reason: impl Into<String>, policy_id: impl Into<String>, approval_key: Option<String>, tier: u8) -> Self {
        Self { decision, reason: reason.into(), policy_id: policy_id.into(), approval_key, tier }
    }
}

/// Whether `action` targets chainwatch's own install path, service, or binaries.
/// Spec §4.4 step 1: "Law of Self-Preservation." Non-overridable by break-glass
/// (see `chainwatch_approval::break_glass::check_and_consume`).
pub fn is_self_targeting(action: &Action) -> bool {
    let lower = action.resource_lower();
    if SELF_PATH_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return true;
    }
    SELF_SERVICE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Stable identifier by which a blocked action and its future retry agree on a
/// pending approval: `sha1(tool|resource|purpose)[..16]`.
pub fn approval_key_for(action: &Action, purpose: &str) -> String {
    let input = format!("{}|{}|{}", action.tool, action.resource, purpose);
    let digest = Sha1::digest(input.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn rule_matches(rule: &Rule, purpose: &str, action: &Action) -> bool {
    if rule.purpose != "*" && rule.purpose != purpose {
        return false;
    }
    GlobBuilder::new(&rule.resource_pattern)
        .case_insensitive(true)
        .build()
        .map(|glob| glob.compile_matcher().is_match(&action.resource))
        .unwrap_or(false)
}

/// Relaxed mode folds any `RequireApproval` produced by later steps back to `Allow`;
/// `Deny` (and `AllowWithRedaction`) pass through untouched. Spec §4.4 step 3.
fn fold_for_enforcement_mode(result: PolicyResult, mode: EnforcementMode) -> PolicyResult {
    if mode == EnforcementMode::Relaxed && result.decision == Decision::RequireApproval {
        PolicyResult { decision: Decision::Allow, ..result }
    } else {
        result
    }
}

/// Evaluate one action against accumulated trace state, the active denylist, and
/// the operator's policy configuration. Total and deterministic: identical inputs
/// always produce a byte-identical [`PolicyResult`] (`reason` strings are fixed
/// templates so they can be safely hashed into audit entries).
pub fn evaluate(action: &Action, trace: &TraceState, purpose: &str, denylist: &Denylist, policy: &PolicyConfig) -> PolicyResult {
    let result = evaluate_inner(action, trace, purpose, denylist, policy);
    debug!(
        tool = %action.tool,
        resource = %action.resource,
        decision = ?result.decision,
        policy_id = %result.policy_id,
        tier = result.tier,
        "policy evaluated"
    );
    result
}

fn evaluate_inner(action: &Action, trace: &TraceState, purpose: &str, denylist: &Denylist, policy: &PolicyConfig) -> PolicyResult {
    // 1. Law of Self-Preservation — not overridable, not subject to enforcement mode.
    if is_self_targeting(action) {
        return PolicyResult::new(
            Decision::Deny,
            "action targets chainwatch's own install path or service and is always denied",
            "self_preserve",
            None,
            3,
        );
    }

    // 2. Denylist hit.
    if let Some(hit) = denylist.matches(action) {
        return PolicyResult::new(
            Decision::Deny,
            format!("resource matches {} denylist pattern '{}'", hit.kind, hit.pattern),
            format!("denylist.{}", hit.kind),
            None,
            3,
        );
    }

    let mode = policy.enforcement_mode;

    // 3. Enforcement-mode floor (locked only; relaxed is folded in at the end).
    if mode == EnforcementMode::Locked && action.raw_meta.sensitivity >= Sensitivity::Medium {
        let key = approval_key_for(action, purpose);
        return fold_for_enforcement_mode(
            PolicyResult::new(
                Decision::RequireApproval,
                "enforcement_mode=locked requires approval for any action of sensitivity >= medium",
                "enforcement_floor.locked",
                Some(key),
                2,
            ),
            mode,
        );
    }

    // Zone tier is computed once and consulted by both the operator-rule step
    // (to take the max with a matched rule's declared tier) and the zone floor.
    let zones_added = classify_zones(action);
    let mut union_zones = trace.zones_entered.clone();
    union_zones.extend(zones_added.iter().copied());
    let zone_tier = irreversibility_for(&union_zones).tier();
    let threshold = policy.approval_threshold.unwrap_or(2);

    // 4. Operator rules, first match wins.
    if let Some((index, rule)) = policy.rules.iter().enumerate().find(|(_, rule)| rule_matches(rule, purpose, action)) {
        let tier = rule.tier.max(zone_tier);
        let policy_id = format!("rule[{index}]");

        if rule.decision == Decision::Allow || rule.decision == Decision::Deny {
            // An explicit operator Allow or Deny is returned as-is: the floor can
            // only ever raise a decision towards RequireApproval, never silently
            // downgrade an operator's explicit Deny back into something approvable.
            return fold_for_enforcement_mode(
                PolicyResult::new(rule.decision, rule.reason.clone(), policy_id, rule.approval_key.clone(), tier),
                mode,
            );
        }

        // 5. Zone/tier floor, applied against the rule's own (AllowWithRedaction or
        // RequireApproval) decision — never reached for Deny, see above.
        if tier >= threshold {
            let key = rule.approval_key.clone().unwrap_or_else(|| approval_key_for(action, purpose));
            return fold_for_enforcement_mode(
                PolicyResult::new(Decision::RequireApproval, rule.reason.clone(), policy_id, Some(key), tier),
                mode,
            );
        }

        return fold_for_enforcement_mode(
            PolicyResult::new(rule.decision, rule.reason.clone(), policy_id, rule.approval_key.clone(), tier),
            mode,
        );
    }

    // 5. Zone/tier floor, no operator rule matched.
    if zone_tier >= threshold {
        let key = approval_key_for(action, purpose);
        return fold_for_enforcement_mode(
            PolicyResult::new(
                Decision::RequireApproval,
                "zone irreversibility tier meets the configured approval threshold",
                "zone_floor",
                Some(key),
                zone_tier,
            ),
            mode,
        );
    }

    // 6. Default.
    fold_for_enforcement_mode(PolicyResult::new(Decision::Allow, "default", "default", None, zone_tier), mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::build_from_command;
    use chainwatch_core::TraceState;

    fn denylist() -> Denylist {
        Denylist::default()
    }

    #[test]
    fn evaluate_is_deterministic() {
        let action = build_from_command("rm", &["-rf".into(), "/".into()]);
        let trace = TraceState::new();
        let policy = PolicyConfig::default();
        let a = evaluate(&action, &trace, "ops", &denylist(), &policy);
        let b = evaluate(&action, &trace, "ops", &denylist(), &policy);
        assert_eq!(a, b);
    }

    #[test]
    fn self_preservation_denies_and_is_not_subject_to_enforcement_mode() {
        let action = build_from_command("systemctl", &["stop".into(), "chainwatch.service".into()]);
        let trace = TraceState::new();
        let mut policy = PolicyConfig::default();
        policy.enforcement_mode = EnforcementMode::Relaxed;
        let result = evaluate(&action, &trace, "ops", &denylist(), &policy);
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.policy_id, "self_preserve");
    }

    #[test]
    fn denylist_hit_denies_before_rules_are_consulted() {
        let action = build_from_command("curl", &["https://evil.example.com".into()]);
        let trace = TraceState::new();
        let policy = PolicyConfig::default();
        let denylist = Denylist { urls: vec!["evil.example.com".into()], ..Default::default() };
        let result = evaluate(&action, &trace, "ops", &denylist, &policy);
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.policy_id, "denylist.url");
    }

    #[test]
    fn locked_mode_escalates_medium_sensitivity_to_approval() {
        let action = build_from_command("curl", &["https://example.com".into()]);
        let trace = TraceState::new();
        let mut policy = PolicyConfig::default();
        policy.enforcement_mode = EnforcementMode::Locked;
        let result = evaluate(&action, &trace, "ops", &denylist(), &policy);
        assert_eq!(result.decision, Decision::RequireApproval);
        assert!(result.approval_key.is_some());
    }

    #[test]
    fn relaxed_mode_folds_require_approval_to_allow() {
        let action = build_from_command("sudo", &["systemctl".into(), "restart".into(), "nginx".into()]);
        let trace = TraceState::new();
        let mut policy = PolicyConfig::default();
        policy.enforcement_mode = EnforcementMode::Relaxed;
        let result = evaluate(&action, &trace, "ops", &denylist(), &policy);
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn operator_rule_first_match_wins() {
        let action = build_from_command("git", &["push".into(), "origin".into(), "main".into()]);
        let trace = TraceState::new();
        let mut policy = PolicyConfig::default();
        policy.rules = vec![
            Rule {
                purpose: "*".into(),
                resource_pattern: "git push*".into(),
                decision: Decision::Deny,
                reason: "no direct pushes to origin".into(),
                approval_key: None,
                tier: 3,
            },
            Rule {
                purpose: "*".into(),
                resource_pattern: "git push*".into(),
                decision: Decision::Allow,
                reason: "unreachable, first rule already matched".into(),
                approval_key: None,
                tier: 0,
            },
        ];
        let result = evaluate(&action, &trace, "ops", &denylist(), &policy);
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.policy_id, "rule[0]");
    }

    #[test]
    fn operator_deny_is_never_downgraded_by_the_zone_tier_floor() {
        let action = build_from_command("rm", &["-rf".into(), "/data".into()]);
        let trace = TraceState::new();
        let mut policy = PolicyConfig::default();
        policy.rules = vec![Rule {
            purpose: "*".into(),
            resource_pattern: "rm -rf*".into(),
            decision: Decision::Deny,
            reason: "recursive delete is never allowed".into(),
            approval_key: None,
            tier: 3,
        }];
        let result = evaluate(&action, &trace, "ops", &denylist(), &policy);
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.policy_id, "rule[0]");
    }

    #[test]
    fn default_allow_for_low_sensitivity_command() {
        let action = build_from_command("ls", &["-la".into()]);
        let trace = TraceState::new();
        let policy = PolicyConfig::default();
        let result = evaluate(&action, &trace, "ops", &denylist(), &policy);
        assert_eq!(result.decision, Decision::Allow);
        assert_eq!(result.policy_id, "default");
    }

    #[test]
    fn zone_floor_requires_approval_for_destructive_command() {
        let action = build_from_command("rm", &["-rf".into(), "/data".into()]);
        let trace = TraceState::new();
        let policy = PolicyConfig::default();
        let result = evaluate(&action, &trace, "ops", &denylist(), &policy);
        assert_eq!(result.decision, Decision::RequireApproval);
        assert_eq!(result.tier, 3);
    }
}
