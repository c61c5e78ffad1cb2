//! A small observer seam so a caller (the interceptor, the process monitor)
//! can report every [`chainwatch_policy::PolicyResult`] it produces without
//! those crates depending on telemetry directly. Grounded on the teacher's
//! OTel-backed policy observer, generalized from a single global counter to a
//! trait so a non-OTel build still gets structured log lines for free.

use chainwatch_policy::config::Decision;
use chainwatch_policy::PolicyResult;
use tracing::{info, warn};

/// Receives one notification per policy decision made.
pub trait PolicyObserver: Send + Sync {
    fn on_decision(&self, trace_id: &str, tool: &str, resource: &str, result: &PolicyResult);
}

/// The default observer: structured `tracing` events, no external dependency.
/// `Deny`/`RequireApproval` log at `warn`; everything else at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPolicyObserver;

impl PolicyObserver for LoggingPolicyObserver {
    fn on_decision(&self, trace_id: &str, tool: &str, resource: &str, result: &PolicyResult) {
        let decision = decision_str(result.decision);
        if matches!(result.decision, Decision::Deny | Decision::RequireApproval) {
            warn!(
                trace_id,
                tool,
                resource,
                decision,
                tier = result.tier,
                policy_id = %result.policy_id,
                reason = %result.reason,
                "policy decision"
            );
        } else {
            info!(
                trace_id,
                tool,
                resource,
                decision,
                tier = result.tier,
                policy_id = %result.policy_id,
                "policy decision"
            );
        }
    }
}

fn decision_str(decision: Decision) -> &'static str {
    match decision {
        Decision::Allow => "allow",
        Decision::Deny => "deny",
        Decision::RequireApproval => "require_approval",
        Decision::AllowWithRedaction => "allow_with_redaction",
    }
}
