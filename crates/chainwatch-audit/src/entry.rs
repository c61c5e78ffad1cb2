//! The shape of one audit line. Spec §3 and §6.

use serde::{Deserialize, Serialize};

/// The `action{tool, resource}` sub-object carried by every entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditAction {
    pub tool: String,
    pub resource: String,
}

/// One audit entry, before it is chained and serialized by [`crate::log::AuditLog`].
///
/// `timestamp` and `prev_hash` are filled in by `Record`; everything else is the
/// caller's responsibility. Optional fields are only present on specific entry
/// kinds (break-glass overrides, expiring approvals) and are omitted from the
/// serialized line entirely when absent — never emitted as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub trace_id: String,
    pub action: AuditAction,
    pub decision: String,
    pub reason: String,
    pub tier: u8,
    pub policy_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_decision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overridden_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl AuditEntry {
    /// A plain policy-decision entry; the other fields are filled in on demand
    /// with the `with_*` builders below.
    pub fn new(
        trace_id: impl Into<String>,
        tool: impl Into<String>,
        resource: impl Into<String>,
        decision: impl Into<String>,
        reason: impl Into<String>,
        tier: u8,
        policy_hash: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: None,
            trace_id: trace_id.into(),
            action: AuditAction { tool: tool.into(), resource: resource.into() },
            decision: decision.into(),
            reason: reason.into(),
            tier,
            policy_hash: policy_hash.into(),
            prev_hash: None,
            entry_type: None,
            token_id: None,
            original_decision: None,
            overridden_to: None,
            expires_at: None,
        }
    }

    pub fn with_type(mut self, entry_type: impl Into<String>) -> Self {
        self.entry_type = Some(entry_type.into());
        self
    }

    pub fn with_token_id(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    pub fn with_override(mut self, original_decision: impl Into<String>, overridden_to: impl Into<String>) -> Self {
        self.original_decision = Some(original_decision.into());
        self.overridden_to = Some(overridden_to.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: impl Into<String>) -> Self {
        self.expires_at = Some(expires_at.into());
        self
    }
}

/// Serialization wrapper enforcing the exact field order spec §6 mandates. Kept
/// separate from the public [`AuditEntry`] so field order is never an accident
/// of struct-declaration order — it is the wire contract.
#[derive(Serialize)]
pub(crate) struct AuditEntrySer<'a> {
    pub ts: &'a str,
    pub trace_id: &'a str,
    pub action: &'a AuditAction,
    pub decision: &'a str,
    pub reason: &'a str,
    pub tier: u8,
    pub policy_hash: &'a str,
    pub prev_hash: &'a str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_decision: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overridden_to: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<&'a str>,
}
