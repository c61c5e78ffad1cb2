//! Streaming LLM-response tool-call interceptor. Spec §4.5.
//!
//! [`toolcall`] and [`sse`] are pure, policy-agnostic rewriting functions; this
//! module composes them with the rest of the workspace — the policy evaluator,
//! the trace accumulator, the audit log, and the approval/break-glass stores —
//! behind a thin `axum::Router`. That router (see [`router`]) is a convenience
//! harness for exercising the library end-to-end, grounded on the `Ai-Link`
//! gateway's `proxy_handler` shape (extract → evaluate → forward → audit); the
//! production transport remains a collaborator's to build.

#![deny(unsafe_code)]

pub mod error;
pub mod proxy;
pub mod sse;
pub mod toolcall;

pub use error::InterceptError;
pub use sse::{SseOutcome, StreamBuffer};
pub use toolcall::{rewrite_json_response, RewriteOutcome, ToolCall, MAX_BODY_BYTES};

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chainwatch_accumulator::TraceRegistry;
use chainwatch_approval::{ApprovalStatus, ApprovalStore, BreakGlassStore, MIN_TIER_FOR_BREAK_GLASS};
use chainwatch_audit::{AuditEntry, AuditLog};
use chainwatch_core::ids::new_trace_id;
use chainwatch_policy::classify::build_from_tool_call;
use chainwatch_policy::config::Decision;
use chainwatch_policy::{evaluate, PolicyHandle, PolicyResult};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Everything the convenience router needs to evaluate, audit, and forward one
/// intercepted request. Cheap to clone (every field is an `Arc` or a
/// `reqwest::Client`, itself internally reference-counted).
pub struct InterceptorState {
    pub policy: Arc<PolicyHandle>,
    pub traces: Arc<TraceRegistry>,
    pub audit: Arc<AuditLog>,
    pub approvals: Arc<ApprovalStore>,
    pub break_glass: Arc<BreakGlassStore>,
    pub http: reqwest::Client,
    pub upstream_base: String,
    pub cancel: CancellationToken,
}

impl InterceptorState {
    pub fn new(
        policy: Arc<PolicyHandle>,
        traces: Arc<TraceRegistry>,
        audit: Arc<AuditLog>,
        approvals: Arc<ApprovalStore>,
        break_glass: Arc<BreakGlassStore>,
        upstream_base: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            traces,
            audit,
            approvals,
            break_glass,
            http: reqwest::Client::new(),
            upstream_base: upstream_base.into(),
            cancel: CancellationToken::new(),
        }
    }
}

/// A single `/v1/messages`-shaped passthrough route wrapping [`rewrite_json_response`]
/// and [`sse::StreamBuffer`] behind evaluation, approval/break-glass consultation, and
/// audit logging. See the module docs for why this is a harness, not production transport.
pub fn router(state: Arc<InterceptorState>) -> Router {
    Router::new().route("/v1/messages", post(messages_handler)).with_state(state)
}

fn header_or<'a>(headers: &'a HeaderMap, name: &str, default: &'a str) -> String {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or(default).to_string()
}

fn decision_str(decision: Decision) -> &'static str {
    match decision {
        Decision::Allow => "allow",
        Decision::Deny => "deny",
        Decision::RequireApproval => "require_approval",
        Decision::AllowWithRedaction => "allow_with_redaction",
    }
}

/// Evaluate one extracted tool call end to end: classify it into an `Action`,
/// run the policy evaluator against this trace's accumulated state, consult
/// the approval and break-glass stores for overrides, fold the outcome into
/// the trace accumulator, and append one audit entry. Spec §4.4's evaluator is
/// total and never errors; an audit-log write failure is logged but does not
/// change the decision already made in memory (spec §7).
fn evaluate_call(state: &InterceptorState, trace_id: &str, actor: &str, purpose: &str, call: &ToolCall) -> PolicyResult {
    let action = build_from_tool_call(&call.name, &call.arguments);
    let loaded = state.policy.load();
    let accumulator = state.traces.get_or_create(trace_id);
    let snapshot = accumulator.snapshot();

    let mut result = evaluate(&action, &snapshot, purpose, &loaded.denylist, &loaded.config);
    let mut override_of: Option<(Decision, Option<String>)> = None;

    if result.decision == Decision::RequireApproval {
        if let Some(key) = result.approval_key.clone() {
            match state.approvals.check(&key) {
                Ok(ApprovalStatus::Approved) => {
                    override_of = Some((result.decision, None));
                    result = PolicyResult { decision: Decision::Allow, reason: format!("approved: {}", result.reason), ..result };
                }
                Ok(ApprovalStatus::Denied) => {
                    result = PolicyResult { decision: Decision::Deny, ..result };
                }
                Ok(ApprovalStatus::Pending | ApprovalStatus::Expired) | Err(_) => {
                    if let Err(e) = state.approvals.request(&key, &result.reason, &result.policy_id, &action.resource) {
                        warn!(key, error = %e, "failed to persist approval request");
                    }
                }
            }
        }
    }

    if matches!(result.decision, Decision::Deny | Decision::RequireApproval) && result.tier >= MIN_TIER_FOR_BREAK_GLASS {
        if let Some(token) = state.break_glass.check_and_consume(result.tier, &action) {
            override_of = Some((result.decision, Some(token.id.clone())));
            result = PolicyResult {
                decision: Decision::Allow,
                reason: format!("break-glass override ({}): {}", token.reason, result.reason),
                ..result
            };
        }
    }

    let decision_label = decision_str(result.decision);
    let _event = accumulator.record_action(actor, purpose, action.clone(), None).with_decision(decision_label);

    let mut entry =
        AuditEntry::new(trace_id, action.tool.to_string(), action.resource.clone(), decision_label, result.reason.clone(), result.tier, loaded.config.policy_hash());
    if let Some((original, token_id)) = override_of {
        entry = entry.with_override(decision_str(original), decision_label);
        entry = match token_id {
            Some(id) => entry.with_type("break_glass").with_token_id(id),
            None => entry.with_type("approval"),
        };
    }
    if let Err(e) = state.audit.record(entry) {
        error!(trace_id, error = %e, "audit log write failed; in-memory decision stands");
    }

    result
}

/// Split an SSE byte stream into its constituent events (`event:`/`data:`
/// blocks, blank-line terminated), dropping any trailing partial event.
fn split_sse_events(text: &str) -> Vec<String> {
    text.split("\n\n").map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

async fn messages_handler(State(state): State<Arc<InterceptorState>>, headers: HeaderMap, body: Bytes) -> Result<Response, InterceptError> {
    if state.cancel.is_cancelled() {
        return Err(InterceptError::Cancelled);
    }

    let trace_id = headers.get("x-chainwatch-trace-id").and_then(|v| v.to_str().ok()).map(str::to_string).unwrap_or_else(new_trace_id);
    let actor = header_or(&headers, "x-chainwatch-actor", "agent");
    let purpose = header_or(&headers, "x-chainwatch-purpose", "default");

    let upstream_url = format!("{}/v1/messages", state.upstream_base.trim_end_matches('/'));
    let mut request = state.http.post(&upstream_url).body(body.to_vec());
    for (name, value) in &headers {
        if proxy::should_forward_request_header(name.as_str()) {
            request = request.header(name.clone(), value.clone());
        }
    }

    let upstream_response = tokio::select! {
        res = request.send() => res.map_err(|e| InterceptError::Upstream(e.to_string()))?,
        () = state.cancel.cancelled() => return Err(InterceptError::Cancelled),
    };

    let status = upstream_response.status();
    let response_headers = upstream_response.headers().clone();
    let content_type = response_headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string);
    let body_bytes = upstream_response.bytes().await.map_err(|e| InterceptError::Upstream(e.to_string()))?;

    let is_sse = content_type.as_deref().is_some_and(|ct| ct.starts_with("text/event-stream"));
    let is_oversized = body_bytes.len() > MAX_BODY_BYTES;

    let out_body: Vec<u8> = if is_oversized {
        body_bytes.to_vec()
    } else if is_sse {
        let text = String::from_utf8_lossy(&body_bytes);
        let mut buffer = StreamBuffer::new();
        let mut out = String::new();
        for raw_event in split_sse_events(&text) {
            let outcome = buffer.process(&raw_event, |call| evaluate_call(&state, &trace_id, &actor, &purpose, call));
            match outcome {
                SseOutcome::Forward(text) | SseOutcome::Replay(text) | SseOutcome::Synthesized(text) => out.push_str(&text),
                SseOutcome::Buffering => {}
            }
        }
        out.into_bytes()
    } else {
        let outcome = rewrite_json_response(&body_bytes, content_type.as_deref(), |call| evaluate_call(&state, &trace_id, &actor, &purpose, call));
        outcome.body
    };

    let mut builder = Response::builder().status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in &response_headers {
        if proxy::should_forward_response_header(name.as_str()) {
            builder = builder.header(name, value);
        }
    }
    builder.body(axum::body::Body::from(out_body)).map_err(|e| InterceptError::Upstream(e.to_string()))
}

impl IntoResponse for InterceptError {
    fn into_response(self) -> Response {
        let status = match &self {
            InterceptError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            InterceptError::Upstream(_) => StatusCode::BAD_GATEWAY,
            InterceptError::Parse(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}
