//! Non-streaming tool-call extraction and response rewriting. Spec §4.5.
//!
//! Wire-format detection and evaluation are separated: this module only knows
//! how to find tool calls inside an Anthropic or OpenAI JSON body and how to
//! rewrite blocked ones back into the same shape. Deciding what is blocked is
//! the caller's job, supplied as an `evaluate` closure so this crate never
//! needs to know about policy config, traces, or approvals directly.

use chainwatch_policy::config::Decision;
use chainwatch_policy::evaluate::PolicyResult;
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Default cap on a non-streaming response body read into memory. Spec §4.5.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// One extracted tool call, before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Position of the originating block/entry in its container array.
    pub index: usize,
    /// Parsed arguments; empty if `parse_error` is set.
    pub arguments: JsonMap<String, JsonValue>,
    /// Non-empty when `arguments` failed to parse (OpenAI's string-encoded
    /// `function.arguments`, or a truncated/malformed streaming buffer).
    pub parse_error: Option<String>,
}

/// Which LLM wire shape a response body matched, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireShape {
    Anthropic,
    OpenAi,
}

fn detect_shape(root: &JsonValue) -> Option<WireShape> {
    let obj = root.as_object()?;
    if obj.contains_key("content") && obj.contains_key("role") {
        return Some(WireShape::Anthropic);
    }
    if obj.get("choices").and_then(JsonValue::as_array).is_some() {
        return Some(WireShape::OpenAi);
    }
    None
}

fn is_json_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => ct.split(';').next().unwrap_or(ct).trim().eq_ignore_ascii_case("application/json"),
    }
}

/// Outcome of rewriting a non-streaming response body.
pub struct RewriteOutcome {
    pub body: Vec<u8>,
    /// `false` when the body was left untouched (not JSON, not a recognized
    /// shape, or no tool call was blocked) — the caller can skip recomputing
    /// `Content-Length` in that case, though it is always correct to do so.
    pub modified: bool,
    pub results: Vec<PolicyResult>,
}

fn blocked(decision: Decision) -> bool {
    matches!(decision, Decision::Deny | Decision::RequireApproval)
}

fn block_message(name: &str, reason: &str, policy_id: &str, approval_key: Option<&str>) -> String {
    match approval_key {
        Some(key) => format!("[BLOCKED by chainwatch] Tool '{name}' denied: {reason} (policy_id={policy_id}) (approval_key={key})"),
        None => format!("[BLOCKED by chainwatch] Tool '{name}' denied: {reason} (policy_id={policy_id})"),
    }
}

fn parse_tool_arguments(raw: &str) -> (JsonMap<String, JsonValue>, Option<String>) {
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Object(map)) => (map, None),
        Ok(_) => (JsonMap::new(), Some("arguments did not parse to a JSON object".to_string())),
        Err(e) => (JsonMap::new(), Some(e.to_string())),
    }
}

fn extract_anthropic(root: &JsonValue) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let Some(content) = root.get("content").and_then(JsonValue::as_array) else {
        return calls;
    };
    for (index, block) in content.iter().enumerate() {
        if block.get("type").and_then(JsonValue::as_str) != Some("tool_use") {
            continue;
        }
        let id = block.get("id").and_then(JsonValue::as_str).unwrap_or_default().to_string();
        let name = block.get("name").and_then(JsonValue::as_str).unwrap_or_default().to_string();
        let arguments = block.get("input").and_then(JsonValue::as_object).cloned().unwrap_or_default();
        calls.push(ToolCall { id, name, index, arguments, parse_error: None });
    }
    calls
}

fn extract_openai(root: &JsonValue) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let Some(tool_calls) = root.pointer("/choices/0/message/tool_calls").and_then(JsonValue::as_array) else {
        return calls;
    };
    for (index, entry) in tool_calls.iter().enumerate() {
        let id = entry.get("id").and_then(JsonValue::as_str).unwrap_or_default().to_string();
        let function = entry.get("function");
        let name = function.and_then(|f| f.get("name")).and_then(JsonValue::as_str).unwrap_or_default().to_string();
        let raw_args = function.and_then(|f| f.get("arguments")).and_then(JsonValue::as_str).unwrap_or("{}");
        let (arguments, parse_error) = parse_tool_arguments(raw_args);
        calls.push(ToolCall { id, name, index, arguments, parse_error });
    }
    calls
}

/// Extract every tool call from a response body, if its Content-Type and
/// top-level shape are recognized. Returns an empty vector for a passthrough
/// body (unrecognized content type or shape, or a shape with no tool calls).
pub fn extract_tool_calls(body: &[u8], content_type: Option<&str>) -> Vec<ToolCall> {
    if !is_json_content_type(content_type) {
        return Vec::new();
    }
    let Ok(root) = serde_json::from_slice::<JsonValue>(body) else {
        return Vec::new();
    };
    match detect_shape(&root) {
        Some(WireShape::Anthropic) => extract_anthropic(&root),
        Some(WireShape::OpenAi) => extract_openai(&root),
        None => Vec::new(),
    }
}

fn rewrite_anthropic(root: &mut JsonValue, calls: &[ToolCall], results: &[PolicyResult]) {
    let Some(content) = root.get_mut("content").and_then(JsonValue::as_array_mut) else {
        return;
    };
    let mut blocked_count = 0;
    for (call, result) in calls.iter().zip(results) {
        if !blocked(result.decision) {
            continue;
        }
        blocked_count += 1;
        let message = block_message(&call.name, &result.reason, &result.policy_id, result.approval_key.as_deref());
        if let Some(block) = content.get_mut(call.index) {
            *block = serde_json::json!({"type": "text", "text": message});
        }
    }
    if blocked_count == calls.len()
        && !calls.is_empty()
        && root.get("stop_reason").and_then(JsonValue::as_str) == Some("tool_use")
    {
        root["stop_reason"] = JsonValue::String("end_turn".to_string());
    }
}

fn rewrite_openai(root: &mut JsonValue, calls: &[ToolCall], results: &[PolicyResult]) {
    let mut kept = Vec::new();
    let mut block_messages = Vec::new();
    let Some(original) = root.pointer("/choices/0/message/tool_calls").and_then(JsonValue::as_array).cloned() else {
        return;
    };
    for (i, entry) in original.into_iter().enumerate() {
        let Some(result) = results.get(i) else {
            kept.push(entry);
            continue;
        };
        if blocked(result.decision) {
            let call = &calls[i];
            block_messages.push(block_message(&call.name, &result.reason, &result.policy_id, result.approval_key.as_deref()));
        } else {
            kept.push(entry);
        }
    }
    if block_messages.is_empty() {
        return;
    }
    let joined = block_messages.join("\n");
    let Some(message) = root.pointer_mut("/choices/0/message").and_then(JsonValue::as_object_mut) else {
        return;
    };
    if kept.is_empty() {
        message.insert("tool_calls".to_string(), JsonValue::Null);
        message.insert("content".to_string(), JsonValue::String(joined));
        if let Some(choice) = root.pointer_mut("/choices/0").and_then(JsonValue::as_object_mut) {
            if choice.get("finish_reason").and_then(JsonValue::as_str) == Some("tool_calls") {
                choice.insert("finish_reason".to_string(), JsonValue::String("stop".to_string()));
            }
        }
    } else {
        message.insert("tool_calls".to_string(), JsonValue::Array(kept));
        let appended = match message.get("content") {
            Some(JsonValue::String(existing)) if !existing.is_empty() => format!("{existing}\n{joined}"),
            _ => joined,
        };
        message.insert("content".to_string(), JsonValue::String(appended));
    }
}

/// Evaluate every tool call in `body` and rewrite blocked ones in place.
/// Byte-identical to `body` when no tool call is present or none are blocked,
/// satisfying spec §8's `RewriteResponse` no-op invariant.
pub fn rewrite_json_response(body: &[u8], content_type: Option<&str>, mut evaluate: impl FnMut(&ToolCall) -> PolicyResult) -> RewriteOutcome {
    if !is_json_content_type(content_type) {
        return RewriteOutcome { body: body.to_vec(), modified: false, results: Vec::new() };
    }
    let Ok(mut root) = serde_json::from_slice::<JsonValue>(body) else {
        return RewriteOutcome { body: body.to_vec(), modified: false, results: Vec::new() };
    };
    let shape = detect_shape(&root);
    let calls = match shape {
        Some(WireShape::Anthropic) => extract_anthropic(&root),
        Some(WireShape::OpenAi) => extract_openai(&root),
        None => return RewriteOutcome { body: body.to_vec(), modified: false, results: Vec::new() },
    };
    if calls.is_empty() {
        return RewriteOutcome { body: body.to_vec(), modified: false, results: Vec::new() };
    }

    let results: Vec<PolicyResult> = calls.iter().map(|c| evaluate(c)).collect();
    let any_blocked = results.iter().any(|r| blocked(r.decision));
    if !any_blocked {
        return RewriteOutcome { body: body.to_vec(), modified: false, results };
    }

    match shape {
        Some(WireShape::Anthropic) => rewrite_anthropic(&mut root, &calls, &results),
        Some(WireShape::OpenAi) => rewrite_openai(&mut root, &calls, &results),
        None => unreachable!("shape checked above"),
    }
    let body = serde_json::to_vec(&root).unwrap_or_else(|_| body.to_vec());
    RewriteOutcome { body, modified: true, results }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainwatch_policy::config::Decision;

    fn allow() -> PolicyResult {
        PolicyResult {
            decision: Decision::Allow,
            reason: "default".to_string(),
            policy_id: "default".to_string(),
            approval_key: None,
            tier: 0,
        }
    }

    fn deny(reason: &str, policy_id: &str, approval_key: Option<&str>) -> PolicyResult {
        PolicyResult {
            decision: Decision::Deny,
            reason: reason.to_string(),
            policy_id: policy_id.to_string(),
            approval_key: approval_key.map(str::to_string),
            tier: 3,
        }
    }

    #[test]
    fn anthropic_passthrough_when_no_tool_use() {
        let body = serde_json::to_vec(&serde_json::json!({
            "role": "assistant",
            "content": [{"type": "text", "text": "hello"}],
            "stop_reason": "end_turn",
        }))
        .unwrap();
        let outcome = rewrite_json_response(&body, Some("application/json"), |_| allow());
        assert!(!outcome.modified);
        assert_eq!(outcome.body, body);
    }

    #[test]
    fn anthropic_blocks_tool_use_and_flips_stop_reason() {
        let body = serde_json::to_vec(&serde_json::json!({
            "role": "assistant",
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "run_command", "input": {"command": "rm -rf /"}}],
            "stop_reason": "tool_use",
        }))
        .unwrap();
        let outcome = rewrite_json_response(&body, Some("application/json"), |_| deny("denylist hit", "pol-1", Some("abc123")));
        assert!(outcome.modified);
        let root: JsonValue = serde_json::from_slice(&outcome.body).unwrap();
        assert_eq!(root["content"][0]["type"], "text");
        assert!(root["content"][0]["text"].as_str().unwrap().contains("[BLOCKED by chainwatch]"));
        assert_eq!(root["stop_reason"], "end_turn");
    }

    #[test]
    fn openai_partial_block_keeps_finish_reason() {
        let body = serde_json::to_vec(&serde_json::json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "1", "function": {"name": "echo", "arguments": "{\"text\":\"hi\"}"}},
                        {"id": "2", "function": {"name": "run_command", "arguments": "{\"command\":\"rm -rf /\"}"}},
                    ],
                },
            }],
        }))
        .unwrap();
        let outcome = rewrite_json_response(&body, Some("application/json"), |c| {
            if c.name == "run_command" { deny("denylist hit", "pol-1", None) } else { allow() }
        });
        assert!(outcome.modified);
        let root: JsonValue = serde_json::from_slice(&outcome.body).unwrap();
        let tool_calls = root["choices"][0]["message"]["tool_calls"].as_array().unwrap();
        assert_eq!(tool_calls.len(), 1);
        assert_eq!(tool_calls[0]["id"], "1");
        assert_eq!(root["choices"][0]["finish_reason"], "tool_calls");
        assert!(root["choices"][0]["message"]["content"].as_str().unwrap().contains("[BLOCKED by chainwatch]"));
    }

    #[test]
    fn openai_full_block_nulls_tool_calls_and_stops() {
        let body = serde_json::to_vec(&serde_json::json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "1", "function": {"name": "run_command", "arguments": "{\"command\":\"rm -rf /\"}"}}],
                },
            }],
        }))
        .unwrap();
        let outcome = rewrite_json_response(&body, Some("application/json"), |_| deny("denylist hit", "pol-1", None));
        let root: JsonValue = serde_json::from_slice(&outcome.body).unwrap();
        assert!(root["choices"][0]["message"]["tool_calls"].is_null());
        assert_eq!(root["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn non_json_content_type_passes_through() {
        let body = b"<html></html>".to_vec();
        let outcome = rewrite_json_response(&body, Some("text/html"), |_| allow());
        assert!(!outcome.modified);
        assert_eq!(outcome.body, body);
    }

    #[test]
    fn openai_unparseable_arguments_still_evaluated() {
        let body = serde_json::to_vec(&serde_json::json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "1", "function": {"name": "run_command", "arguments": "not json"}},
                ]},
            }],
        }))
        .unwrap();
        let calls = extract_tool_calls(&body, Some("application/json"));
        assert_eq!(calls.len(), 1);
        assert!(calls[0].parse_error.is_some());
        assert!(calls[0].arguments.is_empty());
    }
}
