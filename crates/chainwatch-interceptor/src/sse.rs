//! Anthropic SSE streaming interceptor. Spec §4.5.
//!
//! `StreamBuffer` is an owned, per-request state machine keyed by
//! content-block index — never shared across requests or threads (spec §5:
//! "unshared, owned by one request coroutine"). It buffers `tool_use` blocks
//! until their `content_block_stop`, evaluates exactly once on finalization,
//! and either replays the buffered raw lines verbatim or synthesizes a
//! three-event block sequence in their place.

use std::collections::HashMap;

use chainwatch_policy::evaluate::PolicyResult;
use serde_json::Value as JsonValue;

use crate::toolcall::ToolCall;

/// Cap on accumulated `input_json_delta` bytes per buffered block. Spec §4.5.
pub const MAX_BUFFERED_INPUT_BYTES: usize = 1024 * 1024;

/// Largest byte index `<= index` that lands on a UTF-8 char boundary in `s`.
/// Used to truncate `partial_json` chunks without splitting a multibyte char,
/// since `partial_json` comes from an adversarial or simply unlucky upstream
/// and `&s[..index]` panics on a non-boundary index.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut cut = index;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

struct BufferedBlock {
    id: String,
    name: String,
    accumulated: String,
    truncated: bool,
    raw_lines: Vec<String>,
}

/// One parsed SSE event: its `event:` name (empty if absent) and `data:` JSON.
#[derive(Debug, Clone)]
struct SseEvent {
    event: String,
    data: JsonValue,
}

fn parse_event(raw: &str) -> Option<SseEvent> {
    let mut event = String::new();
    let mut data = String::new();
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim());
        }
    }
    if data.is_empty() {
        return None;
    }
    let value = serde_json::from_str(&data).ok()?;
    Some(SseEvent { event, data: value })
}

/// What the proxy should do with one incoming raw SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseOutcome {
    /// Forward this raw text to the client immediately, unmodified.
    Forward(String),
    /// The event was absorbed into a buffered tool-use block; nothing to
    /// write to the client yet.
    Buffering,
    /// A buffered block finalized and was allowed: replay these raw lines
    /// (joined, in original order) verbatim.
    Replay(String),
    /// A buffered block finalized and was blocked: write this synthesized
    /// three-event sequence in its place.
    Synthesized(String),
}

/// Per-request SSE interceptor state. See module docs for the lifecycle.
#[derive(Default)]
pub struct StreamBuffer {
    blocks: HashMap<u64, BufferedBlock>,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self { blocks: HashMap::new() }
    }

    /// Process one raw SSE event (one `event:`/`data:` pair, blank-line
    /// terminated). `evaluate` is called at most once per buffered block, on
    /// its `content_block_stop`.
    pub fn process(&mut self, raw: &str, mut evaluate: impl FnMut(&ToolCall) -> PolicyResult) -> SseOutcome {
        let Some(parsed) = parse_event(raw) else {
            return SseOutcome::Forward(raw.to_string());
        };

        match parsed.event.as_str() {
            "content_block_start" => self.on_start(raw, &parsed),
            "content_block_delta" => self.on_delta(raw, &parsed),
            "content_block_stop" => self.on_stop(raw, &parsed, &mut evaluate),
            _ => SseOutcome::Forward(raw.to_string()),
        }
    }

    fn index_of(data: &JsonValue) -> Option<u64> {
        data.get("index").and_then(JsonValue::as_u64)
    }

    fn on_start(&mut self, raw: &str, parsed: &SseEvent) -> SseOutcome {
        let Some(index) = Self::index_of(&parsed.data) else {
            return SseOutcome::Forward(raw.to_string());
        };
        let is_tool_use = parsed.data.get("content_block").and_then(|b| b.get("type")).and_then(JsonValue::as_str) == Some("tool_use");
        if !is_tool_use {
            return SseOutcome::Forward(raw.to_string());
        }
        let id = parsed.data.pointer("/content_block/id").and_then(JsonValue::as_str).unwrap_or_default().to_string();
        let name = parsed.data.pointer("/content_block/name").and_then(JsonValue::as_str).unwrap_or_default().to_string();
        self.blocks.insert(
            index,
            BufferedBlock { id, name, accumulated: String::new(), truncated: false, raw_lines: vec![raw.to_string()] },
        );
        SseOutcome::Buffering
    }

    fn on_delta(&mut self, raw: &str, parsed: &SseEvent) -> SseOutcome {
        let Some(index) = Self::index_of(&parsed.data) else {
            return SseOutcome::Forward(raw.to_string());
        };
        let Some(block) = self.blocks.get_mut(&index) else {
            return SseOutcome::Forward(raw.to_string());
        };
        let is_input_json = parsed.data.pointer("/delta/type").and_then(JsonValue::as_str) == Some("input_json_delta");
        if is_input_json {
            if let Some(partial) = parsed.data.pointer("/delta/partial_json").and_then(JsonValue::as_str) {
                if block.accumulated.len() + partial.len() > MAX_BUFFERED_INPUT_BYTES {
                    block.truncated = true;
                    let remaining = MAX_BUFFERED_INPUT_BYTES.saturating_sub(block.accumulated.len());
                    let cut = floor_char_boundary(partial, remaining.min(partial.len()));
                    block.accumulated.push_str(&partial[..cut]);
                } else {
                    block.accumulated.push_str(partial);
                }
            }
        }
        block.raw_lines.push(raw.to_string());
        SseOutcome::Buffering
    }

    fn on_stop(&mut self, raw: &str, parsed: &SseEvent, evaluate: &mut impl FnMut(&ToolCall) -> PolicyResult) -> SseOutcome {
        let Some(index) = Self::index_of(&parsed.data) else {
            return SseOutcome::Forward(raw.to_string());
        };
        let Some(mut block) = self.blocks.remove(&index) else {
            return SseOutcome::Forward(raw.to_string());
        };
        block.raw_lines.push(raw.to_string());

        let (arguments, parse_error) = if block.truncated {
            (serde_json::Map::new(), Some("accumulated tool input exceeded the 1 MiB buffering cap".to_string()))
        } else {
            match serde_json::from_str::<JsonValue>(&block.accumulated) {
                Ok(JsonValue::Object(map)) => (map, None),
                Ok(_) => (serde_json::Map::new(), Some("tool input did not parse to a JSON object".to_string())),
                Err(e) => (serde_json::Map::new(), Some(e.to_string())),
            }
        };

        let call = ToolCall { id: block.id.clone(), name: block.name.clone(), index: index as usize, arguments, parse_error };
        let result = evaluate(&call);

        if matches!(result.decision, chainwatch_policy::config::Decision::Deny | chainwatch_policy::config::Decision::RequireApproval) {
            SseOutcome::Synthesized(synthesize_block(index, &call.name, &result))
        } else {
            SseOutcome::Replay(block.raw_lines.join("\n\n") + "\n\n")
        }
    }
}

fn synthesize_block(index: u64, name: &str, result: &PolicyResult) -> String {
    let message = match &result.approval_key {
        Some(key) => format!("[BLOCKED by chainwatch] Tool '{name}' denied: {} (policy_id={}) (approval_key={key})", result.reason, result.policy_id),
        None => format!("[BLOCKED by chainwatch] Tool '{name}' denied: {} (policy_id={})", result.reason, result.policy_id),
    };
    let start = serde_json::json!({"type": "content_block_start", "index": index, "content_block": {"type": "text", "text": ""}});
    let delta = serde_json::json!({"type": "content_block_delta", "index": index, "delta": {"type": "text_delta", "text": message}});
    let stop = serde_json::json!({"type": "content_block_stop", "index": index});
    format!(
        "event: content_block_start\ndata: {start}\n\nevent: content_block_delta\ndata: {delta}\n\nevent: content_block_stop\ndata: {stop}\n\n"
    )
}
