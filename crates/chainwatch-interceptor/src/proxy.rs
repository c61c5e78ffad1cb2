//! Header-forwarding and redaction helpers shared by the proxy handler.
//!
//! Grounded on the `Ai-Link` gateway's response-header filtering (strip
//! `server`/`x-request-id`/`x-powered-by`/`content-length`/`transfer-encoding`
//! before relaying upstream headers to the client) and generalized to also
//! cover the request side, since this proxy forwards in both directions.

use std::collections::BTreeMap;

use http::HeaderMap;

/// Headers never forwarded in either direction: hop-by-hop per RFC 7230 §6.1,
/// plus `host` and `content-length` — both recomputed by the sending side
/// (reqwest on the way out, axum's `Body` on the way back) once the body is
/// finalized.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Additional headers stripped only from the upstream response before it
/// reaches the client — identifying information about the upstream process
/// this proxy sits in front of.
const RESPONSE_ONLY_STRIP: &[&str] = &["server", "x-request-id", "x-powered-by"];

/// Header names whose values must never appear in a log line.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "x-api-key", "cookie", "set-cookie", "proxy-authorization"];

pub fn should_forward_request_header(name: &str) -> bool {
    !HOP_BY_HOP.contains(&name)
}

pub fn should_forward_response_header(name: &str) -> bool {
    !HOP_BY_HOP.contains(&name) && !RESPONSE_ONLY_STRIP.contains(&name)
}

/// A `{header: value}` map safe to pass to `tracing`, with sensitive values
/// replaced by `[REDACTED]`.
pub fn redacted_headers_from_http(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let key = name.as_str().to_ascii_lowercase();
            let shown = if SENSITIVE_HEADERS.contains(&key.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("<non-utf8>").to_string()
            };
            (key, shown)
        })
        .collect()
}
