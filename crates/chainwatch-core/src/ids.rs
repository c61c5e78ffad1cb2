//! ID and timestamp utilities: monotonic ids, trace ids, audit timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a new monotonic identifier (starts at 1).
pub fn next_monotonic_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Milliseconds since UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("clock before epoch").as_millis() as u64
}

/// Opaque trace identifier in the form `t-<12hex>`.
pub fn new_trace_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("t-{}", &hex[..12])
}

/// Opaque break-glass token identifier in the form `bg-<16hex>`.
pub fn new_token_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("bg-{}", &hex[..16])
}

/// Current time as an ISO-8601 UTC timestamp with millisecond precision and a literal `Z` suffix.
pub fn now_iso8601_millis() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
