//! `AlertEvent` (spec §6) and a bounded fan-out dispatcher.
//!
//! Webhook *formatting and delivery* is an out-of-scope collaborator (spec
//! §1), so this module does not speak HTTP. It defines the event the core
//! emits and a generic sink seam a collaborator plugs a real webhook client
//! into, plus the fan-out discipline design note §9 calls out: one task per
//! destination per event, fire-and-forget, bounded by a small worker pool so
//! a deny burst can't thunder-herd the collaborator's webhook targets.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, warn};

/// The payload delivered to each alert destination. Spec §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub timestamp: String,
    pub trace_id: String,
    pub tool: String,
    pub resource: String,
    pub decision: String,
    pub reason: String,
    pub tier: u8,
    pub policy_hash: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

/// What a collaborator implements to actually deliver an [`AlertEvent`]
/// somewhere (a webhook, Slack, PagerDuty, ...). The core only knows how to
/// fan an event out to a set of these, not how any of them work.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// A stable name for this destination, used in log lines on failure.
    fn name(&self) -> &str;
    async fn send(&self, event: &AlertEvent) -> Result<(), SendError>;
}

/// Fans one [`AlertEvent`] out to every configured [`AlertSink`], one spawned
/// task per destination, bounded by a semaphore so a burst of denials can't
/// spawn unbounded concurrent deliveries. Fire-and-forget: the caller does not
/// await delivery outcomes, matching the teacher's dispatch semantics; a
/// failed delivery is logged and dropped, never fed back into the decision
/// that triggered it.
pub struct AlertDispatcher {
    sinks: Vec<Arc<dyn AlertSink>>,
    permits: Arc<Semaphore>,
}

impl AlertDispatcher {
    /// `max_concurrent` bounds the number of in-flight deliveries across all
    /// destinations and events at once.
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>, max_concurrent: usize) -> Self {
        Self { sinks, permits: Arc::new(Semaphore::new(max_concurrent.max(1))) }
    }

    /// Spawn one fire-and-forget delivery task per sink for `event`. Returns
    /// immediately; callers that need to know delivery completed for tests
    /// should await the handles this method does not expose — it is
    /// deliberately fire-and-forget in production use.
    pub fn dispatch(&self, event: AlertEvent) {
        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let permits = Arc::clone(&self.permits);
            let event = event.clone();
            tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if let Err(e) = sink.send(&event).await {
                    warn!(sink = sink.name(), trace_id = %event.trace_id, error = %e, "alert delivery failed");
                }
            });
        }
    }

    /// Like [`Self::dispatch`] but awaits every delivery, for callers (tests,
    /// a shutdown path) that need the fan-out to have actually completed.
    pub async fn dispatch_and_wait(&self, event: AlertEvent) {
        let mut handles = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let permits = Arc::clone(&self.permits);
            let event = event.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if let Err(e) = sink.send(&event).await {
                    error!(sink = sink.name(), trace_id = %event.trace_id, error = %e, "alert delivery failed");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingSink {
        name: String,
        count: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl AlertSink for CountingSink {
        fn name(&self) -> &str {
            &self.name
        }
        async fn send(&self, _event: &AlertEvent) -> Result<(), SendError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SendError::Delivery("simulated failure".into()));
            }
            Ok(())
        }
    }

    fn sample_event() -> AlertEvent {
        AlertEvent {
            timestamp: "2026-01-01T00:00:00.000Z".into(),
            trace_id: "t-000000000000".into(),
            tool: "command".into(),
            resource: "rm -rf /".into(),
            decision: "deny".into(),
            reason: "denylist hit".into(),
            tier: 3,
            policy_hash: "sha256:deadbeef".into(),
            entry_type: None,
        }
    }

    #[tokio::test]
    async fn dispatch_and_wait_delivers_to_every_sink() {
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let sinks: Vec<Arc<dyn AlertSink>> = vec![
            Arc::new(CountingSink { name: "a".into(), count: count_a.clone(), fail: false }),
            Arc::new(CountingSink { name: "b".into(), count: count_b.clone(), fail: false }),
        ];
        let dispatcher = AlertDispatcher::new(sinks, 4);
        dispatcher.dispatch_and_wait(sample_event()).await;
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_failing_sink_does_not_prevent_others_from_delivering() {
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let sinks: Vec<Arc<dyn AlertSink>> = vec![
            Arc::new(CountingSink { name: "failing".into(), count: count_a.clone(), fail: true }),
            Arc::new(CountingSink { name: "ok".into(), count: count_b.clone(), fail: false }),
        ];
        let dispatcher = AlertDispatcher::new(sinks, 4);
        dispatcher.dispatch_and_wait(sample_event()).await;
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }
}
