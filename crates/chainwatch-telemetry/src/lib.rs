//! Ambient logging and alerting: structured log init, a policy-decision
//! observer, and a bounded webhook-fan-out dispatcher.
//!
//! Chainwatch's non-goals (spec §1) scope out webhook *formatting and
//! delivery* as an external collaborator's job, but the core still needs to
//! emit the event that collaborator delivers (spec §6 `AlertEvent`), and every
//! crate in this workspace still logs the way the teacher's `telemetry` crate
//! taught it to: JSON structured logs via `tracing-subscriber`, with an
//! optional OTel metrics path kept behind the same `otel` feature flag.

#![deny(unsafe_code)]

mod alert;
mod observer;

pub use alert::{AlertDispatcher, AlertEvent, AlertSink, SendError};
pub use observer::{LoggingPolicyObserver, PolicyObserver};

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("otel setup failed: {0}")]
    Otel(String),
}

/// Initialize JSON-formatted structured logging with an env filter.
///
/// Set `RUST_LOG`, e.g. `"info,chainwatch_policy=debug"`. Idempotent in
/// practice: a second call is a silent no-op because the global subscriber
/// can only be installed once per process.
pub fn init_json_logging() {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(feature = "otel")]
pub mod metrics {
    //! OTel metrics for policy decision counts (behind the `otel` feature,
    //! off by default — same posture as the teacher's telemetry crate).
    use once_cell::sync::OnceCell;
    use opentelemetry::global;
    use opentelemetry::metrics::{Counter, Meter};

    use super::TelemetryError;

    static INIT: OnceCell<()> = OnceCell::new();

    fn detect_service_name() -> String {
        std::env::var("OTEL_SERVICE_NAME")
            .or_else(|_| std::env::var("CHAINWATCH_SERVICE_NAME"))
            .unwrap_or_else(|_| "chainwatch".to_string())
    }

    fn init_from_env() -> Result<(), TelemetryError> {
        let _svc = detect_service_name();
        let provider = opentelemetry_otlp::new_pipeline()
            .metrics(opentelemetry_sdk::runtime::Tokio)
            .with_exporter(opentelemetry_otlp::new_exporter().http())
            .build()
            .map_err(|e| TelemetryError::Otel(e.to_string()))?;
        global::set_meter_provider(provider);
        Ok(())
    }

    fn ensure_provider() {
        let _ = INIT.get_or_init(|| {
            let _ = init_from_env();
        });
    }

    /// A counter of policy decisions, labeled by decision kind and tier.
    #[derive(Clone)]
    pub struct DecisionCounter {
        counter: Counter<u64>,
    }

    impl DecisionCounter {
        pub fn init() -> Self {
            ensure_provider();
            let meter: Meter = global::meter("chainwatch.policy");
            let counter = meter
                .u64_counter("chainwatch.policy.decision.count")
                .with_description("Policy decisions emitted by the evaluator")
                .init();
            Self { counter }
        }

        pub fn record(&self, decision: &str, tier: u8) {
            use opentelemetry::KeyValue;
            self.counter.add(
                1,
                &[KeyValue::new("decision", decision.to_string()), KeyValue::new("tier", i64::from(tier))],
            );
        }
    }
}
