// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::utils::CircuitState;

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the storefront core
// ============================================================================
//
// - Checkout sessions and rejections
// - Payment event outcomes and settlement latency
// - Oversell incidents (edition sold out between checkout and payment)
// - Webhook rejections
// - Retry attempts and circuit breaker state
//
// All metrics are registered with one Registry and scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Checkout
    pub checkout_sessions_created: IntCounter,
    pub checkout_rejections: IntCounterVec,

    // Payment events
    pub payment_events: IntCounterVec,
    pub payment_processing_duration: HistogramVec,
    pub oversell_incidents: IntCounterVec,
    pub webhook_rejections: IntCounterVec,

    // Resilience
    pub retry_attempts_total: IntCounterVec,
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Checkout
        let checkout_sessions_created = IntCounter::new(
            "checkout_sessions_created_total",
            "Payment sessions created after a cart validated",
        )?;
        registry.register(Box::new(checkout_sessions_created.clone()))?;

        let checkout_rejections = IntCounterVec::new(
            Opts::new("checkout_rejections_total", "Checkout requests rejected before a session was created"),
            &["reason"],
        )?;
        registry.register(Box::new(checkout_rejections.clone()))?;

        // Payment events
        let payment_events = IntCounterVec::new(
            Opts::new("payment_events_total", "Payment confirmations processed"),
            &["outcome"],
        )?;
        registry.register(Box::new(payment_events.clone()))?;

        let payment_processing_duration = HistogramVec::new(
            HistogramOpts::new("payment_processing_duration_seconds", "Payment confirmation settlement duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(payment_processing_duration.clone()))?;

        let oversell_incidents = IntCounterVec::new(
            Opts::new("oversell_incidents_total", "Paid lines that could not be fulfilled"),
            &["policy"],
        )?;
        registry.register(Box::new(oversell_incidents.clone()))?;

        let webhook_rejections = IntCounterVec::new(
            Opts::new("webhook_rejections_total", "Webhook deliveries rejected or not processable"),
            &["reason"],
        )?;
        registry.register(Box::new(webhook_rejections.clone()))?;

        // Resilience
        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Payment provider circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            checkout_sessions_created,
            checkout_rejections,
            payment_events,
            payment_processing_duration,
            oversell_incidents,
            webhook_rejections,
            retry_attempts_total,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_checkout_rejection(&self, reason: &str) {
        self.checkout_rejections.with_label_values(&[reason]).inc();
    }

    /// Helper to record one processed payment confirmation
    pub fn record_payment_event(&self, outcome: &str, duration_secs: f64) {
        self.payment_events.with_label_values(&[outcome]).inc();
        self.payment_processing_duration
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    pub fn record_oversell(&self, policy: &str, lines: usize) {
        self.oversell_incidents
            .with_label_values(&[policy])
            .inc_by(lines as u64);
    }

    pub fn record_webhook_rejection(&self, reason: &str) {
        self.webhook_rejections.with_label_values(&[reason]).inc();
    }

    /// Helper to record retry attempt
    pub fn record_retry_attempt(&self, operation: &str) {
        self.retry_attempts_total.with_label_values(&[operation]).inc();
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.circuit_breaker_state.set(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.checkout_sessions_created.inc();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_payment_event() {
        let metrics = Metrics::new().unwrap();
        metrics.record_payment_event("fulfilled", 0.02);
        metrics.record_payment_event("fulfilled", 0.03);
        metrics.record_payment_event("duplicate", 0.001);

        let gathered = metrics.registry.gather();
        let events = gathered.iter().find(|m| m.name() == "payment_events_total").unwrap();
        assert_eq!(events.metric.len(), 2);
    }

    #[test]
    fn test_record_oversell_counts_lines() {
        let metrics = Metrics::new().unwrap();
        metrics.record_oversell("cancel", 2);

        let gathered = metrics.registry.gather();
        let oversell = gathered.iter().find(|m| m.name() == "oversell_incidents_total").unwrap();
        assert_eq!(oversell.metric[0].counter.value, Some(2.0));
    }

    #[test]
    fn test_circuit_breaker_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state(CircuitState::Open);

        let gathered = metrics.registry.gather();
        let state = gathered.iter().find(|m| m.name() == "circuit_breaker_state").unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
    }
}
