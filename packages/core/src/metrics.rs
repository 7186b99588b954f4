//! Prometheus metrics registry for the postpartum care service.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and hand it to the
//! care service and HTTP middleware.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Observations durably recorded.
    pub observations_recorded_total: Counter,
    /// Care plans opened by the resolver.
    pub care_plans_opened_total: Counter,
    /// Phase transitions, labelled by source and target phase.
    pub phase_transitions_total: CounterVec,
    /// Alerts raised by the evaluator, labelled by type and severity.
    pub alerts_raised_total: CounterVec,
    /// Urgent alert notifications the notifier rejected or failed to send.
    pub alert_notifications_failed_total: Counter,
    /// HTTP request count, labelled by method, path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    pub registry: Registry,
}

impl AppMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let observations_recorded_total = Counter::with_opts(Opts::new(
            "postpartum_care_observations_recorded_total",
            "Observations recorded",
        ))?;

        let care_plans_opened_total = Counter::with_opts(Opts::new(
            "postpartum_care_care_plans_opened_total",
            "Care plans opened",
        ))?;

        let phase_transitions_total = CounterVec::new(
            Opts::new(
                "postpartum_care_phase_transitions_total",
                "Schedule phase transitions by source and target phase",
            ),
            &["from", "to"],
        )?;

        let alerts_raised_total = CounterVec::new(
            Opts::new(
                "postpartum_care_alerts_raised_total",
                "Clinical alerts raised by type and severity",
            ),
            &["alert_type", "severity"],
        )?;

        let alert_notifications_failed_total = Counter::with_opts(Opts::new(
            "postpartum_care_alert_notifications_failed_total",
            "Urgent alert notifications that were not delivered",
        ))?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "postpartum_care_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "postpartum_care_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(observations_recorded_total.clone()))?;
        registry.register(Box::new(care_plans_opened_total.clone()))?;
        registry.register(Box::new(phase_transitions_total.clone()))?;
        registry.register(Box::new(alerts_raised_total.clone()))?;
        registry.register(Box::new(alert_notifications_failed_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            observations_recorded_total,
            care_plans_opened_total,
            phase_transitions_total,
            alerts_raised_total,
            alert_notifications_failed_total,
            http_requests_total,
            http_request_duration,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
