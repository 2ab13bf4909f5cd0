//! Prometheus metrics registry for the missed-bolus detector.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it
//! to the poll cycle and the status server.

use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Opts, Registry};

const PREFIX: &str = "missed_bolus_detector";

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Poll cycles started.
    pub polls_total: Counter,
    /// Poll cycles skipped because of a fetch, data, or storage failure.
    pub poll_errors_total: Counter,
    /// Episodes returned by the detector, before dedup.
    pub episodes_detected_total: Counter,
    /// Episode notifications delivered.
    pub alerts_sent_total: Counter,
    /// Episodes held back by the cooldown gate.
    pub alerts_suppressed_total: Counter,
    /// Notification attempts that failed.
    pub delivery_failures_total: Counter,
    /// Failed cycles since the last success.
    pub consecutive_failures: Gauge,
    /// Most recent CGM value seen, in mg/dL.
    pub last_glucose_mgdl: Gauge,
    /// Wall time of one fetch→detect→notify pass.
    pub cycle_duration: Histogram,
    pub registry: Registry,
}

fn counter(name: &str, help: &str) -> Result<Counter, prometheus::Error> {
    Counter::with_opts(Opts::new(format!("{}_{}", PREFIX, name), help))
}

fn gauge(name: &str, help: &str) -> Result<Gauge, prometheus::Error> {
    Gauge::with_opts(Opts::new(format!("{}_{}", PREFIX, name), help))
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let polls_total = counter("polls_total", "Poll cycles started")?;
        let poll_errors_total = counter("poll_errors_total", "Poll cycles that failed")?;
        let episodes_detected_total =
            counter("episodes_detected_total", "Unexplained rises detected")?;
        let alerts_sent_total = counter("alerts_sent_total", "Missed-bolus alerts delivered")?;
        let alerts_suppressed_total =
            counter("alerts_suppressed_total", "Alerts held back by cooldown")?;
        let delivery_failures_total =
            counter("delivery_failures_total", "Failed notification attempts")?;
        let consecutive_failures =
            gauge("consecutive_failures", "Failed poll cycles since the last success")?;
        let last_glucose_mgdl = gauge("last_glucose_mgdl", "Latest CGM reading in mg/dL")?;

        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new(
                format!("{}_cycle_duration_seconds", PREFIX),
                "Poll cycle duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(poll_errors_total.clone()))?;
        registry.register(Box::new(episodes_detected_total.clone()))?;
        registry.register(Box::new(alerts_sent_total.clone()))?;
        registry.register(Box::new(alerts_suppressed_total.clone()))?;
        registry.register(Box::new(delivery_failures_total.clone()))?;
        registry.register(Box::new(consecutive_failures.clone()))?;
        registry.register(Box::new(last_glucose_mgdl.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;

        Ok(Self {
            polls_total,
            poll_errors_total,
            episodes_detected_total,
            alerts_sent_total,
            alerts_suppressed_total,
            delivery_failures_total,
            consecutive_failures,
            last_glucose_mgdl,
            cycle_duration,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_metrics_register_without_error() {
        let metrics = AppMetrics::new();
        assert!(metrics.is_ok(), "AppMetrics::new() failed: {:?}", metrics.err());
    }

    #[test]
    fn render_contains_prefixed_names() {
        let metrics = AppMetrics::new().unwrap();
        metrics.polls_total.inc();
        metrics.alerts_sent_total.inc();
        metrics.cycle_duration.observe(0.2);

        let output = metrics.render().unwrap();

        assert!(output.contains("missed_bolus_detector_polls_total 1"));
        assert!(output.contains("missed_bolus_detector_alerts_sent_total 1"));
        assert!(output.contains("missed_bolus_detector_cycle_duration_seconds"));
    }

    #[test]
    fn gauges_track_latest_value() {
        let metrics = AppMetrics::new().unwrap();
        metrics.consecutive_failures.set(3.0);
        metrics.consecutive_failures.set(0.0);
        metrics.last_glucose_mgdl.set(182.0);

        assert_eq!(metrics.consecutive_failures.get(), 0.0);
        assert!((metrics.last_glucose_mgdl.get() - 182.0).abs() < f64::EPSILON);
    }
}
