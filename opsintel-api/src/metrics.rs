use opsintel_anomaly::AlertSummary;
use opsintel_core::{OpsError, Result};
use prometheus::{Encoder, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};

/// Prometheus counters for detection runs served by the API.
pub struct ApiMetrics {
    registry: Registry,
    detection_runs: IntCounter,
    alerts: IntGaugeVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("opsintel".to_string()), None)
            .map_err(metrics_error)?;

        let detection_runs = IntCounter::new(
            "detection_runs_total",
            "Number of anomaly detection runs",
        )
        .map_err(metrics_error)?;
        let alerts = IntGaugeVec::new(
            Opts::new("alerts", "Checks in the latest run by outcome"),
            &["severity"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(detection_runs.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(alerts.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            detection_runs,
            alerts,
        })
    }

    pub fn record_run(&self, summary: &AlertSummary) {
        self.detection_runs.inc();
        for (label, count) in [
            ("critical", summary.critical),
            ("warning", summary.warning),
            ("normal", summary.normal),
            ("unavailable", summary.unavailable),
        ] {
            self.alerts.with_label_values(&[label]).set(count as i64);
        }
    }

    /// Text exposition format.
    pub fn export(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| OpsError::Other(e.to_string()))
    }
}

fn metrics_error(e: prometheus::Error) -> OpsError {
    OpsError::Other(format!("metrics: {}", e))
}
