use crate::metrics::ApiMetrics;
use opsintel_anomaly::{AnomalyDetector, DetectionReport};
use opsintel_core::storage::StorageManager;
use opsintel_core::{DetectorConfig, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageManager>,
    pub detector: Arc<AnomalyDetector>,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    pub fn new(storage: Arc<StorageManager>, config: &DetectorConfig) -> Result<Self> {
        let detector = AnomalyDetector::new(storage.clone(), config)?;
        Ok(Self {
            storage,
            detector: Arc::new(detector),
            metrics: Arc::new(ApiMetrics::new()?),
        })
    }

    /// Fresh detection run, recorded in the metrics.
    pub async fn run_checks(&self) -> DetectionReport {
        let report = self.detector.run_all_checks().await;
        self.metrics.record_run(&report.summary);
        report
    }
}
