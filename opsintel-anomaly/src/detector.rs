use crate::builder::{AlertBuilder, Dimension};
use crate::classifier::Thresholds;
use crate::series::{MetricKind, SeriesProvider};
use crate::{Alert, DisplayAlert, Severity};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use opsintel_core::query::{Column, TabularStore};
use opsintel_core::{DetectorConfig, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Dimension reported when the category list itself could not be read.
pub const ALL_CATEGORIES: &str = "*";

/// A check that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub metric: MetricKind,
    pub dimension: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Evaluated(Alert),
    Unavailable(CheckFailure),
}

impl CheckOutcome {
    fn from_result(metric: MetricKind, dimension: &str, result: Result<Alert>) -> Self {
        match result {
            Ok(alert) => {
                debug!(
                    metric = %alert.metric,
                    dimension = %alert.dimension,
                    severity = %alert.severity,
                    z_score = alert.z_score,
                    "Check evaluated"
                );
                CheckOutcome::Evaluated(alert)
            }
            Err(e) => {
                warn!(metric = %metric, dimension, error = %e, "Check unavailable");
                CheckOutcome::Unavailable(CheckFailure {
                    metric,
                    dimension: dimension.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn alert(&self) -> Option<&Alert> {
        match self {
            CheckOutcome::Evaluated(alert) => Some(alert),
            CheckOutcome::Unavailable(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&CheckFailure> {
        match self {
            CheckOutcome::Evaluated(_) => None,
            CheckOutcome::Unavailable(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSummary {
    /// Evaluated checks only.
    pub total_alerts: usize,
    pub critical: usize,
    pub warning: usize,
    pub normal: usize,
    pub unavailable: usize,
}

impl AlertSummary {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a CheckOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome {
                CheckOutcome::Evaluated(alert) => {
                    summary.total_alerts += 1;
                    match alert.severity {
                        Severity::Critical => summary.critical += 1,
                        Severity::Warning => summary.warning += 1,
                        Severity::Normal => summary.normal += 1,
                    }
                }
                CheckOutcome::Unavailable(_) => summary.unavailable += 1,
            }
        }
        summary
    }
}

/// Everything one orchestration run produced, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub generated_at: DateTime<Utc>,
    pub total_tpv: CheckOutcome,
    pub transactions: CheckOutcome,
    pub by_product: Vec<CheckOutcome>,
    pub summary: AlertSummary,
}

impl DetectionReport {
    fn new(
        total_tpv: CheckOutcome,
        transactions: CheckOutcome,
        by_product: Vec<CheckOutcome>,
    ) -> Self {
        let summary = AlertSummary::from_outcomes(
            [&total_tpv, &transactions]
                .into_iter()
                .chain(by_product.iter()),
        );
        Self {
            generated_at: Utc::now(),
            total_tpv,
            transactions,
            by_product,
            summary,
        }
    }

    /// Total TPV, total transactions, then categories in discovery order.
    pub fn outcomes(&self) -> impl Iterator<Item = &CheckOutcome> {
        [&self.total_tpv, &self.transactions]
            .into_iter()
            .chain(self.by_product.iter())
    }

    pub fn alerts(&self) -> Vec<&Alert> {
        self.outcomes().filter_map(CheckOutcome::alert).collect()
    }

    pub fn failures(&self) -> Vec<&CheckFailure> {
        self.outcomes().filter_map(CheckOutcome::failure).collect()
    }

    /// Evaluated alerts ranked critical first; equal ranks keep evaluation order.
    pub fn display_alerts(&self) -> Vec<DisplayAlert> {
        let mut alerts: Vec<DisplayAlert> =
            self.alerts().into_iter().map(DisplayAlert::from).collect();
        sort_for_display(&mut alerts);
        alerts
    }

    pub fn feed(&self) -> AlertFeed {
        AlertFeed {
            alerts: self.display_alerts(),
            unavailable: self.failures().into_iter().cloned().collect(),
        }
    }
}

/// Display records plus the checks that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertFeed {
    pub alerts: Vec<DisplayAlert>,
    pub unavailable: Vec<CheckFailure>,
}

pub fn sort_for_display(alerts: &mut [DisplayAlert]) {
    alerts.sort_by_key(|a| a.severity.rank());
}

/// Runs the fixed set of checks against a tabular store.
pub struct AnomalyDetector {
    provider: SeriesProvider,
    builder: AlertBuilder,
    category: Column,
    parallel: bool,
}

impl AnomalyDetector {
    /// Fails fast on an invalid detector configuration.
    pub fn new(store: Arc<dyn TabularStore>, config: &DetectorConfig) -> Result<Self> {
        config.validate()?;
        let thresholds = Thresholds::from_config(config)?;

        info!(
            window = config.window,
            warning = thresholds.warning(),
            critical = thresholds.critical(),
            category = %config.category_column,
            parallel = config.parallel,
            "Anomaly detector initialized"
        );

        Ok(Self {
            provider: SeriesProvider::new(store),
            builder: AlertBuilder::new(thresholds, config.window),
            category: config.category()?,
            parallel: config.parallel,
        })
    }

    pub fn builder(&self) -> &AlertBuilder {
        &self.builder
    }

    pub fn category_column(&self) -> Column {
        self.category
    }

    pub async fn check_total_tpv(&self) -> Result<Alert> {
        self.builder
            .build_alert(&self.provider, MetricKind::Tpv, &Dimension::Total)
            .await
    }

    pub async fn check_transactions(&self) -> Result<Alert> {
        self.builder
            .build_alert(&self.provider, MetricKind::Transactions, &Dimension::Total)
            .await
    }

    /// One TPV outcome per category value present in the store. A failure
    /// to list the categories becomes a single unavailable outcome.
    pub async fn check_tpv_by_category(&self) -> Vec<CheckOutcome> {
        let categories = match self.provider.list_categories(self.category).await {
            Ok(categories) => categories,
            Err(e) => {
                return vec![CheckOutcome::from_result(
                    MetricKind::Tpv,
                    ALL_CATEGORIES,
                    Err(e),
                )]
            }
        };

        let dimensions: Vec<Dimension> = categories
            .into_iter()
            .map(|value| Dimension::category(self.category, value))
            .collect();

        if self.parallel {
            join_all(dimensions.iter().map(|d| self.check_dimension(d))).await
        } else {
            let mut outcomes = Vec::with_capacity(dimensions.len());
            for dimension in &dimensions {
                outcomes.push(self.check_dimension(dimension).await);
            }
            outcomes
        }
    }

    async fn check_dimension(&self, dimension: &Dimension) -> CheckOutcome {
        let result = self
            .builder
            .build_alert(&self.provider, MetricKind::Tpv, dimension)
            .await;
        CheckOutcome::from_result(MetricKind::Tpv, dimension.label(), result)
    }

    pub async fn run_all_checks(&self) -> DetectionReport {
        let (total_tpv, transactions, by_product) = if self.parallel {
            futures::join!(
                self.check_total_tpv(),
                self.check_transactions(),
                self.check_tpv_by_category()
            )
        } else {
            let total_tpv = self.check_total_tpv().await;
            let transactions = self.check_transactions().await;
            (total_tpv, transactions, self.check_tpv_by_category().await)
        };

        let report = DetectionReport::new(
            CheckOutcome::from_result(MetricKind::Tpv, "total", total_tpv),
            CheckOutcome::from_result(MetricKind::Transactions, "total", transactions),
            by_product,
        );

        let summary = &report.summary;
        info!(
            total = summary.total_alerts,
            critical = summary.critical,
            warning = summary.warning,
            normal = summary.normal,
            unavailable = summary.unavailable,
            "Anomaly checks completed"
        );
        report
    }

    pub async fn alerts_for_display(&self) -> Vec<DisplayAlert> {
        self.run_all_checks().await.display_alerts()
    }

    pub async fn alert_feed(&self) -> AlertFeed {
        self.run_all_checks().await.feed()
    }
}

impl std::fmt::Debug for AnomalyDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyDetector")
            .field("builder", &self.builder)
            .field("category", &self.category)
            .field("parallel", &self.parallel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use opsintel_core::OpsError;

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    fn noisy_then(last: f64) -> Vec<f64> {
        let mut values: Vec<f64> = (0..20)
            .map(|i| if i % 2 == 0 { 99.0 } else { 101.0 })
            .collect();
        values.push(last);
        values
    }

    fn detector(store: MemoryStore, config: &DetectorConfig) -> AnomalyDetector {
        AnomalyDetector::new(Arc::new(store), config).unwrap()
    }

    #[tokio::test]
    async fn test_one_alert_per_discovered_category() {
        let store = MemoryStore::new()
            .with_values("A", &[10.0, 11.0, 10.0])
            .with_values("B", &[5.0, 5.0, 5.0])
            .with_values("C", &[1.0, 2.0, 1.0]);
        let report = detector(store, &config()).run_all_checks().await;

        let dims: Vec<&str> = report
            .by_product
            .iter()
            .filter_map(CheckOutcome::alert)
            .map(|a| a.dimension.as_str())
            .collect();
        assert_eq!(dims, vec!["A", "B", "C"]);
        assert_eq!(report.summary.total_alerts, 5);
        assert_eq!(report.summary.unavailable, 0);

        let total = report.total_tpv.alert().unwrap();
        assert_eq!(total.dimension, "total");
        assert_eq!(total.current_value, 11.0);
    }

    #[tokio::test]
    async fn test_display_sorted_by_severity_rank() {
        let store = MemoryStore::new()
            .with_values("calm", &noisy_then(100.0))
            .with_values("spike", &noisy_then(400.0))
            .with_values("dip", &noisy_then(97.5));
        let detector = detector(store, &config());

        let alerts = detector.alerts_for_display().await;
        assert_eq!(alerts.len(), 5);
        for pair in alerts.windows(2) {
            assert!(pair[0].severity.rank() <= pair[1].severity.rank());
        }
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts.last().unwrap().severity, Severity::Normal);

        let spike = alerts.iter().find(|a| a.dimension == "spike").unwrap();
        assert_eq!(spike.icon, "[!!!]");
        assert_eq!(spike.color, "red");
    }

    #[tokio::test]
    async fn test_equal_severity_keeps_evaluation_order() {
        let store = MemoryStore::new()
            .with_values("b", &[1.0, 1.0])
            .with_values("a", &[1.0, 1.0]);
        let alerts = detector(store, &config()).alerts_for_display().await;

        let order: Vec<(MetricKind, &str)> = alerts
            .iter()
            .map(|a| (a.metric, a.dimension.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (MetricKind::Tpv, "total"),
                (MetricKind::Transactions, "total"),
                (MetricKind::Tpv, "a"),
                (MetricKind::Tpv, "b"),
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let store = MemoryStore::new()
            .with_values("pix", &noisy_then(300.0))
            .with_values("pos", &[4.0, 8.0, 6.0]);
        let detector = detector(store, &config());

        let first = detector.run_all_checks().await;
        let second = detector.run_all_checks().await;
        assert_eq!(first.alerts(), second.alerts());
        assert_eq!(first.summary, second.summary);
        assert_eq!(first.display_alerts(), second.display_alerts());
    }

    #[tokio::test]
    async fn test_failed_category_is_isolated() {
        let store = MemoryStore::new()
            .with_values("pix", &[10.0, 12.0])
            .with_values("pos", &[3.0, 4.0])
            .failing_for("pix");
        let report = detector(store, &config()).run_all_checks().await;

        assert!(report.total_tpv.alert().is_some());
        assert!(report.transactions.alert().is_some());
        assert_eq!(report.by_product.len(), 2);

        let failure = report.by_product[0].failure().unwrap();
        assert_eq!(failure.dimension, "pix");
        assert_eq!(failure.metric, MetricKind::Tpv);
        assert_eq!(report.by_product[1].alert().unwrap().dimension, "pos");

        assert_eq!(report.summary.total_alerts, 3);
        assert_eq!(report.summary.unavailable, 1);

        let feed = report.feed();
        assert_eq!(feed.alerts.len(), 3);
        assert_eq!(feed.unavailable, vec![failure.clone()]);
    }

    #[tokio::test]
    async fn test_failed_total_check_is_isolated() {
        let store = MemoryStore::new()
            .with_values("pix", &[10.0, 12.0])
            .failing_column(Column::QuantityTransactions);
        let report = detector(store, &config()).run_all_checks().await;

        assert!(report.total_tpv.alert().is_some());
        let failure = report.transactions.failure().unwrap();
        assert_eq!(failure.metric, MetricKind::Transactions);
        assert_eq!(failure.dimension, "total");
        assert_eq!(report.by_product.len(), 1);
    }

    #[tokio::test]
    async fn test_category_discovery_failure() {
        let store = MemoryStore::new()
            .with_values("pix", &[10.0, 12.0])
            .failing_distinct();
        let report = detector(store, &config()).run_all_checks().await;

        assert_eq!(report.by_product.len(), 1);
        assert_eq!(report.by_product[0].failure().unwrap().dimension, ALL_CATEGORIES);
        assert_eq!(report.summary.total_alerts, 2);
        assert_eq!(report.summary.unavailable, 1);
    }

    #[tokio::test]
    async fn test_empty_store_marks_totals_unavailable() {
        let report = detector(MemoryStore::new(), &config()).run_all_checks().await;
        assert!(report.total_tpv.failure().is_some());
        assert!(report.transactions.failure().is_some());
        assert!(report.by_product.is_empty());
        assert_eq!(report.summary.total_alerts, 0);
        assert_eq!(report.summary.unavailable, 2);
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut cfg = config();
        cfg.warning_threshold = 4.0;
        cfg.critical_threshold = 3.0;

        let store = Arc::new(MemoryStore::new());
        let err = AnomalyDetector::new(store.clone(), &cfg).unwrap_err();
        assert!(matches!(err, OpsError::Configuration(_)));
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let build = || {
            MemoryStore::new()
                .with_values("x", &noisy_then(95.0))
                .with_values("y", &noisy_then(400.0))
                .with_values("z", &noisy_then(100.0))
                .failing_for("z")
        };

        let sequential = detector(build(), &config()).run_all_checks().await;
        let mut cfg = config();
        cfg.parallel = true;
        let parallel = detector(build(), &cfg).run_all_checks().await;

        assert_eq!(sequential.by_product, parallel.by_product);
        assert_eq!(sequential.summary, parallel.summary);
        assert_eq!(sequential.display_alerts(), parallel.display_alerts());
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = CheckOutcome::Unavailable(CheckFailure {
            metric: MetricKind::Tpv,
            dimension: "pix".into(),
            reason: "store unavailable".into(),
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["dimension"], "pix");
    }
}
