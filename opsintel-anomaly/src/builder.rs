use crate::classifier::Thresholds;
use crate::series::{MetricKind, MetricSeries, SeriesProvider};
use crate::stats::rolling_stats;
use crate::Alert;
use opsintel_core::query::{Column, Filter};
use opsintel_core::{OpsError, Result};
use tracing::debug;

/// Slice of the data a metric is evaluated on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dimension {
    Total,
    Category { column: Column, value: String },
}

impl Dimension {
    pub fn category(column: Column, value: impl Into<String>) -> Self {
        Dimension::Category {
            column,
            value: value.into(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Dimension::Total => "total",
            Dimension::Category { value, .. } => value,
        }
    }

    pub fn filter(&self) -> Option<Filter> {
        match self {
            Dimension::Total => None,
            Dimension::Category { column, value } => Some(Filter::new(*column, value.clone())),
        }
    }
}

/// Evaluates one metric on one dimension into an [`Alert`].
#[derive(Debug, Clone)]
pub struct AlertBuilder {
    thresholds: Thresholds,
    window: usize,
}

impl AlertBuilder {
    pub fn new(thresholds: Thresholds, window: usize) -> Self {
        Self { thresholds, window }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub async fn build_alert(
        &self,
        provider: &SeriesProvider,
        metric: MetricKind,
        dimension: &Dimension,
    ) -> Result<Alert> {
        let filter = dimension.filter();
        let series = provider.get_series(metric, filter.as_ref()).await?;
        self.evaluate(metric, dimension.label(), &series)
    }

    /// The expectation for the latest day is the rolling statistic ending
    /// on the day before it. A single-point series has no history: it is
    /// compared with itself and comes out normal.
    pub fn evaluate(
        &self,
        metric: MetricKind,
        dimension: &str,
        series: &MetricSeries,
    ) -> Result<Alert> {
        let values = series.values();
        let current = match values.last() {
            Some(&current) => current,
            None => {
                return Err(OpsError::InsufficientData {
                    metric: metric.to_string(),
                    dimension: dimension.to_string(),
                })
            }
        };

        let stats = rolling_stats(&values, self.window);
        let reference = stats[values.len().saturating_sub(2)];
        let expected = reference.mean;

        let classification = self.thresholds.classify(current, expected, reference.std);
        let message = render_message(
            metric,
            dimension,
            classification.z_score,
            classification.change_pct,
            current,
            expected,
        );

        debug!(
            metric = %metric,
            dimension,
            current,
            expected,
            z_score = classification.z_score,
            severity = %classification.severity,
            "Evaluated alert"
        );

        Ok(Alert {
            metric,
            dimension: dimension.to_string(),
            current_value: current,
            expected_value: expected,
            z_score: classification.z_score,
            severity: classification.severity,
            change_pct: classification.change_pct,
            message,
        })
    }
}

pub fn render_message(
    metric: MetricKind,
    dimension: &str,
    z_score: f64,
    change_pct: f64,
    current: f64,
    expected: f64,
) -> String {
    let direction = if z_score < 0.0 { "dropped" } else { "spiked" };
    let metric_label = metric.as_str().to_uppercase();

    let subject = if dimension == "total" {
        format!("Total {}", metric_label)
    } else {
        format!("{} for {}", metric_label, dimension.to_uppercase())
    };

    format!(
        "{} {} {:.1}% (Z-score: {:.2}). Current: {}, Expected: {}",
        subject,
        direction,
        change_pct.abs(),
        z_score,
        format_currency(current),
        format_currency(expected)
    )
}

/// `R$ 1,234,567.89`
pub fn format_currency(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (integer, fraction) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("R$ {}{}.{}", sign, grouped, fraction)
}
