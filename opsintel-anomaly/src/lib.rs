pub mod builder;
pub mod classifier;
pub mod detector;
pub mod series;
pub mod stats;

#[cfg(test)]
mod testing;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use std::fmt;

pub use builder::{AlertBuilder, Dimension};
pub use classifier::{Classification, Thresholds};
pub use detector::{
    AlertFeed, AlertSummary, AnomalyDetector, CheckFailure, CheckOutcome, DetectionReport,
};
pub use series::{MetricKind, MetricSeries, SeriesProvider};
pub use stats::{rolling_stats, RollingStat};

/// Severity tier derived from the magnitude of a Z-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    /// Display rank: critical first.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Warning => 1,
            Severity::Normal => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Critical => "[!!!]",
            Severity::Warning => "[!]",
            Severity::Normal => "[OK]",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Severity::Critical => "red",
            Severity::Warning => "orange",
            Severity::Normal => "green",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one metric on one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub metric: MetricKind,
    pub dimension: String,
    pub current_value: f64,
    pub expected_value: f64,
    pub z_score: f64,
    pub severity: Severity,
    pub change_pct: f64,
    pub message: String,
}

/// Display-ready alert record. Consumers never recompute severity or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayAlert {
    pub metric: MetricKind,
    pub dimension: String,
    pub severity: Severity,
    pub change_pct: f64,
    pub z_score: f64,
    pub message: String,
    pub icon: String,
    pub color: String,
}

impl From<&Alert> for DisplayAlert {
    fn from(alert: &Alert) -> Self {
        Self {
            metric: alert.metric,
            dimension: alert.dimension.clone(),
            severity: alert.severity,
            change_pct: alert.change_pct,
            z_score: alert.z_score,
            message: alert.message.clone(),
            icon: alert.severity.icon().to_string(),
            color: alert.severity.color().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub day: NaiveDate,
    pub value: f64,
}

/// Bounded trailing window of observations.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    data: VecDeque<f64>,
    max_size: usize,
}

impl RollingWindow {
    /// A zero size is treated as one.
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            data: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.data.len() >= self.max_size {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    /// NaN when empty.
    pub fn mean(&self) -> f64 {
        self.data.iter().mean()
    }

    /// Sample (n - 1) standard deviation; NaN with fewer than two values.
    ///
    /// Squared deviations are taken about the window mean, so a window of
    /// identical values yields exactly zero.
    pub fn std_dev(&self) -> f64 {
        let n = self.data.len();
        if n < 2 {
            return f64::NAN;
        }
        let mean = self.mean();
        let sum_sq: f64 = self.data.iter().map(|x| (x - mean).powi(2)).sum();
        (sum_sq / (n - 1) as f64).sqrt()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
