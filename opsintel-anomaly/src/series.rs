use crate::SeriesPoint;
use opsintel_core::model::parse_day;
use opsintel_core::query::{Column, Filter, QueryDescriptor, ResultSet, TabularStore};
use opsintel_core::{OpsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Measured quantity, each backed by a summed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Total payment volume: sum of `amount_transacted`.
    Tpv,
    /// Sum of `quantity_transactions`.
    Transactions,
}

impl MetricKind {
    pub fn column(&self) -> Column {
        match self {
            MetricKind::Tpv => Column::AmountTransacted,
            MetricKind::Transactions => Column::QuantityTransactions,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Tpv => "tpv",
            MetricKind::Transactions => "transactions",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daily values for one metric/dimension slice, strictly increasing by day.
/// Days without data are absent, not zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSeries {
    points: Vec<SeriesPoint>,
}

impl MetricSeries {
    /// Sorts by day; repeated days are summed into one point.
    pub fn new(mut points: Vec<SeriesPoint>) -> Self {
        points.sort_by_key(|p| p.day);

        let mut merged: Vec<SeriesPoint> = Vec::with_capacity(points.len());
        for point in points {
            match merged.last_mut() {
                Some(last) if last.day == point.day => last.value += point.value,
                _ => merged.push(point),
            }
        }

        Self { points: merged }
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn from_result_set(set: &ResultSet) -> Result<Self> {
        let day_idx = set.column_index("day")?;
        let value_idx = set.column_index("value")?;

        let points = set
            .rows
            .iter()
            .map(|row| -> Result<SeriesPoint> {
                let day = row
                    .get(day_idx)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| OpsError::DataAccess("Missing day in series row".to_string()))?;
                let value = row.get(value_idx).and_then(|v| v.as_f64()).ok_or_else(|| {
                    OpsError::DataAccess(format!("Missing value for day {}", day))
                })?;
                Ok(SeriesPoint {
                    day: parse_day(day)?,
                    value,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(points))
    }
}

/// Read-only access to metric series and category values in a store.
#[derive(Clone)]
pub struct SeriesProvider {
    store: Arc<dyn TabularStore>,
}

impl SeriesProvider {
    pub fn new(store: Arc<dyn TabularStore>) -> Self {
        Self { store }
    }

    /// Errors from the store are returned unmodified.
    pub async fn get_series(
        &self,
        metric: MetricKind,
        filter: Option<&Filter>,
    ) -> Result<MetricSeries> {
        let query = QueryDescriptor::DailySum {
            column: metric.column(),
            filter: filter.cloned(),
        };
        let set = self.store.execute(&query).await?;
        let series = MetricSeries::from_result_set(&set)?;

        debug!(
            metric = %metric,
            filter = ?filter.map(|f| &f.value),
            points = series.len(),
            "Fetched metric series"
        );
        Ok(series)
    }

    /// Snapshot of the distinct values of a categorical column.
    pub async fn list_categories(&self, column: Column) -> Result<Vec<String>> {
        let set = self
            .store
            .execute(&QueryDescriptor::Distinct { column })
            .await?;
        let idx = set.column_index("value")?;

        set.rows
            .iter()
            .map(|row| {
                row.get(idx)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        OpsError::DataAccess(format!("Non-text value in column '{}'", column))
                    })
            })
            .collect()
    }
}
