//! In-memory `TabularStore` for unit tests.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use opsintel_core::query::{Column, QueryDescriptor, ResultSet, TabularStore, Value};
use opsintel_core::{OpsError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct Row {
    day: NaiveDate,
    product: String,
    amount: f64,
    quantity: f64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Vec<Row>,
    failing_products: Vec<String>,
    failing_columns: Vec<Column>,
    failing_distinct: bool,
    queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    /// One row per value on consecutive days from `start_day`, with the
    /// same figure used for amount and transaction count.
    pub fn with_values(self, product: &str, values: &[f64]) -> Self {
        let points: Vec<(f64, f64)> = values.iter().map(|&v| (v, v)).collect();
        self.with_points(product, &points)
    }

    /// `(amount, quantity)` per consecutive day.
    pub fn with_points(mut self, product: &str, points: &[(f64, f64)]) -> Self {
        for (offset, &(amount, quantity)) in points.iter().enumerate() {
            self.rows.push(Row {
                day: Self::start_day() + Duration::days(offset as i64),
                product: product.to_string(),
                amount,
                quantity,
            });
        }
        self
    }

    pub fn failing_for(mut self, product: &str) -> Self {
        self.failing_products.push(product.to_string());
        self
    }

    pub fn failing_column(mut self, column: Column) -> Self {
        self.failing_columns.push(column);
        self
    }

    pub fn failing_distinct(mut self) -> Self {
        self.failing_distinct = true;
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn execute(&self, query: &QueryDescriptor) -> Result<ResultSet> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        match query {
            QueryDescriptor::DailySum { column, filter } => {
                if let Some(filter) = filter {
                    if self.failing_products.contains(&filter.value) {
                        return Err(OpsError::DataAccess(format!(
                            "store unavailable for {}",
                            filter.value
                        )));
                    }
                } else if self.failing_columns.contains(column) {
                    return Err(OpsError::DataAccess(format!("store unavailable for {}", column)));
                }

                let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
                for row in &self.rows {
                    if let Some(filter) = filter {
                        if row.product != filter.value {
                            continue;
                        }
                    }
                    let value = match column {
                        Column::AmountTransacted => row.amount,
                        _ => row.quantity,
                    };
                    *by_day.entry(row.day).or_insert(0.0) += value;
                }

                let mut set = ResultSet::new(vec!["day".into(), "value".into()]);
                for (day, value) in by_day {
                    set.rows.push(vec![
                        Value::Text(day.format("%Y-%m-%d").to_string()),
                        Value::Real(value),
                    ]);
                }
                Ok(set)
            }
            QueryDescriptor::Distinct { .. } => {
                if self.failing_distinct {
                    return Err(OpsError::DataAccess("distinct unavailable".into()));
                }
                let products: BTreeSet<&str> =
                    self.rows.iter().map(|r| r.product.as_str()).collect();
                let mut set = ResultSet::new(vec!["value".into()]);
                for product in products {
                    set.rows.push(vec![Value::Text(product.to_string())]);
                }
                Ok(set)
            }
        }
    }
}
