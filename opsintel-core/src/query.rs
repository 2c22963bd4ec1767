//! Query contract between the analytics core and whatever store holds the
//! transaction table.

use crate::{OpsError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Columns of the daily-aggregated transactions table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Day,
    Entity,
    Product,
    PriceTier,
    AnticipationMethod,
    PaymentMethod,
    Installments,
    AmountTransacted,
    QuantityTransactions,
    QuantityOfMerchants,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::Day,
        Column::Entity,
        Column::Product,
        Column::PriceTier,
        Column::AnticipationMethod,
        Column::PaymentMethod,
        Column::Installments,
        Column::AmountTransacted,
        Column::QuantityTransactions,
        Column::QuantityOfMerchants,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::Day => "day",
            Column::Entity => "entity",
            Column::Product => "product",
            Column::PriceTier => "price_tier",
            Column::AnticipationMethod => "anticipation_method",
            Column::PaymentMethod => "payment_method",
            Column::Installments => "installments",
            Column::AmountTransacted => "amount_transacted",
            Column::QuantityTransactions => "quantity_transactions",
            Column::QuantityOfMerchants => "quantity_of_merchants",
        }
    }

    /// Columns that can be summed per day.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Column::AmountTransacted | Column::QuantityTransactions | Column::QuantityOfMerchants
        )
    }

    /// Columns usable as a slicing dimension.
    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            Column::Entity
                | Column::Product
                | Column::PriceTier
                | Column::AnticipationMethod
                | Column::PaymentMethod
        )
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self> {
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| OpsError::Configuration(format!("Unknown column '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: Column,
    pub value: String,
}

impl Filter {
    pub fn new(column: Column, value: impl Into<String>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }
}

/// The two query shapes the anomaly core needs from a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryDescriptor {
    /// `day` plus the sum of `column` per day, optionally filtered to one
    /// category value, ascending by day. Result columns: `day`, `value`.
    DailySum {
        column: Column,
        filter: Option<Filter>,
    },
    /// Distinct non-null values of a categorical column. Result column: `value`.
    Distinct { column: Column },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Rectangular result of a query: named columns, positional rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| OpsError::DataAccess(format!("Result set has no column '{}'", name)))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
pub trait TabularStore: Send + Sync {
    async fn execute(&self, query: &QueryDescriptor) -> Result<ResultSet>;
}
