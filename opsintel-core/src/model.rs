use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{OpsError, Result};

/// One row of the daily-aggregated operations CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub day: String,
    pub entity: Option<String>,
    pub product: Option<String>,
    pub price_tier: Option<String>,
    pub anticipation_method: Option<String>,
    pub payment_method: Option<String>,
    pub installments: Option<i64>,
    pub amount_transacted: f64,
    pub quantity_transactions: i64,
    pub quantity_of_merchants: i64,
}

/// Parse a calendar day as stored in the table or the source CSV.
///
/// Accepts `YYYY-MM-DD` as well as a trailing time component
/// (`YYYY-MM-DD HH:MM:SS` or ISO `T` separator), which is dropped.
pub fn parse_day(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(day);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts.date());
        }
    }
    Err(OpsError::DataAccess(format!("Malformed day value '{}'", raw)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub day: NaiveDate,
    pub tpv: f64,
    pub transactions: f64,
    pub merchants: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductBreakdown {
    pub product: String,
    pub tpv: f64,
    pub transactions: f64,
    pub avg_ticket: f64,
}

impl ProductBreakdown {
    pub fn new(product: String, tpv: f64, transactions: f64) -> Self {
        let avg_ticket = if transactions > 0.0 {
            (tpv / transactions * 100.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            product,
            tpv,
            transactions,
            avg_ticket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub label: String,
    pub base_tpv: f64,
    pub variation_pct: f64,
}

/// TPV of the latest day against D-1, D-7 and D-30.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpvComparison {
    pub day: NaiveDate,
    pub tpv: f64,
    pub comparisons: Vec<PeriodComparison>,
}

impl TpvComparison {
    pub const OFFSETS: [(&'static str, i64); 3] = [("D-1", 1), ("D-7", 7), ("D-30", 30)];

    /// A missing comparison day falls back to the latest day's TPV, so its
    /// variation reads as zero rather than as a phantom drop.
    pub fn from_daily(daily: &[DailyMetrics]) -> Option<Self> {
        let by_day: BTreeMap<NaiveDate, f64> = daily.iter().map(|d| (d.day, d.tpv)).collect();
        let (&day, &tpv) = by_day.iter().next_back()?;

        let comparisons = Self::OFFSETS
            .iter()
            .map(|(label, offset)| {
                let base_tpv = by_day
                    .get(&(day - Duration::days(*offset)))
                    .copied()
                    .unwrap_or(tpv);
                let variation_pct = if base_tpv != 0.0 {
                    (tpv - base_tpv) / base_tpv * 100.0
                } else {
                    0.0
                };
                PeriodComparison {
                    label: label.to_string(),
                    base_tpv,
                    variation_pct,
                }
            })
            .collect();

        Some(Self {
            day,
            tpv,
            comparisons,
        })
    }
}
