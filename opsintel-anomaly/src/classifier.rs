use crate::Severity;
use opsintel_core::{validate_thresholds, DetectorConfig, Result};
use serde::{Deserialize, Serialize};

/// Z-score magnitudes at which a deviation becomes a warning or critical.
///
/// Only constructed through [`Thresholds::new`], so `warning <= critical`
/// always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    warning: f64,
    critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: 2.0,
            critical: 3.0,
        }
    }
}

impl Thresholds {
    pub fn new(warning: f64, critical: f64) -> Result<Self> {
        validate_thresholds(warning, critical)?;
        Ok(Self { warning, critical })
    }

    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        Self::new(config.warning_threshold, config.critical_threshold)
    }

    pub fn warning(&self) -> f64 {
        self.warning
    }

    pub fn critical(&self) -> f64 {
        self.critical
    }

    pub fn severity(&self, z_score: f64) -> Severity {
        let abs_z = z_score.abs();
        if abs_z >= self.critical {
            Severity::Critical
        } else if abs_z >= self.warning {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    pub fn classify(&self, current: f64, expected: f64, std: f64) -> Classification {
        let z_score = z_score(current, expected, std);
        Classification {
            z_score,
            change_pct: change_pct(current, expected),
            severity: self.severity(z_score),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub z_score: f64,
    pub change_pct: f64,
    pub severity: Severity,
}

/// Zero when `std` is zero or undefined.
pub fn z_score(current: f64, expected: f64, std: f64) -> f64 {
    if std == 0.0 || std.is_nan() {
        return 0.0;
    }
    (current - expected) / std
}

/// Zero when `expected` is zero.
pub fn change_pct(current: f64, expected: f64) -> f64 {
    if expected == 0.0 {
        return 0.0;
    }
    (current - expected) / expected * 100.0
}
