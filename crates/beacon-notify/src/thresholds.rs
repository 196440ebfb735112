//! Credit-balance alert rules.
//!
//! Two bands below a starting balance: at or under `warning_at` the user gets
//! a warning, at or under `urgent_at` an urgent error as well. A zero or
//! negative balance raises nothing; running out is reported elsewhere.

use serde::{Deserialize, Serialize};

/// When a band fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Fire whenever the current balance is inside a band.
    #[default]
    Level,

    /// Fire only on the decrement that moves the balance from above a
    /// threshold to at-or-below it.
    Crossing,
}

/// An alert raised by [`CreditThresholds::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditAlert {
    /// Balance is low; suggest an upgrade.
    Warning,
    /// Balance is nearly exhausted.
    Urgent,
}

/// Thresholds that turn credit changes into alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditThresholds {
    /// Default: 1248.
    pub warning_at: i64,
    /// Default: 1245.
    pub urgent_at: i64,
    pub mode: ThresholdMode,
}

impl Default for CreditThresholds {
    fn default() -> Self {
        Self {
            warning_at: 1248,
            urgent_at: 1245,
            mode: ThresholdMode::Level,
        }
    }
}

impl CreditThresholds {
    /// Alerts for a balance change from `previous` to `current`, warning
    /// first.
    pub fn evaluate(&self, previous: i64, current: i64) -> Vec<CreditAlert> {
        if current <= 0 {
            return Vec::new();
        }
        let hits = |threshold: i64| match self.mode {
            ThresholdMode::Level => current <= threshold,
            ThresholdMode::Crossing => previous > threshold && current <= threshold,
        };

        let mut alerts = Vec::with_capacity(2);
        if hits(self.warning_at) {
            alerts.push(CreditAlert::Warning);
        }
        if hits(self.urgent_at) {
            alerts.push(CreditAlert::Urgent);
        }
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crossing() -> CreditThresholds {
        CreditThresholds {
            mode: ThresholdMode::Crossing,
            ..CreditThresholds::default()
        }
    }

    #[test]
    fn test_evaluate_first_step_into_warning_band() {
        let alerts = CreditThresholds::default().evaluate(1249, 1248);
        assert_eq!(alerts, vec![CreditAlert::Warning]);
    }

    #[test]
    fn test_evaluate_step_into_urgent_band_raises_both() {
        let alerts = CreditThresholds::default().evaluate(1246, 1245);
        assert_eq!(alerts, vec![CreditAlert::Warning, CreditAlert::Urgent]);
    }

    #[test]
    fn test_evaluate_above_bands_raises_nothing() {
        assert!(CreditThresholds::default().evaluate(2000, 1249).is_empty());
    }

    #[test]
    fn test_evaluate_exhausted_balance_raises_nothing() {
        assert!(CreditThresholds::default().evaluate(1, 0).is_empty());
        assert!(CreditThresholds::default().evaluate(0, -3).is_empty());
    }

    #[test]
    fn test_evaluate_crossing_fires_once_per_threshold() {
        assert_eq!(crossing().evaluate(1249, 1248), vec![CreditAlert::Warning]);
        assert!(crossing().evaluate(1248, 1247).is_empty());
        assert_eq!(crossing().evaluate(1246, 1245), vec![CreditAlert::Urgent]);
        assert_eq!(
            crossing().evaluate(1300, 1200),
            vec![CreditAlert::Warning, CreditAlert::Urgent]
        );
    }
}
