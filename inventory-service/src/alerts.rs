//! Read-side classification of a stock row against its thresholds. Pure and
//! total; reporting callers use it without ever touching the movement path.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Ok,
    Low,
    Critical,
    OutOfStock,
}

impl AlertLevel {
    /// Higher means worse. Used by dashboards to sort and by tests to check
    /// monotonicity.
    pub fn severity(&self) -> u8 {
        match self {
            AlertLevel::Ok => 0,
            AlertLevel::Low => 1,
            AlertLevel::Critical => 2,
            AlertLevel::OutOfStock => 3,
        }
    }
}

/// Boundaries are inclusive on the worse classification: quantity exactly at a
/// threshold counts as having crossed it. Critical is checked before Low so a
/// misconfigured pair (critical above low) still resolves deterministically.
pub fn resolve_alert_level(quantity: f64, low_threshold: f64, critical_threshold: f64) -> AlertLevel {
    if quantity <= 0.0 {
        return AlertLevel::OutOfStock;
    }
    if quantity <= critical_threshold {
        return AlertLevel::Critical;
    }
    if quantity <= low_threshold {
        return AlertLevel::Low;
    }
    AlertLevel::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_quantity_is_out_of_stock_regardless_of_thresholds() {
        assert_eq!(resolve_alert_level(0.0, 0.0, 0.0), AlertLevel::OutOfStock);
        assert_eq!(resolve_alert_level(0.0, 10.0, 5.0), AlertLevel::OutOfStock);
        assert_eq!(resolve_alert_level(-1.0, 10.0, 5.0), AlertLevel::OutOfStock);
    }

    #[test]
    fn threshold_boundaries_are_inclusive() {
        // Exactly at critical resolves Critical, not Low.
        assert_eq!(resolve_alert_level(5.0, 10.0, 5.0), AlertLevel::Critical);
        // Exactly at low (and above critical) resolves Low.
        assert_eq!(resolve_alert_level(10.0, 10.0, 5.0), AlertLevel::Low);
        assert_eq!(resolve_alert_level(10.1, 10.0, 5.0), AlertLevel::Ok);
    }

    #[test]
    fn critical_wins_over_low_when_thresholds_are_misconfigured() {
        // critical > low is not validated here; the answer stays deterministic.
        assert_eq!(resolve_alert_level(7.0, 5.0, 10.0), AlertLevel::Critical);
    }

    #[test]
    fn severity_never_decreases_as_quantity_falls() {
        let low = 10.0;
        let critical = 5.0;
        let mut quantity = 20.0;
        let mut last = resolve_alert_level(quantity, low, critical).severity();
        while quantity > -1.0 {
            quantity -= 0.25;
            let level = resolve_alert_level(quantity, low, critical).severity();
            assert!(level >= last, "severity regressed at quantity {quantity}");
            last = level;
        }
    }
}
