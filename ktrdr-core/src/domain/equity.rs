//! Per-bar equity accounting sample.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sample of the equity curve, taken at every bar of a backtest.
///
/// Invariant: `cash + position_value == total_equity` at every bar.
/// `drawdown` is the fractional decline from the running equity peak
/// (0.0 at a new peak, positive below it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub position_value: f64,
    pub total_equity: f64,
    pub drawdown: f64,
}
