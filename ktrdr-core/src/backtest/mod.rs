//! Event-driven backtest engine — bar-by-bar simulation of a single
//! instrument with position/PnL accounting.

pub mod engine;

pub use engine::{run_backtest, BacktestOutcome};

use serde::{Deserialize, Serialize};

use crate::error::{KtrdrError, Result};

/// Position sizing policy for entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSizing {
    /// Fraction of current equity per position.
    FixedFraction { fraction: f64 },

    /// Fixed notional value per position.
    FixedNotional { notional: f64 },

    /// Fixed number of units per position.
    FixedQuantity { quantity: f64 },
}

impl PositionSizing {
    fn validate(&self) -> Result<()> {
        let ok = match *self {
            PositionSizing::FixedFraction { fraction } => fraction > 0.0 && fraction <= 1.0,
            PositionSizing::FixedNotional { notional } => notional > 0.0,
            PositionSizing::FixedQuantity { quantity } => quantity > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(KtrdrError::Config(format!(
                "invalid position sizing: {self:?}"
            )))
        }
    }
}

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Relative commission on every fill's notional (e.g. 0.001).
    pub commission_rate: f64,
    /// Relative slippage applied adversely to every fill price.
    pub slippage_rate: f64,
    /// Minimum decision confidence to act on a non-HOLD signal.
    pub confidence_threshold: f64,
    pub sizing: PositionSizing,
    /// Stop-loss distance as a fraction of the entry fill (e.g. 0.05).
    pub stop_loss: Option<f64>,
    /// Take-profit distance as a fraction of the entry fill.
    pub take_profit: Option<f64>,
    /// Hard cap on entry notional.
    pub max_position_notional: Option<f64>,
    /// Bars to wait after a close before the next entry.
    #[serde(default)]
    pub cooldown_bars: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            commission_rate: 0.001,
            slippage_rate: 0.001,
            confidence_threshold: 0.6,
            sizing: PositionSizing::FixedFraction { fraction: 0.95 },
            stop_loss: None,
            take_profit: None,
            max_position_notional: None,
            cooldown_bars: 0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_capital <= 0.0 {
            return Err(KtrdrError::Config("initial_capital must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.commission_rate) {
            return Err(KtrdrError::Config(format!(
                "commission rate must be in [0, 1), got {}",
                self.commission_rate
            )));
        }
        if !(0.0..1.0).contains(&self.slippage_rate) {
            return Err(KtrdrError::Config(format!(
                "slippage rate must be in [0, 1), got {}",
                self.slippage_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(KtrdrError::Config(format!(
                "confidence threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        for (name, v) in [("stop_loss", self.stop_loss), ("take_profit", self.take_profit)] {
            if let Some(v) = v {
                if !(0.0..1.0).contains(&v) || v == 0.0 {
                    return Err(KtrdrError::Config(format!(
                        "{name} must be in (0, 1), got {v}"
                    )));
                }
            }
        }
        self.sizing.validate()
    }
}
