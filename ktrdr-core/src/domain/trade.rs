//! Trade — a completed round-trip with realized PnL and costs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::PositionSide;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    EndOfData,
    Cancelled,
}

/// A closed position: entry → exit, net of commission and slippage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: PositionSide,

    pub entry_bar: usize,
    pub entry_time: DateTime<Utc>,
    /// Entry fill price (slippage included).
    pub entry_price: f64,

    pub exit_bar: usize,
    pub exit_time: DateTime<Utc>,
    /// Exit fill price (slippage included).
    pub exit_price: f64,

    pub quantity: f64,

    /// Realized PnL net of commission (fill prices already carry slippage).
    pub pnl: f64,
    /// PnL as a fraction of entry notional.
    pub pnl_pct: f64,
    /// Total commission paid across both legs.
    pub commission: f64,

    pub bars_held: usize,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
