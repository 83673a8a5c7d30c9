//! Position — the single open holding of a backtest run.
//!
//! The engine simulates single-instrument strategies: at most one open
//! position at a time. Portfolio aggregation is out of scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

/// An open position in a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub side: PositionSide,
    pub entry_time: DateTime<Utc>,
    pub entry_bar: usize,
    /// Fill price including slippage.
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub bars_held: usize,
    /// Unrealized PnL at the last mark-to-market price.
    pub unrealized_pnl: f64,
    /// Commission already paid on the entry fill.
    pub entry_commission: f64,
}

impl Position {
    pub fn open(
        side: PositionSide,
        entry_time: DateTime<Utc>,
        entry_bar: usize,
        entry_price: f64,
        quantity: f64,
        entry_commission: f64,
    ) -> Self {
        Self {
            side,
            entry_time,
            entry_bar,
            entry_price,
            quantity,
            stop_price: None,
            take_profit_price: None,
            bars_held: 0,
            unrealized_pnl: 0.0,
            entry_commission,
        }
    }

    /// Mark the position to a new price, updating unrealized PnL.
    pub fn update_mark(&mut self, price: f64) {
        self.unrealized_pnl = match self.side {
            PositionSide::Long => (price - self.entry_price) * self.quantity,
            PositionSide::Short => (self.entry_price - price) * self.quantity,
        };
    }

    /// Increment the bars-held counter (called once per bar).
    pub fn tick_bar(&mut self) {
        self.bars_held += 1;
    }

    /// Signed market value at the given price.
    ///
    /// Long positions contribute `quantity * price`; short positions
    /// contribute `-quantity * price` (the liability of buying back).
    /// `cash + position_value(price)` is the account equity.
    pub fn position_value(&self, price: f64) -> f64 {
        match self.side {
            PositionSide::Long => self.quantity * price,
            PositionSide::Short => -self.quantity * price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap()
    }

    #[test]
    fn long_unrealized_pnl() {
        let mut pos = Position::open(PositionSide::Long, t0(), 0, 100.0, 10.0, 1.0);
        pos.update_mark(110.0);
        assert_eq!(pos.unrealized_pnl, 100.0);
    }

    #[test]
    fn short_unrealized_pnl() {
        let mut pos = Position::open(PositionSide::Short, t0(), 0, 100.0, 10.0, 1.0);
        pos.update_mark(90.0);
        assert_eq!(pos.unrealized_pnl, 100.0);
    }

    #[test]
    fn position_value_sign() {
        let long = Position::open(PositionSide::Long, t0(), 0, 100.0, 10.0, 0.0);
        let short = Position::open(PositionSide::Short, t0(), 0, 100.0, 10.0, 0.0);
        assert_eq!(long.position_value(105.0), 1050.0);
        assert_eq!(short.position_value(105.0), -1050.0);
    }

    #[test]
    fn bars_held_increments() {
        let mut pos = Position::open(PositionSide::Long, t0(), 0, 100.0, 10.0, 0.0);
        pos.tick_bar();
        pos.tick_bar();
        assert_eq!(pos.bars_held, 2);
    }
}
