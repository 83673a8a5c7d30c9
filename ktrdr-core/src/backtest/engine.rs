//! The bar loop.
//!
//! Per bar, in order:
//! 1. cancellation check (force-close and stop on cancel)
//! 2. mark-to-market at the bar's close
//! 3. exits: stop-loss, take-profit, signal reversal, end-of-data
//! 4. entries (when flat): decision with confidence over threshold
//! 5. equity sample
//!
//! Commission is charged on every fill's notional; slippage moves every
//! fill price against the trade. A run that never produces a non-HOLD
//! decision ends with equity exactly equal to initial capital.

use tracing::{debug, info};

use super::{BacktestConfig, PositionSizing};
use crate::domain::{
    validate_series, Bar, Decision, EquityPoint, ExitReason, Position, PositionSide, Signal, Trade,
};
use crate::error::{KtrdrError, Result};
use crate::observer::RunObserver;

/// Everything a single simulation produces.
#[derive(Debug, Clone)]
pub struct BacktestOutcome {
    pub symbol: String,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub bar_count: usize,
    /// Bars that carried a decision (post-warmup).
    pub decision_count: usize,
    /// True when the run stopped on a cancellation signal.
    pub cancelled: bool,
}

struct EngineState {
    cash: f64,
    position: Option<Position>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    peak_equity: f64,
    cooldown_until: usize,
}

impl EngineState {
    fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            position: None,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            peak_equity: initial_capital,
            cooldown_until: 0,
        }
    }

    /// Close the open position at a fill price, booking cash and the trade.
    fn close_position(
        &mut self,
        symbol: &str,
        bar: &Bar,
        bar_index: usize,
        fill_price: f64,
        commission_rate: f64,
        reason: ExitReason,
    ) {
        let pos = match self.position.take() {
            Some(p) => p,
            None => return,
        };
        let notional = pos.quantity * fill_price;
        let exit_commission = notional * commission_rate;

        match pos.side {
            PositionSide::Long => self.cash += notional - exit_commission,
            PositionSide::Short => self.cash -= notional + exit_commission,
        }

        let gross = match pos.side {
            PositionSide::Long => (fill_price - pos.entry_price) * pos.quantity,
            PositionSide::Short => (pos.entry_price - fill_price) * pos.quantity,
        };
        let commission = pos.entry_commission + exit_commission;
        let pnl = gross - commission;
        let entry_notional = pos.entry_price * pos.quantity;

        debug!(
            symbol,
            bar_index,
            ?reason,
            pnl,
            "position closed"
        );
        self.trades.push(Trade {
            symbol: symbol.to_string(),
            side: pos.side,
            entry_bar: pos.entry_bar,
            entry_time: pos.entry_time,
            entry_price: pos.entry_price,
            exit_bar: bar_index,
            exit_time: bar.timestamp,
            exit_price: fill_price,
            quantity: pos.quantity,
            pnl,
            pnl_pct: if entry_notional > 0.0 {
                pnl / entry_notional
            } else {
                0.0
            },
            commission,
            bars_held: pos.bars_held,
            exit_reason: reason,
        });
    }

    /// Append the equity sample for this bar.
    fn record_equity(&mut self, bar: &Bar) {
        let position_value = self
            .position
            .as_ref()
            .map(|p| p.position_value(bar.close))
            .unwrap_or(0.0);
        let total_equity = self.cash + position_value;
        if total_equity > self.peak_equity {
            self.peak_equity = total_equity;
        }
        let drawdown = if self.peak_equity > 0.0 {
            (self.peak_equity - total_equity) / self.peak_equity
        } else {
            0.0
        };
        self.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            cash: self.cash,
            position_value,
            total_equity,
            drawdown,
        });
    }

    /// Start the re-entry cooldown, when one is configured. An exit with
    /// no cooldown leaves same-bar re-entry available (close-then-enter).
    fn arm_cooldown(&mut self, bar_index: usize, cooldown_bars: usize) {
        if cooldown_bars > 0 {
            self.cooldown_until = bar_index + 1 + cooldown_bars;
        }
    }

    fn equity(&self, price: f64) -> f64 {
        self.cash
            + self
                .position
                .as_ref()
                .map(|p| p.position_value(price))
                .unwrap_or(0.0)
    }
}

/// Run a backtest over a validated bar series and its precomputed,
/// index-aligned decision series.
///
/// Bars without a decision (warmup) are "flat, no decision". Per-bar errors
/// are fatal; nothing is silently skipped.
pub fn run_backtest(
    symbol: &str,
    bars: &[Bar],
    decisions: &[Option<Decision>],
    config: &BacktestConfig,
    observer: &dyn RunObserver,
) -> Result<BacktestOutcome> {
    config.validate()?;
    validate_series(bars)?;
    if bars.len() != decisions.len() {
        return Err(KtrdrError::Data {
            message: format!(
                "decision series length {} does not match bar count {}",
                decisions.len(),
                bars.len()
            ),
            bar_index: None,
        });
    }

    let n = bars.len();
    let mut state = EngineState::new(config.initial_capital);
    let mut cancelled = false;

    observer.on_start("backtest", n);

    for t in 0..n {
        let bar = &bars[t];

        // ── Cancellation ──
        if observer.cancelled() {
            let fill = cancel_fill(bar.close, config.slippage_rate, state.position.as_ref());
            state.close_position(symbol, bar, t, fill, config.commission_rate, ExitReason::Cancelled);
            state.record_equity(bar);
            cancelled = true;
            info!(symbol, bar_index = t, "backtest cancelled");
            break;
        }

        // ── Mark-to-market ──
        if let Some(pos) = state.position.as_mut() {
            pos.tick_bar();
            pos.update_mark(bar.close);
        }

        // ── Exits: stop-loss, take-profit, signal reversal ──
        if let Some(pos) = state.position.as_ref() {
            let side = pos.side;
            let stop_hit = pos.stop_price.filter(|&stop| match side {
                PositionSide::Long => bar.low <= stop,
                PositionSide::Short => bar.high >= stop,
            });
            let tp_hit = pos.take_profit_price.filter(|&tp| match side {
                PositionSide::Long => bar.high >= tp,
                PositionSide::Short => bar.low <= tp,
            });

            if let Some(stop) = stop_hit {
                let fill = adverse_exit_fill(stop, side, config.slippage_rate);
                state.close_position(symbol, bar, t, fill, config.commission_rate, ExitReason::StopLoss);
                state.arm_cooldown(t, config.cooldown_bars);
            } else if let Some(tp) = tp_hit {
                let fill = adverse_exit_fill(tp, side, config.slippage_rate);
                state.close_position(symbol, bar, t, fill, config.commission_rate, ExitReason::TakeProfit);
                state.arm_cooldown(t, config.cooldown_bars);
            } else if let Some(decision) = decisions[t] {
                let reversal = decision.confidence >= config.confidence_threshold
                    && matches!(
                        (side, decision.signal),
                        (PositionSide::Long, Signal::Sell) | (PositionSide::Short, Signal::Buy)
                    );
                if reversal {
                    let fill = adverse_exit_fill(bar.close, side, config.slippage_rate);
                    state.close_position(symbol, bar, t, fill, config.commission_rate, ExitReason::Signal);
                    state.arm_cooldown(t, config.cooldown_bars);
                }
            }
        }

        // ── Entries (no entries on the final bar: it only force-closes) ──
        if state.position.is_none() && t + 1 < n && t >= state.cooldown_until {
            if let Some(decision) = decisions[t] {
                if decision.signal != Signal::Hold
                    && decision.confidence >= config.confidence_threshold
                {
                    enter_position(&mut state, symbol, bar, t, decision.signal, config);
                }
            }
        }

        // ── End of data ──
        if t + 1 == n && state.position.is_some() {
            let side = state.position.as_ref().map(|p| p.side);
            let fill = match side {
                Some(s) => adverse_exit_fill(bar.close, s, config.slippage_rate),
                None => bar.close,
            };
            state.close_position(symbol, bar, t, fill, config.commission_rate, ExitReason::EndOfData);
        }

        // ── Equity sample ──
        state.record_equity(bar);
        observer.on_progress(t + 1, n);
    }

    let final_equity = state
        .equity_curve
        .last()
        .map(|p| p.total_equity)
        .unwrap_or(config.initial_capital);
    let decision_count = decisions.iter().filter(|d| d.is_some()).count();

    observer.on_finish(&format!(
        "backtest complete: {} trades, final equity {final_equity:.2}",
        state.trades.len()
    ));

    Ok(BacktestOutcome {
        symbol: symbol.to_string(),
        trades: state.trades,
        equity_curve: state.equity_curve,
        initial_capital: config.initial_capital,
        final_equity,
        bar_count: n,
        decision_count,
        cancelled,
    })
}

/// Open a position at the bar's close, slippage against the entry.
fn enter_position(
    state: &mut EngineState,
    symbol: &str,
    bar: &Bar,
    t: usize,
    signal: Signal,
    config: &BacktestConfig,
) {
    let side = match signal {
        Signal::Buy => PositionSide::Long,
        Signal::Sell => PositionSide::Short,
        Signal::Hold => return,
    };
    let fill = match side {
        PositionSide::Long => bar.close * (1.0 + config.slippage_rate),
        PositionSide::Short => bar.close * (1.0 - config.slippage_rate),
    };
    if fill <= 0.0 {
        return;
    }

    let equity = state.equity(bar.close);
    let mut notional = match config.sizing {
        PositionSizing::FixedFraction { fraction } => equity * fraction,
        PositionSizing::FixedNotional { notional } => notional,
        PositionSizing::FixedQuantity { quantity } => quantity * fill,
    };
    if let Some(cap) = config.max_position_notional {
        notional = notional.min(cap);
    }
    let quantity = match config.sizing {
        PositionSizing::FixedQuantity { quantity }
            if config.max_position_notional.is_none() =>
        {
            quantity
        }
        _ => notional / fill,
    };
    if quantity <= 0.0 {
        return;
    }

    let entry_notional = quantity * fill;
    let commission = entry_notional * config.commission_rate;
    match side {
        PositionSide::Long => state.cash -= entry_notional + commission,
        PositionSide::Short => state.cash += entry_notional - commission,
    }

    let mut position = Position::open(side, bar.timestamp, t, fill, quantity, commission);
    if let Some(sl) = config.stop_loss {
        position.stop_price = Some(match side {
            PositionSide::Long => fill * (1.0 - sl),
            PositionSide::Short => fill * (1.0 + sl),
        });
    }
    if let Some(tp) = config.take_profit {
        position.take_profit_price = Some(match side {
            PositionSide::Long => fill * (1.0 + tp),
            PositionSide::Short => fill * (1.0 - tp),
        });
    }
    debug!(symbol, bar_index = t, ?side, quantity, fill, "position opened");
    state.position = Some(position);
}

/// Exit fill price with slippage applied against the closing trade.
fn adverse_exit_fill(price: f64, side: PositionSide, slippage: f64) -> f64 {
    match side {
        PositionSide::Long => price * (1.0 - slippage),
        PositionSide::Short => price * (1.0 + slippage),
    }
}

/// Fill used by the cancellation path; flat positions are untouched.
fn cancel_fill(price: f64, slippage: f64, position: Option<&Position>) -> f64 {
    match position {
        Some(p) => adverse_exit_fill(price, p.side, slippage),
        None => price,
    }
}
