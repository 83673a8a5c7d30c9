//! Domain types: bars, timeframes, signals, positions, trades, equity.

pub mod bar;
pub mod equity;
pub mod position;
pub mod signal;
pub mod timeframe;
pub mod trade;

pub use bar::{validate_series, Bar};
pub use equity::EquityPoint;
pub use position::{Position, PositionSide};
pub use signal::{Decision, Signal};
pub use timeframe::Timeframe;
pub use trade::{ExitReason, Trade};
