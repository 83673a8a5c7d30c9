//! KTRDR Core — the neuro-fuzzy decision pipeline and its simulation engine.
//!
//! This crate contains the heart of the platform:
//! - Domain types (bars, signals, positions, trades, equity samples)
//! - Indicator engine: pure, causal transforms over OHLCV series
//! - Fuzzy engine: membership functions mapping indicators into [0, 1]
//! - Feature assembly with per-artifact frozen column order
//! - ZigZag supervised labeling (forward-looking, training only)
//! - MLP classifier, training harness, versioned model artifacts
//! - Decision engine (indicators → fuzzy → features → model)
//! - Bar-by-bar backtest engine with position/PnL accounting
//! - OHLCV cache and market-data gateway capability
//!
//! The pipeline is single-threaded and synchronous within a run; the only
//! cross-run shared resource is the artifact directory, which is written
//! atomically. Cancellation is cooperative via `observer::RunObserver`.

pub mod backtest;
pub mod data;
pub mod decision;
pub mod domain;
pub mod error;
pub mod features;
pub mod fuzzy;
pub mod indicators;
pub mod labels;
pub mod model;
pub mod observer;

pub use error::{KtrdrError, Result};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the types that cross run boundaries are
    /// Send + Sync, so concurrent independent runs stay safe.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Decision>();
        require_sync::<domain::Decision>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::EquityPoint>();
        require_sync::<domain::EquityPoint>();

        require_send::<fuzzy::FuzzyEngine>();
        require_sync::<fuzzy::FuzzyEngine>();
        require_send::<features::Scaler>();
        require_sync::<features::Scaler>();

        require_send::<model::Mlp>();
        require_sync::<model::Mlp>();
        require_send::<model::ModelArtifact>();
        require_sync::<model::ModelArtifact>();

        require_send::<backtest::engine::BacktestOutcome>();
        require_sync::<backtest::engine::BacktestOutcome>();

        require_send::<observer::CancelFlag>();
        require_sync::<observer::CancelFlag>();
    }
}
