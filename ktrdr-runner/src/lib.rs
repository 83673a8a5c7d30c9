//! # KTRDR Runner
//!
//! Orchestration layer over `ktrdr-core`: declarative strategy configs and
//! the three top-level operations.
//!
//! ## Components
//!
//! - `StrategyConfig`: the TOML strategy document, validated at load
//! - `StrategyContext`: explicit per-run value (config, paths, seed)
//! - `orchestrator`: `train` / `backtest` / `predict` entry points
//! - `PerformanceMetrics`: pure statistics over equity curves and trades
//! - `report`: backtest report plus CSV/Parquet/JSON export

pub mod config;
pub mod context;
pub mod metrics;
pub mod orchestrator;
pub mod report;

pub use config::StrategyConfig;
pub use context::StrategyContext;
pub use metrics::PerformanceMetrics;
pub use orchestrator::{
    backtest, backtest_from_cache, predict, predict_from_cache, train, train_from_cache,
    TrainReport,
};
pub use report::{BacktestReport, RunManifest};
