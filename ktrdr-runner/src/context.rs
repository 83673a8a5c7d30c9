//! StrategyContext — the explicit per-run value threaded through every
//! operation. There is no process-wide configuration state.

use std::path::PathBuf;

use ktrdr_core::error::Result;

use crate::config::StrategyConfig;

/// Validated configuration plus run-level resources.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub config: StrategyConfig,
    /// OHLCV cache directory.
    pub data_dir: PathBuf,
    /// Model artifact root directory.
    pub artifact_dir: PathBuf,
    /// Master seed; training derives its own sub-seeds from the config.
    pub seed: u64,
}

impl StrategyContext {
    /// Build a context from an already-parsed config, re-validating it.
    pub fn new(
        config: StrategyConfig,
        data_dir: impl Into<PathBuf>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        let seed = config.model.training.seed;
        Ok(Self {
            config,
            data_dir: data_dir.into(),
            artifact_dir: artifact_dir.into(),
            seed,
        })
    }

    pub fn strategy_name(&self) -> &str {
        &self.config.name
    }
}
