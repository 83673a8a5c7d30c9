//! Strategy orchestrator — wires indicators, fuzzy sets, features, labels,
//! the trainer, the artifact store, and the backtest engine under one
//! declarative config.
//!
//! Three operations share the indicator → fuzzy → feature pipeline and
//! differ only in the terminal step:
//! - `train`: label, fit, persist a new artifact version
//! - `backtest`: load an artifact, simulate, report
//! - `predict`: load an artifact, decide for the latest bar
//!
//! Failed or cancelled runs never promote partial artifacts.

use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use ktrdr_core::backtest::run_backtest;
use ktrdr_core::data::OhlcvCache;
use ktrdr_core::decision::DecisionEngine;
use ktrdr_core::domain::{Bar, Decision, Timeframe};
use ktrdr_core::error::{KtrdrError, Result};
use ktrdr_core::features::FeatureAssembler;
use ktrdr_core::labels::{label_distribution, ZigZagLabeler};
use ktrdr_core::model::{
    permutation_importance, train as train_model, ArtifactStore, ModelArtifact, SplitMetrics,
    TrainingHistory,
};
use ktrdr_core::observer::RunObserver;

use crate::context::StrategyContext;
use crate::metrics::PerformanceMetrics;
use crate::report::BacktestReport;

/// Result of a training run: the minted version plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub strategy: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub version: u32,
    pub metrics: SplitMetrics,
    pub history: TrainingHistory,
    pub importance: BTreeMap<String, f64>,
    /// Labeled-row counts per class (BUY, HOLD, SELL).
    pub label_counts: [usize; 3],
    pub trained_rows: usize,
    pub config_snapshot: String,
    pub dataset_hash: String,
}

/// Train a new model version on pre-loaded bars.
pub fn train(
    ctx: &StrategyContext,
    symbol: &str,
    timeframe: Timeframe,
    bars: &[Bar],
    observer: &dyn RunObserver,
) -> Result<TrainReport> {
    let config = &ctx.config;
    require_history(config.data.history_required, bars.len())?;

    let indicators = config.build_indicator_instances()?;
    let fuzzy = config.build_fuzzy_engine()?;
    let feature_spec = config.feature_spec();
    let assembler = FeatureAssembler::new(&indicators, &fuzzy, &feature_spec)?;
    let matrix = assembler.assemble(bars)?;

    let labeler = ZigZagLabeler::new(
        config.training.labels.zigzag_threshold,
        config.training.labels.label_lookahead,
    )?;
    let labels = labeler.label_bars(bars);
    let label_counts = label_distribution(&labels);

    // Keep feature rows whose source bar carries a label; the trailing
    // lookahead window and the warmup union drop out here.
    let mut kept_rows = Vec::new();
    let mut y = Vec::new();
    for (row, &bar_idx) in matrix.bar_indices.iter().enumerate() {
        if let Some(label) = labels[bar_idx] {
            kept_rows.push(row);
            y.push(label);
        }
    }
    let mut data = Vec::with_capacity(kept_rows.len() * matrix.width());
    for &r in &kept_rows {
        data.extend(matrix.values.row(r).iter().copied());
    }
    let x = Array2::from_shape_vec((kept_rows.len(), matrix.width()), data)
        .map_err(|e| KtrdrError::Model(format!("training matrix shape: {e}")))?;

    info!(
        symbol,
        %timeframe,
        rows = x.nrows(),
        features = x.ncols(),
        "training set assembled"
    );

    let trained = train_model(
        &x,
        &y,
        &config.model.architecture.hidden_layers,
        config.model.architecture.dropout,
        config.model.features.scaler,
        &config.training.data_split,
        &config.training_config(),
        observer,
    )?;

    let importance = permutation_importance(
        &trained.mlp,
        &trained.val_features,
        &trained.val_labels,
        &matrix.names,
        ctx.seed,
    );

    // A cancellation between the last epoch and persistence still discards
    // the artifact: versions are minted only for completed runs.
    if observer.cancelled() {
        return Err(KtrdrError::Cancelled);
    }

    let snapshot = config.config_snapshot();
    let artifact = ModelArtifact {
        version: 0,
        strategy: config.name.clone(),
        symbol: symbol.to_string(),
        timeframe,
        created_at: Utc::now(),
        architecture: ktrdr_core::model::Architecture {
            input_dim: matrix.width(),
            hidden_layers: config.model.architecture.hidden_layers.clone(),
            dropout: config.model.architecture.dropout,
        },
        mlp: trained.mlp,
        feature_names: matrix.names.clone(),
        scaler: trained.scaler,
        config_snapshot: snapshot.clone(),
        metrics: trained.metrics,
        importance: importance.clone(),
        history: trained.history.clone(),
    };

    let store = ArtifactStore::new(&ctx.artifact_dir);
    let version = store.save(&artifact)?;

    Ok(TrainReport {
        strategy: config.name.clone(),
        symbol: symbol.to_string(),
        timeframe,
        version,
        metrics: trained.metrics,
        history: trained.history,
        importance,
        label_counts,
        trained_rows: x.nrows(),
        config_snapshot: snapshot,
        dataset_hash: dataset_hash(bars),
    })
}

/// Backtest a trained model version (latest when `version` is `None`) on
/// pre-loaded bars.
pub fn backtest(
    ctx: &StrategyContext,
    symbol: &str,
    timeframe: Timeframe,
    bars: &[Bar],
    version: Option<u32>,
    observer: &dyn RunObserver,
) -> Result<BacktestReport> {
    let config = &ctx.config;
    require_history(config.data.history_required, bars.len())?;

    let engine = decision_engine(ctx, symbol, timeframe, version)?;
    let model_version = engine.artifact().version;
    let decisions = engine.decide_series(bars)?;

    let outcome = run_backtest(symbol, bars, &decisions, &config.backtest_config(), observer)?;
    if outcome.cancelled {
        return Err(KtrdrError::Cancelled);
    }

    let metrics = PerformanceMetrics::compute(&outcome.equity_curve, &outcome.trades);
    Ok(BacktestReport {
        strategy: config.name.clone(),
        symbol: symbol.to_string(),
        timeframe,
        model_version,
        initial_capital: outcome.initial_capital,
        final_equity: outcome.final_equity,
        bar_count: outcome.bar_count,
        decision_count: outcome.decision_count,
        metrics,
        trades: outcome.trades,
        equity_curve: outcome.equity_curve,
        config_snapshot: config.config_snapshot(),
        dataset_hash: dataset_hash(bars),
    })
}

/// Decision for the latest bar of a pre-loaded series.
pub fn predict(
    ctx: &StrategyContext,
    symbol: &str,
    timeframe: Timeframe,
    bars: &[Bar],
    version: Option<u32>,
) -> Result<Decision> {
    let engine = decision_engine(ctx, symbol, timeframe, version)?;
    engine.decide_latest(bars)
}

/// Cache-loading front ends for the three operations.
pub fn train_from_cache(
    ctx: &StrategyContext,
    symbol: &str,
    timeframe: Timeframe,
    range: Option<(NaiveDate, NaiveDate)>,
    observer: &dyn RunObserver,
) -> Result<TrainReport> {
    let bars = load_bars(ctx, symbol, timeframe, range)?;
    train(ctx, symbol, timeframe, &bars, observer)
}

pub fn backtest_from_cache(
    ctx: &StrategyContext,
    symbol: &str,
    timeframe: Timeframe,
    range: Option<(NaiveDate, NaiveDate)>,
    version: Option<u32>,
    observer: &dyn RunObserver,
) -> Result<BacktestReport> {
    let bars = load_bars(ctx, symbol, timeframe, range)?;
    backtest(ctx, symbol, timeframe, &bars, version, observer)
}

pub fn predict_from_cache(
    ctx: &StrategyContext,
    symbol: &str,
    timeframe: Timeframe,
    version: Option<u32>,
) -> Result<Decision> {
    let bars = load_bars(ctx, symbol, timeframe, None)?;
    predict(ctx, symbol, timeframe, &bars, version)
}

/// Load bars from the context's cache, honoring an optional date range and
/// the configured backtesting window.
pub fn load_bars(
    ctx: &StrategyContext,
    symbol: &str,
    timeframe: Timeframe,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<Bar>> {
    let cache = OhlcvCache::new(&ctx.data_dir);
    let (start, end) = match range {
        Some((s, e)) => (Some(s), Some(e)),
        None => (ctx.config.backtesting.start_date, ctx.config.backtesting.end_date),
    };
    cache.load_range(
        symbol,
        timeframe,
        start.map(start_of_day),
        end.map(start_of_day),
    )
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0).expect("valid midnight"), Utc)
}

fn decision_engine(
    ctx: &StrategyContext,
    symbol: &str,
    timeframe: Timeframe,
    version: Option<u32>,
) -> Result<DecisionEngine> {
    let config = &ctx.config;
    let store = ArtifactStore::new(&ctx.artifact_dir);
    let artifact = store.load(&config.name, symbol, timeframe, version)?;
    DecisionEngine::new(
        config.build_indicator_instances()?,
        config.build_fuzzy_engine()?,
        config.feature_spec(),
        artifact,
    )
}

fn require_history(required: usize, available: usize) -> Result<()> {
    if available < required {
        return Err(KtrdrError::InsufficientData {
            required,
            available,
        });
    }
    Ok(())
}

/// blake3 hex of the loaded bar series, recorded for reproducibility.
fn dataset_hash(bars: &[Bar]) -> String {
    let bytes = serde_json::to_vec(bars).expect("bars must serialize");
    blake3::hash(&bytes).to_hex().to_string()
}
