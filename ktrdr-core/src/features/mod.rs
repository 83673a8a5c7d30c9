//! Feature assembly — fuzzy memberships plus optional price/volume context
//! and a lookback window, aligned into a dense matrix.
//!
//! The column order is a pure function of the configuration: fuzzy columns
//! in group/set declaration order, then price context, then volume context,
//! then lagged copies of every base column. The order is frozen into the
//! model artifact and must be reconstructable from the config alone.

pub mod scaler;

pub use scaler::{Scaler, ScalerKind, ScalerState};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::error::{KtrdrError, Result};
use crate::fuzzy::FuzzyEngine;
use crate::indicators::sma::sma_of_series;
use crate::indicators::{Indicator, IndicatorValues};

/// Price-context columns: ratio of close to an SMA, log returns over lags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceContextSpec {
    pub sma_period: usize,
    pub return_lags: Vec<usize>,
}

/// Volume-context column: volume relative to its rolling mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeContextSpec {
    pub period: usize,
}

/// Which optional feature blocks to append after the fuzzy memberships.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub price_context: Option<PriceContextSpec>,
    pub volume_context: Option<VolumeContextSpec>,
    /// Lookback window: append `f[t-1] ... f[t-L]` for every base column.
    #[serde(default)]
    pub lookback: usize,
}

/// A dense feature matrix with its column names and the mapping from row
/// back to source bar index (rows inside the warmup union are dropped).
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub values: Array2<f64>,
    pub bar_indices: Vec<usize>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }
}

/// Assembles the feature matrix for one (symbol, timeframe) series.
pub struct FeatureAssembler<'a> {
    indicators: &'a [Box<dyn Indicator>],
    fuzzy: &'a FuzzyEngine,
    spec: &'a FeatureSpec,
}

impl<'a> FeatureAssembler<'a> {
    /// Build and validate: every fuzzy group must reference an indicator
    /// instance that the engine will actually compute.
    pub fn new(
        indicators: &'a [Box<dyn Indicator>],
        fuzzy: &'a FuzzyEngine,
        spec: &'a FeatureSpec,
    ) -> Result<Self> {
        let names: Vec<String> = indicators.iter().map(|i| i.name().to_string()).collect();
        fuzzy.check_references(&names)?;
        if let Some(pc) = &spec.price_context {
            if pc.sma_period == 0 {
                return Err(KtrdrError::Config(
                    "price context sma_period must be >= 1".into(),
                ));
            }
            if pc.return_lags.iter().any(|&l| l == 0) {
                return Err(KtrdrError::Config("return lags must be >= 1".into()));
            }
        }
        if let Some(vc) = &spec.volume_context {
            if vc.period == 0 {
                return Err(KtrdrError::Config(
                    "volume context period must be >= 1".into(),
                ));
            }
        }
        Ok(Self {
            indicators,
            fuzzy,
            spec,
        })
    }

    /// Names of the base (un-lagged) columns, in frozen order.
    fn base_names(&self) -> Vec<String> {
        let mut names = self.fuzzy.feature_names();
        if let Some(pc) = &self.spec.price_context {
            names.push(format!("price_sma_{}_ratio", pc.sma_period));
            for lag in &pc.return_lags {
                names.push(format!("log_return_{lag}"));
            }
        }
        if let Some(vc) = &self.spec.volume_context {
            names.push(format!("volume_ratio_{}", vc.period));
        }
        names
    }

    /// All column names including lagged copies.
    pub fn feature_names(&self) -> Vec<String> {
        let base = self.base_names();
        let mut names = base.clone();
        for lag in 1..=self.spec.lookback {
            names.extend(base.iter().map(|n| format!("{n}_lag{lag}")));
        }
        names
    }

    pub fn width(&self) -> usize {
        self.base_width() * (1 + self.spec.lookback)
    }

    fn base_width(&self) -> usize {
        let mut w = self.fuzzy.width();
        if let Some(pc) = &self.spec.price_context {
            w += 1 + pc.return_lags.len();
        }
        if self.spec.volume_context.is_some() {
            w += 1;
        }
        w
    }

    /// Minimum bar count for at least one complete feature row.
    pub fn min_bars_required(&self) -> usize {
        let mut warmup = self
            .indicators
            .iter()
            .map(|i| i.lookback())
            .max()
            .unwrap_or(0);
        if let Some(pc) = &self.spec.price_context {
            warmup = warmup.max(pc.sma_period.saturating_sub(1));
            warmup = warmup.max(pc.return_lags.iter().copied().max().unwrap_or(0));
        }
        if let Some(vc) = &self.spec.volume_context {
            warmup = warmup.max(vc.period.saturating_sub(1));
        }
        warmup + self.spec.lookback + 1
    }

    /// Assemble the full feature matrix for a bar series.
    ///
    /// Rows containing any NaN (the union of warmup periods plus the
    /// lookback window) are dropped; `bar_indices` maps surviving rows back
    /// to their source bars.
    pub fn assemble(&self, bars: &[Bar]) -> Result<FeatureMatrix> {
        let n = bars.len();
        let required = self.min_bars_required();
        if n < required {
            return Err(KtrdrError::InsufficientData {
                required,
                available: n,
            });
        }

        let series = IndicatorValues::compute_all(self.indicators, bars);
        let fuzzy_matrix = self.fuzzy.evaluate_batch(&series, n)?;

        // Base columns: fuzzy memberships first, then context blocks.
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(self.base_width());
        for col in fuzzy_matrix.columns() {
            columns.push(col.to_vec());
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        if let Some(pc) = &self.spec.price_context {
            let sma = sma_of_series(&closes, pc.sma_period);
            columns.push(
                closes
                    .iter()
                    .zip(sma.iter())
                    .map(|(&c, &m)| if m.is_nan() || m == 0.0 { f64::NAN } else { c / m - 1.0 })
                    .collect(),
            );
            for &lag in &pc.return_lags {
                columns.push(log_returns(&closes, lag));
            }
        }

        if let Some(vc) = &self.spec.volume_context {
            let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
            let mean = sma_of_series(&volumes, vc.period);
            columns.push(
                volumes
                    .iter()
                    .zip(mean.iter())
                    .map(|(&v, &m)| if m.is_nan() || m == 0.0 { f64::NAN } else { v / m })
                    .collect(),
            );
        }

        // Lookback expansion: shifted copies of every base column.
        let base_count = columns.len();
        for lag in 1..=self.spec.lookback {
            for b in 0..base_count {
                let mut shifted = vec![f64::NAN; n];
                for t in lag..n {
                    shifted[t] = columns[b][t - lag];
                }
                columns.push(shifted);
            }
        }

        // Drop rows where any feature is missing.
        let width = columns.len();
        let mut bar_indices = Vec::new();
        let mut data = Vec::new();
        for t in 0..n {
            if columns.iter().any(|c| c[t].is_nan()) {
                continue;
            }
            bar_indices.push(t);
            for c in &columns {
                data.push(c[t]);
            }
        }

        if bar_indices.is_empty() {
            return Err(KtrdrError::InsufficientData {
                required,
                available: n,
            });
        }

        let values = Array2::from_shape_vec((bar_indices.len(), width), data)
            .map_err(|e| KtrdrError::Model(format!("feature matrix shape: {e}")))?;

        Ok(FeatureMatrix {
            names: self.feature_names(),
            values,
            bar_indices,
        })
    }
}

/// Log returns over a lag: ln(close[t] / close[t-lag]).
fn log_returns(closes: &[f64], lag: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    for t in lag..n {
        let prev = closes[t - lag];
        let curr = closes[t];
        if prev > 0.0 && curr > 0.0 {
            out[t] = (curr / prev).ln();
        }
    }
    out
}
