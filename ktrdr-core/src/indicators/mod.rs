//! Indicator engine — stateless numerical transforms over OHLCV series.
//!
//! Indicators are pure functions: bar history in, numeric series out,
//! aligned 1:1 with the input. The first `lookback()` values are `f64::NAN`
//! (the missing-value sentinel). They are computed once per run and queried
//! by bar index afterwards; no per-bar recomputation.
//!
//! Construction goes through the registry (`build_indicators`), which
//! validates parameters against each indicator's schema at load time so the
//! hot path can assume well-typed records. Multi-output indicators (MACD,
//! Bollinger) are exposed as separate named instances per output series.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod zigzag;

pub use atr::Atr;
pub use bollinger::{Bollinger, BollingerBand};
pub use ema::{ema_of_series, Ema};
pub use macd::{Macd, MacdOutput};
pub use rsi::Rsi;
pub use sma::Sma;
pub use zigzag::{detect_pivots, Pivot, PivotKind, ZigZag};

use crate::domain::Bar;
use crate::error::{KtrdrError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Trait for indicators.
///
/// Indicators take a full bar series and produce an output series of the
/// same length. The first `lookback()` values should be `f64::NAN` (warmup).
///
/// # Look-ahead contamination guard
/// No indicator value at bar t may depend on price data from bar t+1 or
/// later. Every indicator must pass the truncated-vs-full series test.
/// (ZigZag is the deliberate exception: it marks pivots retroactively and
/// exists for label generation, never as a model input.)
pub trait Indicator: Send + Sync + std::fmt::Debug {
    /// Canonical name (e.g., "rsi_14", "macd_12_26_9").
    fn name(&self) -> &str;

    /// Number of leading bars for which the output is undefined.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Declarative indicator reference from a strategy config.
///
/// `params` holds every numeric parameter; the registry checks names,
/// ranges, and inter-parameter constraints before constructing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub name: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, f64>,
}

impl IndicatorSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

/// Build the indicator instances for one spec.
///
/// Multi-output indicators expand into several named instances sharing the
/// same parameters. Unknown names and out-of-range parameters are `Config`
/// errors; nothing is constructed on failure.
pub fn build_indicators(spec: &IndicatorSpec) -> Result<Vec<Box<dyn Indicator>>> {
    match spec.name.as_str() {
        "sma" => {
            let period = usize_param(spec, "period", 20.0, 1, 5000)?;
            Ok(vec![Box::new(Sma::new(period))])
        }
        "ema" => {
            let period = usize_param(spec, "period", 20.0, 1, 5000)?;
            Ok(vec![Box::new(Ema::new(period))])
        }
        "rsi" => {
            let period = usize_param(spec, "period", 14.0, 1, 5000)?;
            Ok(vec![Box::new(Rsi::new(period))])
        }
        "atr" => {
            let period = usize_param(spec, "period", 14.0, 1, 5000)?;
            Ok(vec![Box::new(Atr::new(period))])
        }
        "macd" => {
            let fast = usize_param(spec, "fast_period", 12.0, 1, 5000)?;
            let slow = usize_param(spec, "slow_period", 26.0, 1, 5000)?;
            let signal = usize_param(spec, "signal_period", 9.0, 1, 5000)?;
            if fast >= slow {
                return Err(KtrdrError::Config(format!(
                    "macd: fast_period ({fast}) must be < slow_period ({slow})"
                )));
            }
            Ok(vec![
                Box::new(Macd::line(fast, slow, signal)),
                Box::new(Macd::signal(fast, slow, signal)),
                Box::new(Macd::histogram(fast, slow, signal)),
            ])
        }
        "bollinger" => {
            let period = usize_param(spec, "period", 20.0, 1, 5000)?;
            let mult = f64_param(spec, "multiplier", 2.0)?;
            if mult <= 0.0 {
                return Err(KtrdrError::Config(format!(
                    "bollinger: multiplier must be > 0, got {mult}"
                )));
            }
            Ok(vec![
                Box::new(Bollinger::upper(period, mult)),
                Box::new(Bollinger::middle(period, mult)),
                Box::new(Bollinger::lower(period, mult)),
            ])
        }
        "zigzag" => {
            let threshold = f64_param(spec, "threshold", 0.05)?;
            if !(0.0..1.0).contains(&threshold) || threshold == 0.0 {
                return Err(KtrdrError::Config(format!(
                    "zigzag: threshold must be in (0, 1), got {threshold}"
                )));
            }
            Ok(vec![Box::new(ZigZag::new(threshold))])
        }
        other => Err(KtrdrError::Config(format!("unknown indicator '{other}'"))),
    }
}

/// Build instances for a whole list of specs, flattened in declared order.
pub fn build_all(specs: &[IndicatorSpec]) -> Result<Vec<Box<dyn Indicator>>> {
    let mut out = Vec::new();
    for spec in specs {
        out.extend(build_indicators(spec)?);
    }
    Ok(out)
}

fn usize_param(spec: &IndicatorSpec, key: &str, default: f64, min: usize, max: usize) -> Result<usize> {
    let raw = *spec.params.get(key).unwrap_or(&default);
    if !raw.is_finite() || raw.fract() != 0.0 || raw < 0.0 {
        return Err(KtrdrError::Config(format!(
            "{}: parameter '{key}' must be a non-negative integer, got {raw}",
            spec.name
        )));
    }
    let value = raw as usize;
    if value < min || value > max {
        return Err(KtrdrError::Config(format!(
            "{}: parameter '{key}' must be in [{min}, {max}], got {value}",
            spec.name
        )));
    }
    Ok(value)
}

fn f64_param(spec: &IndicatorSpec, key: &str, default: f64) -> Result<f64> {
    let raw = *spec.params.get(key).unwrap_or(&default);
    if !raw.is_finite() {
        return Err(KtrdrError::Config(format!(
            "{}: parameter '{key}' must be finite, got {raw}",
            spec.name
        )));
    }
    Ok(raw)
}

/// Container for precomputed indicator series, keyed by canonical name.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute every indicator once over the bar series.
    pub fn compute_all(indicators: &[Box<dyn Indicator>], bars: &[Bar]) -> Self {
        let mut values = Self::new();
        for ind in indicators {
            values.insert(ind.name().to_string(), ind.compute(bars));
        }
        values
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Value of a named indicator at a bar index.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(bar_index).copied())
    }

    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev close (or close for the first bar),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
