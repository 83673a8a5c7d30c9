//! Bar — the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KtrdrError;

/// OHLCV bar for a single symbol at a single timestamp (UTC).
///
/// Bars for a (symbol, timeframe) form a strictly increasing, gap-permitting
/// sequence; gaps correspond to non-trading intervals. Series are read-only
/// once loaded — downstream stages never mutate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// OHLC sanity check: `low <= min(open, close) <= max(open, close) <= high`,
    /// non-negative volume, all fields finite.
    pub fn is_valid(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
            && self.volume >= 0.0
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
    }
}

/// Validate a full bar series at ingestion time.
///
/// Checks every bar's OHLC invariants and strict timestamp monotonicity.
/// The first offending bar index is reported in the error.
pub fn validate_series(bars: &[Bar]) -> Result<(), KtrdrError> {
    for (i, bar) in bars.iter().enumerate() {
        if !bar.is_valid() {
            return Err(KtrdrError::Data {
                message: format!(
                    "invalid OHLCV bar (o={}, h={}, l={}, c={}, v={})",
                    bar.open, bar.high, bar.low, bar.close, bar.volume
                ),
                bar_index: Some(i),
            });
        }
        if i > 0 && bars[i - 1].timestamp >= bar.timestamp {
            return Err(KtrdrError::Data {
                message: format!(
                    "non-monotonic timestamps: {} followed by {}",
                    bars[i - 1].timestamp,
                    bar.timestamp
                ),
                bar_index: Some(i),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn bar_is_valid() {
        assert!(sample_bar().is_valid());
    }

    #[test]
    fn bar_detects_high_below_low() {
        let mut bar = sample_bar();
        bar.high = 97.0;
        assert!(!bar.is_valid());
    }

    #[test]
    fn bar_detects_negative_volume() {
        let mut bar = sample_bar();
        bar.volume = -1.0;
        assert!(!bar.is_valid());
    }

    #[test]
    fn bar_detects_nan() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(!bar.is_valid());
    }

    #[test]
    fn series_rejects_non_monotonic_timestamps() {
        let a = sample_bar();
        let mut b = sample_bar();
        b.timestamp = a.timestamp; // duplicate
        let err = validate_series(&[a, b]).unwrap_err();
        match err {
            KtrdrError::Data { bar_index, .. } => assert_eq!(bar_index, Some(1)),
            other => panic!("expected Data error, got {other:?}"),
        }
    }

    #[test]
    fn series_reports_offending_index() {
        let a = sample_bar();
        let mut b = sample_bar();
        b.timestamp = a.timestamp + chrono::Duration::hours(1);
        b.low = 200.0; // above high
        let err = validate_series(&[a, b]).unwrap_err();
        match err {
            KtrdrError::Data { bar_index, .. } => assert_eq!(bar_index, Some(1)),
            other => panic!("expected Data error, got {other:?}"),
        }
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = sample_bar();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, deser);
    }
}
