//! Supervised label generation from future price movement.
//!
//! The ZigZag labeler deliberately uses future information: labels feed
//! training only, never inference. The decision engine never sees them.

use crate::domain::{Bar, Signal};
use crate::error::{KtrdrError, Result};
use crate::indicators::zigzag::detect_pivots;

/// ZigZag labeler.
///
/// For bar t, scan the confirmed pivots p with t < p <= t + lookahead and
/// pick the first whose net relative move |close[p] - close[t]| / close[t]
/// reaches the threshold. Up move → BUY, down move → SELL. A full window
/// with no qualifying pivot → HOLD. A window truncated by the series end
/// with no qualifying pivot → unlabeled (`None`): the future is unknown
/// there, and those bars must be excluded from every split.
#[derive(Debug, Clone)]
pub struct ZigZagLabeler {
    threshold: f64,
    lookahead: usize,
}

impl ZigZagLabeler {
    pub fn new(threshold: f64, lookahead: usize) -> Result<Self> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(KtrdrError::Config(format!(
                "zigzag label threshold must be in (0, 1), got {threshold}"
            )));
        }
        if lookahead == 0 {
            return Err(KtrdrError::Config(
                "zigzag label lookahead must be >= 1".into(),
            ));
        }
        Ok(Self {
            threshold,
            lookahead,
        })
    }

    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// Label a close-price series. Output is index-aligned with the input.
    pub fn label(&self, closes: &[f64]) -> Vec<Option<Signal>> {
        let n = closes.len();
        let pivots = detect_pivots(closes, self.threshold, true);
        let mut labels = vec![None; n];

        for t in 0..n {
            let here = closes[t];
            if here.is_nan() || here <= 0.0 {
                continue;
            }
            let window_end = (t + self.lookahead).min(n.saturating_sub(1));
            let full_window = t + self.lookahead <= n.saturating_sub(1);

            let qualifying = pivots.iter().find(|p| {
                p.index > t
                    && p.index <= window_end
                    && (closes[p.index] - here).abs() / here >= self.threshold
            });

            labels[t] = match qualifying {
                Some(p) if closes[p.index] > here => Some(Signal::Buy),
                Some(_) => Some(Signal::Sell),
                None if full_window => Some(Signal::Hold),
                None => None,
            };
        }

        labels
    }

    pub fn label_bars(&self, bars: &[Bar]) -> Vec<Option<Signal>> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        self.label(&closes)
    }
}

/// Per-class counts of a label series, ignoring unlabeled bars.
pub fn label_distribution(labels: &[Option<Signal>]) -> [usize; Signal::COUNT] {
    let mut counts = [0usize; Signal::COUNT];
    for label in labels.iter().flatten() {
        counts[label.class_index()] += 1;
    }
    counts
}
