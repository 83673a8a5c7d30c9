//! ZigZag — threshold-based pivot detection on close prices.
//!
//! A pivot is confirmed when price has moved at least `threshold` (relative,
//! |new - pivot| / pivot) from the running extreme in the opposite
//! direction. Equal extremes keep the first bar (first bar wins ties).
//!
//! The indicator output is a sparse series: pivot price at confirmed pivot
//! indices, NaN everywhere else. Pivots are marked retroactively — a pivot
//! at bar t is only known once a later bar crosses the reversal threshold —
//! so this series must never be used as a model input. It exists for the
//! supervised labeler, which is allowed to peek forward.

use super::Indicator;
use crate::domain::Bar;

/// Whether a pivot is a local maximum or minimum of the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotKind {
    High,
    Low,
}

/// A confirmed (or trailing provisional) pivot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
}

/// Walk close prices left-to-right and collect pivots.
///
/// With `include_provisional`, the running extreme after the last confirmed
/// pivot is appended as a final, not-yet-confirmed pivot. The labeler wants
/// it (the last swing still carries direction information); the sparse
/// indicator series does not.
pub fn detect_pivots(closes: &[f64], threshold: f64, include_provisional: bool) -> Vec<Pivot> {
    let mut pivots = Vec::new();
    if closes.is_empty() {
        return pivots;
    }

    // Direction of the move since the last pivot; None until the first
    // reversal resolves it.
    let mut direction: Option<PivotKind> = None;
    let mut max_price = closes[0];
    let mut max_index = 0usize;
    let mut min_price = closes[0];
    let mut min_index = 0usize;

    for (i, &c) in closes.iter().enumerate().skip(1) {
        if c.is_nan() {
            continue;
        }
        match direction {
            None => {
                // Strict comparisons: the first bar at an extreme wins ties.
                if c > max_price {
                    max_price = c;
                    max_index = i;
                }
                if c < min_price {
                    min_price = c;
                    min_index = i;
                }
                if min_price > 0.0 && (c - min_price) / min_price >= threshold {
                    pivots.push(Pivot {
                        index: min_index,
                        price: min_price,
                        kind: PivotKind::Low,
                    });
                    direction = Some(PivotKind::High);
                    max_price = c;
                    max_index = i;
                } else if max_price > 0.0 && (max_price - c) / max_price >= threshold {
                    pivots.push(Pivot {
                        index: max_index,
                        price: max_price,
                        kind: PivotKind::High,
                    });
                    direction = Some(PivotKind::Low);
                    min_price = c;
                    min_index = i;
                }
            }
            // Tracking a high candidate since the last (low) pivot.
            Some(PivotKind::High) => {
                if c > max_price {
                    max_price = c;
                    max_index = i;
                } else if max_price > 0.0 && (max_price - c) / max_price >= threshold {
                    pivots.push(Pivot {
                        index: max_index,
                        price: max_price,
                        kind: PivotKind::High,
                    });
                    direction = Some(PivotKind::Low);
                    min_price = c;
                    min_index = i;
                }
            }
            // Tracking a low candidate since the last (high) pivot.
            Some(PivotKind::Low) => {
                if c < min_price {
                    min_price = c;
                    min_index = i;
                } else if min_price > 0.0 && (c - min_price) / min_price >= threshold {
                    pivots.push(Pivot {
                        index: min_index,
                        price: min_price,
                        kind: PivotKind::Low,
                    });
                    direction = Some(PivotKind::High);
                    max_price = c;
                    max_index = i;
                }
            }
        }
    }

    if include_provisional {
        match direction {
            Some(PivotKind::High) => pivots.push(Pivot {
                index: max_index,
                price: max_price,
                kind: PivotKind::High,
            }),
            Some(PivotKind::Low) => pivots.push(Pivot {
                index: min_index,
                price: min_price,
                kind: PivotKind::Low,
            }),
            None => {}
        }
    }

    pivots
}

#[derive(Debug, Clone)]
pub struct ZigZag {
    threshold: f64,
    name: String,
}

impl ZigZag {
    pub fn new(threshold: f64) -> Self {
        assert!(
            threshold > 0.0 && threshold < 1.0,
            "ZigZag threshold must be in (0, 1)"
        );
        Self {
            threshold,
            name: format!("zigzag_{threshold}"),
        }
    }
}

impl Indicator for ZigZag {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut result = vec![f64::NAN; closes.len()];
        for pivot in detect_pivots(&closes, self.threshold, false) {
            result[pivot.index] = pivot.price;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    #[test]
    fn pivots_on_simple_swing() {
        // 100 → 102 (2%, no) → 95 (6.9% drop, high confirmed at 102)
        // → 110 (15.8% rise, low confirmed at 95)
        let closes = [100.0, 102.0, 95.0, 110.0, 108.0];
        let pivots = detect_pivots(&closes, 0.05, false);
        assert_eq!(pivots.len(), 2);
        assert_eq!(pivots[0], Pivot { index: 1, price: 102.0, kind: PivotKind::High });
        assert_eq!(pivots[1], Pivot { index: 2, price: 95.0, kind: PivotKind::Low });
    }

    #[test]
    fn provisional_pivot_appended() {
        let closes = [100.0, 102.0, 95.0, 110.0, 108.0];
        let pivots = detect_pivots(&closes, 0.05, true);
        assert_eq!(pivots.len(), 3);
        assert_eq!(pivots[2], Pivot { index: 3, price: 110.0, kind: PivotKind::High });
    }

    #[test]
    fn flat_series_has_no_pivots() {
        let closes = [100.0; 20];
        assert!(detect_pivots(&closes, 0.05, true).is_empty());
    }

    #[test]
    fn equal_extremes_first_bar_wins() {
        // Double top at 110 (indices 2 and 3); pivot lands on index 2.
        let closes = [100.0, 105.0, 110.0, 110.0, 100.0];
        let pivots = detect_pivots(&closes, 0.05, false);
        assert_eq!(pivots.len(), 2); // initial low at 0, high at 2
        let high = pivots.iter().find(|p| p.kind == PivotKind::High).unwrap();
        assert_eq!(high.index, 2);
    }

    #[test]
    fn threshold_is_relative() {
        // 4% move ignored at 5% threshold, confirmed at 3%
        let closes = [100.0, 104.0, 100.0, 104.0];
        assert!(detect_pivots(&closes, 0.05, false).is_empty());
        assert!(!detect_pivots(&closes, 0.03, false).is_empty());
    }

    #[test]
    fn indicator_series_is_sparse() {
        let bars = make_bars(&[100.0, 102.0, 95.0, 110.0, 108.0]);
        let result = ZigZag::new(0.05).compute(&bars);
        assert!(result[0].is_nan());
        assert_eq!(result[1], 102.0);
        assert_eq!(result[2], 95.0);
        assert!(result[3].is_nan()); // provisional, not confirmed
        assert!(result[4].is_nan());
    }
}
