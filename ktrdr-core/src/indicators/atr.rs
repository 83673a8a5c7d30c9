//! Average True Range (ATR).
//!
//! True range: max(high - low, |high - prev_close|, |low - prev_close|).
//! ATR is the Wilder-smoothed true range, seeded by the SMA of the first
//! `period` true ranges (TR[0] = high - low, no previous close).
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];

        if n < self.period {
            return result;
        }

        // True ranges
        let mut tr = vec![f64::NAN; n];
        for i in 0..n {
            let bar = &bars[i];
            if bar.high.is_nan() || bar.low.is_nan() {
                continue;
            }
            tr[i] = if i == 0 {
                bar.high - bar.low
            } else {
                let prev_close = bars[i - 1].close;
                if prev_close.is_nan() {
                    f64::NAN
                } else {
                    (bar.high - bar.low)
                        .max((bar.high - prev_close).abs())
                        .max((bar.low - prev_close).abs())
                }
            };
        }

        // Seed: SMA of first `period` true ranges
        let mut sum = 0.0;
        for &v in tr.iter().take(self.period) {
            if v.is_nan() {
                return result;
            }
            sum += v;
        }
        let mut atr = sum / self.period as f64;
        result[self.period - 1] = atr;

        // Wilder smoothing
        let p = self.period as f64;
        for i in self.period..n {
            if tr[i].is_nan() {
                for val in result.iter_mut().skip(i) {
                    *val = f64::NAN;
                }
                return result;
            }
            atr = (atr * (p - 1.0) + tr[i]) / p;
            result[i] = atr;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn atr_constant_range() {
        // make_bars produces high - low = |close - open| + 2; with a flat
        // series every bar's range is exactly 2 and gaps are zero.
        let bars = make_bars(&[100.0; 10]);
        let result = Atr::new(3).compute(&bars);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 2.0, DEFAULT_EPSILON);
        assert_approx(result[9], 2.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_wilder_recursion() {
        let bars = make_bars(&[100.0, 102.0, 104.0, 103.0, 106.0, 101.0]);
        let atr = Atr::new(3);
        let result = atr.compute(&bars);

        // Recompute the recursion by hand from the seed
        let mut tr = vec![0.0; 6];
        for i in 0..6 {
            tr[i] = if i == 0 {
                bars[0].high - bars[0].low
            } else {
                let pc = bars[i - 1].close;
                (bars[i].high - bars[i].low)
                    .max((bars[i].high - pc).abs())
                    .max((bars[i].low - pc).abs())
            };
        }
        let mut expected = (tr[0] + tr[1] + tr[2]) / 3.0;
        assert_approx(result[2], expected, DEFAULT_EPSILON);
        for i in 3..6 {
            expected = (expected * 2.0 + tr[i]) / 3.0;
            assert_approx(result[i], expected, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn atr_is_positive() {
        let bars = make_bars(&[100.0, 103.0, 99.0, 105.0, 98.0, 104.0]);
        let result = Atr::new(3).compute(&bars);
        for v in result.iter().skip(2) {
            assert!(*v > 0.0);
        }
    }

    #[test]
    fn atr_short_series_all_nan() {
        let bars = make_bars(&[100.0, 101.0]);
        let result = Atr::new(5).compute(&bars);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn atr_lookback() {
        assert_eq!(Atr::new(14).lookback(), 13);
    }
}
