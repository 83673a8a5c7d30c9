//! MACD — Moving Average Convergence/Divergence.
//!
//! Three output series (separate Indicator instances sharing parameters):
//! - Line:      EMA_fast(close) - EMA_slow(close)
//! - Signal:    EMA_signal(line)
//! - Histogram: line - signal
//!
//! Lookback: slow - 1 for the line, slow + signal - 2 for signal/histogram.

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::Bar;

/// Which MACD output series to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdOutput {
    Line,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    output: MacdOutput,
    name: String,
}

impl Macd {
    pub fn line(fast: usize, slow: usize, signal: usize) -> Self {
        Self::build(fast, slow, signal, MacdOutput::Line)
    }

    pub fn signal(fast: usize, slow: usize, signal: usize) -> Self {
        Self::build(fast, slow, signal, MacdOutput::Signal)
    }

    pub fn histogram(fast: usize, slow: usize, signal: usize) -> Self {
        Self::build(fast, slow, signal, MacdOutput::Histogram)
    }

    fn build(fast: usize, slow: usize, signal: usize, output: MacdOutput) -> Self {
        assert!(fast >= 1 && slow >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be < slow period");
        let name = match output {
            MacdOutput::Line => format!("macd_{fast}_{slow}_{signal}"),
            MacdOutput::Signal => format!("macd_signal_{fast}_{slow}_{signal}"),
            MacdOutput::Histogram => format!("macd_hist_{fast}_{slow}_{signal}"),
        };
        Self {
            fast,
            slow,
            signal,
            output,
            name,
        }
    }

    fn line_series(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        fast.iter()
            .zip(slow.iter())
            .map(|(&f, &s)| f - s) // NaN - x = NaN, so warmup propagates
            .collect()
    }

    fn signal_series(&self, line: &[f64]) -> Vec<f64> {
        ema_over_valid_suffix(line, self.signal)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.output {
            MacdOutput::Line => self.slow - 1,
            MacdOutput::Signal | MacdOutput::Histogram => self.slow + self.signal - 2,
        }
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let line = self.line_series(bars);
        match self.output {
            MacdOutput::Line => line,
            MacdOutput::Signal => self.signal_series(&line),
            MacdOutput::Histogram => {
                let signal = self.signal_series(&line);
                line.iter().zip(signal.iter()).map(|(&l, &s)| l - s).collect()
            }
        }
    }
}

/// EMA of a series that starts with a NaN warmup prefix.
///
/// The seed SMA is taken over the first `period` values after the prefix;
/// NaN appearing later taints the remainder, matching `ema_of_series`.
fn ema_over_valid_suffix(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    let first_valid = match values.iter().position(|v| !v.is_nan()) {
        Some(i) => i,
        None => return result,
    };

    let suffix = ema_of_series(&values[first_valid..], period);
    for (i, v) in suffix.into_iter().enumerate() {
        result[first_valid + i] = v;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    fn trending_bars(n: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64 * 0.5).collect();
        make_bars(&closes)
    }

    #[test]
    fn macd_line_is_fast_minus_slow() {
        let bars = trending_bars(60);
        let line = Macd::line(12, 26, 9).compute(&bars);
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = ema_of_series(&closes, 12);
        let slow = ema_of_series(&closes, 26);

        for i in 25..60 {
            assert_approx(line[i], fast[i] - slow[i], DEFAULT_EPSILON);
        }
        assert!(line[24].is_nan());
    }

    #[test]
    fn macd_histogram_is_line_minus_signal() {
        let bars = trending_bars(80);
        let macd = Macd::line(12, 26, 9).compute(&bars);
        let signal = Macd::signal(12, 26, 9).compute(&bars);
        let hist = Macd::histogram(12, 26, 9).compute(&bars);

        for i in 0..80 {
            if hist[i].is_nan() {
                assert!(macd[i].is_nan() || signal[i].is_nan());
            } else {
                assert_approx(hist[i], macd[i] - signal[i], DEFAULT_EPSILON);
            }
        }
    }

    #[test]
    fn macd_signal_warmup() {
        // Signal needs slow-1 bars for the first line value plus signal-1 more
        let bars = trending_bars(80);
        let macd = Macd::signal(12, 26, 9);
        let result = macd.compute(&bars);

        let first_valid = macd.lookback(); // 26 + 9 - 2 = 33
        assert_eq!(first_valid, 33);
        for v in result.iter().take(first_valid) {
            assert!(v.is_nan());
        }
        assert!(!result[first_valid].is_nan());
    }

    #[test]
    fn macd_small_periods_known_values() {
        // fast=1 (EMA = close), slow=2, signal=1 (signal = line)
        let bars = make_bars(&[10.0, 12.0, 14.0, 16.0]);
        let line = Macd::line(1, 2, 1).compute(&bars);
        let signal = Macd::signal(1, 2, 1).compute(&bars);
        let hist = Macd::histogram(1, 2, 1).compute(&bars);

        assert!(line[0].is_nan());
        // slow EMA(2): seed at idx1 = 11, then alpha=2/3
        // slow[2] = (2/3)*14 + (1/3)*11 = 13.0; line[2] = 14 - 13 = 1.0
        assert_approx(line[1], 12.0 - 11.0, DEFAULT_EPSILON);
        assert_approx(line[2], 1.0, DEFAULT_EPSILON);
        // signal period 1 → equals line
        assert_approx(signal[2], line[2], DEFAULT_EPSILON);
        assert_approx(hist[2], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn macd_lookbacks() {
        assert_eq!(Macd::line(12, 26, 9).lookback(), 25);
        assert_eq!(Macd::signal(12, 26, 9).lookback(), 33);
        assert_eq!(Macd::histogram(12, 26, 9).lookback(), 33);
    }
}
