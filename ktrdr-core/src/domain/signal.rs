//! Signal and Decision — the discrete trading verdicts of the pipeline.
//!
//! `Signal` doubles as the supervised label (ZigZag labeler) and as the
//! inference output class. The class indices are frozen: BUY=0, HOLD=1,
//! SELL=2 — they index the softmax head of the classifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete trading decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Hold,
    Sell,
}

impl Signal {
    /// Index of this class in the model's output layer.
    pub fn class_index(&self) -> usize {
        match self {
            Signal::Buy => 0,
            Signal::Hold => 1,
            Signal::Sell => 2,
        }
    }

    pub fn from_class_index(index: usize) -> Option<Signal> {
        match index {
            0 => Some(Signal::Buy),
            1 => Some(Signal::Hold),
            2 => Some(Signal::Sell),
            _ => None,
        }
    }

    /// Number of output classes.
    pub const COUNT: usize = 3;
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Buy => "BUY",
            Signal::Hold => "HOLD",
            Signal::Sell => "SELL",
        };
        f.write_str(s)
    }
}

/// Inference output: a signal plus the maximum softmax probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub signal: Signal,
    /// Maximum softmax probability over the three classes, in [0, 1].
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_indices_are_frozen() {
        assert_eq!(Signal::Buy.class_index(), 0);
        assert_eq!(Signal::Hold.class_index(), 1);
        assert_eq!(Signal::Sell.class_index(), 2);
    }

    #[test]
    fn from_class_index_roundtrip() {
        for s in [Signal::Buy, Signal::Hold, Signal::Sell] {
            assert_eq!(Signal::from_class_index(s.class_index()), Some(s));
        }
        assert_eq!(Signal::from_class_index(3), None);
    }

    #[test]
    fn display_is_uppercase() {
        assert_eq!(Signal::Buy.to_string(), "BUY");
        assert_eq!(Signal::Hold.to_string(), "HOLD");
        assert_eq!(Signal::Sell.to_string(), "SELL");
    }
}
