//! Feed-forward classifier: dense layers, ReLU hidden activations, a
//! three-way softmax head.
//!
//! Weights are Kaiming-uniform initialized from a seeded RNG so that a
//! fixed seed reproduces the same network bit-for-bit.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::domain::{Decision, Signal};
use crate::error::{KtrdrError, Result};

/// Network shape and regularization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    pub input_dim: usize,
    pub hidden_layers: Vec<usize>,
    /// Dropout probability applied between hidden layers during training.
    #[serde(default)]
    pub dropout: f64,
}

impl Architecture {
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 {
            return Err(KtrdrError::Config("model input_dim must be >= 1".into()));
        }
        if self.hidden_layers.iter().any(|&h| h == 0) {
            return Err(KtrdrError::Config(
                "model hidden layer widths must be >= 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(KtrdrError::Config(format!(
                "model dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    /// Layer dimensions input → hidden... → output.
    fn dims(&self) -> Vec<usize> {
        let mut dims = vec![self.input_dim];
        dims.extend(&self.hidden_layers);
        dims.push(Signal::COUNT);
        dims
    }
}

/// One fully connected layer: `out = in · weights + biases`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub weights: Array2<f64>,
    pub biases: Array1<f64>,
}

/// The classifier network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    pub(crate) layers: Vec<Dense>,
    pub(crate) dropout: f64,
}

impl Mlp {
    /// Build a network with Kaiming-uniform weights and zero biases.
    pub fn new(architecture: &Architecture, seed: u64) -> Result<Self> {
        architecture.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let dims = architecture.dims();
        let mut layers = Vec::with_capacity(dims.len() - 1);

        for w in dims.windows(2) {
            let (fan_in, fan_out) = (w[0], w[1]);
            let limit = (6.0 / fan_in as f64).sqrt();
            let weights =
                Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit));
            layers.push(Dense {
                weights,
                biases: Array1::zeros(fan_out),
            });
        }

        Ok(Self {
            layers,
            dropout: architecture.dropout,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map(|l| l.weights.nrows()).unwrap_or(0)
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Forward pass without dropout: raw logits, one row per sample.
    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut a = x.clone();
        let last = self.layers.len() - 1;
        for (l, layer) in self.layers.iter().enumerate() {
            let mut z = a.dot(&layer.weights);
            z += &layer.biases;
            if l < last {
                z.mapv_inplace(|v| v.max(0.0));
            }
            a = z;
        }
        a
    }

    /// Forward pass with inverted dropout, keeping per-layer activations
    /// for backpropagation. `activations[0]` is the input; the final entry
    /// holds raw logits.
    pub(crate) fn forward_train(&self, x: &Array2<f64>, rng: &mut StdRng) -> Vec<Array2<f64>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(x.clone());
        let last = self.layers.len() - 1;
        let keep = 1.0 - self.dropout;

        for (l, layer) in self.layers.iter().enumerate() {
            let mut z = activations[l].dot(&layer.weights);
            z += &layer.biases;
            if l < last {
                z.mapv_inplace(|v| v.max(0.0));
                if self.dropout > 0.0 {
                    z.mapv_inplace(|v| {
                        if rng.gen::<f64>() < keep {
                            v / keep
                        } else {
                            0.0
                        }
                    });
                }
            }
            activations.push(z);
        }
        activations
    }

    /// Softmax class probabilities, one row per sample.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        softmax(&self.forward(x))
    }

    /// Predicted class index per sample (ties fall to the lowest index;
    /// `predict_one` applies the HOLD tie-break for decisions).
    pub fn predict_classes(&self, x: &Array2<f64>) -> Vec<usize> {
        let probs = self.predict_proba(x);
        probs
            .axis_iter(Axis(0))
            .map(|row| {
                let mut best = 0usize;
                for (j, &p) in row.iter().enumerate() {
                    if p > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect()
    }

    /// Batch inference over scaled feature rows.
    ///
    /// The confidence is the maximum softmax probability; an exact tie for
    /// the top probability resolves to HOLD.
    pub fn predict_decisions(&self, x: &Array2<f64>) -> Vec<Decision> {
        let probs = self.predict_proba(x);
        probs
            .axis_iter(Axis(0))
            .map(|row| {
                let max_p = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let mut winner = None;
                let mut tied = false;
                for (j, &p) in row.iter().enumerate() {
                    if p == max_p {
                        if winner.is_some() {
                            tied = true;
                        } else {
                            winner = Some(j);
                        }
                    }
                }
                let signal = if tied {
                    Signal::Hold
                } else {
                    winner
                        .and_then(Signal::from_class_index)
                        .unwrap_or(Signal::Hold)
                };
                Decision {
                    signal,
                    confidence: max_p,
                }
            })
            .collect()
    }

    /// Inference for one feature vector (already scaled).
    pub fn predict_one(&self, features: &[f64]) -> Result<Decision> {
        if features.len() != self.input_dim() {
            return Err(KtrdrError::FeatureSchemaMismatch {
                expected: self.input_dim(),
                actual: features.len(),
            });
        }
        let x = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| KtrdrError::Model(format!("input shape: {e}")))?;
        Ok(self.predict_decisions(&x).remove(0))
    }
}

/// Row-wise numerically stable softmax.
pub fn softmax(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f64 = row.iter().sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}
