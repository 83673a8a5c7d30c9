//! Supervised training harness: chronological splits, weighted
//! cross-entropy, minibatch SGD/Adam, early stopping with best-epoch
//! restore.
//!
//! Splits are never shuffled across time — the train block precedes the
//! validation block precedes the test block. Only minibatch order within
//! the train block is shuffled, from a seeded RNG, so training is
//! reproducible given the seed.

use ndarray::{s, Array1, Array2, Axis, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::Signal;
use crate::error::{KtrdrError, Result};
use crate::features::{Scaler, ScalerKind};
use crate::model::mlp::{softmax, Architecture, Mlp};
use crate::observer::RunObserver;

/// Optimizer family and its hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Optimizer {
    Sgd { momentum: f64 },
    Adam { beta1: f64, beta2: f64, epsilon: f64 },
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// How to weight classes in the loss (HOLD usually dominates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClassWeights {
    None,
    Balanced,
    Explicit { weights: [f64; Signal::COUNT] },
}

impl Default for ClassWeights {
    fn default() -> Self {
        ClassWeights::Balanced
    }
}

impl ClassWeights {
    /// Resolve to concrete per-class weights from the training labels.
    pub fn resolve(&self, train_labels: &[Signal]) -> [f64; Signal::COUNT] {
        match self {
            ClassWeights::None => [1.0; Signal::COUNT],
            ClassWeights::Explicit { weights } => *weights,
            ClassWeights::Balanced => {
                let mut counts = [0usize; Signal::COUNT];
                for y in train_labels {
                    counts[y.class_index()] += 1;
                }
                let n = train_labels.len() as f64;
                let k = Signal::COUNT as f64;
                let mut weights = [1.0; Signal::COUNT];
                for (c, w) in weights.iter_mut().enumerate() {
                    if counts[c] > 0 {
                        *w = n / (k * counts[c] as f64);
                    }
                }
                weights
            }
        }
    }
}

/// Chronological train/validation/test split ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            validation: 0.15,
            test: 0.15,
        }
    }
}

impl SplitRatios {
    pub fn validate(&self) -> Result<()> {
        let parts = [self.train, self.validation, self.test];
        if parts.iter().any(|&p| !(0.0..=1.0).contains(&p) || p == 0.0) {
            return Err(KtrdrError::Config(format!(
                "split ratios must each be in (0, 1], got {self:?}"
            )));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(KtrdrError::Config(format!(
                "split ratios must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Training hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub max_epochs: usize,
    pub early_stopping_patience: usize,
    pub min_delta: f64,
    #[serde(default)]
    pub weight_decay: f64,
    #[serde(default)]
    pub optimizer: Optimizer,
    pub seed: u64,
    #[serde(default)]
    pub class_weights: ClassWeights,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            batch_size: 64,
            max_epochs: 200,
            early_stopping_patience: 20,
            min_delta: 1e-5,
            weight_decay: 0.0,
            optimizer: Optimizer::default(),
            seed: 42,
            class_weights: ClassWeights::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(KtrdrError::Config("learning_rate must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(KtrdrError::Config("batch_size must be >= 1".into()));
        }
        if self.max_epochs == 0 {
            return Err(KtrdrError::Config("max_epochs must be >= 1".into()));
        }
        Ok(())
    }
}

/// One epoch of the training history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Full per-epoch record of a training run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
    pub best_epoch: usize,
    pub stopped_early: bool,
}

/// Loss and accuracy of one split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Metrics across the three chronological splits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub train: EvalMetrics,
    pub validation: EvalMetrics,
    pub test: EvalMetrics,
}

/// A trained network with its scaler and bookkeeping.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub mlp: Mlp,
    pub scaler: Scaler,
    pub metrics: SplitMetrics,
    pub history: TrainingHistory,
    pub class_weights: [f64; Signal::COUNT],
    /// Row counts of the (train, validation, test) splits.
    pub split_sizes: (usize, usize, usize),
    /// Scaled validation split, kept for permutation importance.
    pub val_features: Array2<f64>,
    pub val_labels: Vec<Signal>,
}

/// Train a classifier on an assembled feature matrix and aligned labels.
///
/// `features` rows and `labels` must be 1:1. The scaler is fitted on the
/// train block only and applied to all three splits. Cancellation is
/// checked at every epoch boundary; a cancelled run returns `Cancelled`
/// and leaves nothing behind.
pub fn train(
    features: &Array2<f64>,
    labels: &[Signal],
    hidden_layers: &[usize],
    dropout: f64,
    scaler_kind: ScalerKind,
    split: &SplitRatios,
    config: &TrainingConfig,
    observer: &dyn RunObserver,
) -> Result<TrainedModel> {
    config.validate()?;
    split.validate()?;

    let n = features.nrows();
    if n != labels.len() {
        return Err(KtrdrError::Model(format!(
            "feature rows ({n}) and labels ({}) are misaligned",
            labels.len()
        )));
    }
    if features.iter().any(|v| !v.is_finite()) {
        return Err(KtrdrError::NumericalInstability { epoch: 0 });
    }

    // Chronological split: train block, then validation, then test.
    let n_train = (n as f64 * split.train).floor() as usize;
    let n_val = (n as f64 * split.validation).floor() as usize;
    let n_test = n - n_train - n_val;
    if n_train == 0 || n_val == 0 || n_test == 0 {
        let min_ratio = split.train.min(split.validation).min(split.test);
        return Err(KtrdrError::InsufficientData {
            required: (1.0 / min_ratio).ceil() as usize,
            available: n,
        });
    }

    let x_train_raw = features.slice(s![..n_train, ..]).to_owned();
    let x_val_raw = features.slice(s![n_train..n_train + n_val, ..]).to_owned();
    let x_test_raw = features.slice(s![n_train + n_val.., ..]).to_owned();
    let y_train = &labels[..n_train];
    let y_val = &labels[n_train..n_train + n_val];
    let y_test = &labels[n_train + n_val..];

    let mut scaler = Scaler::new(scaler_kind);
    scaler.fit(&x_train_raw);
    let x_train = scaler.transform(&x_train_raw)?;
    let x_val = scaler.transform(&x_val_raw)?;
    let x_test = scaler.transform(&x_test_raw)?;

    let class_weights = config.class_weights.resolve(y_train);

    let architecture = Architecture {
        input_dim: features.ncols(),
        hidden_layers: hidden_layers.to_vec(),
        dropout,
    };
    let mut mlp = Mlp::new(&architecture, config.seed)?;
    let mut opt_state = OptimizerState::new(&mlp, &config.optimizer);

    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let mut history = TrainingHistory::default();
    let mut best_val_loss = f64::INFINITY;
    let mut best_weights = mlp.clone();
    let mut best_epoch = 0usize;
    let mut patience_left = config.early_stopping_patience;

    observer.on_start("train", config.max_epochs);

    let mut indices: Vec<usize> = (0..n_train).collect();
    for epoch in 0..config.max_epochs {
        if observer.cancelled() {
            info!(epoch, "training cancelled");
            return Err(KtrdrError::Cancelled);
        }

        indices.shuffle(&mut rng);
        for batch in indices.chunks(config.batch_size) {
            let xb = select_rows(&x_train, batch);
            let yb: Vec<Signal> = batch.iter().map(|&i| y_train[i]).collect();
            train_step(&mut mlp, &mut opt_state, &xb, &yb, &class_weights, config, &mut rng);
        }

        let train_eval = evaluate(&mlp, &x_train, y_train, &class_weights);
        let val_eval = evaluate(&mlp, &x_val, y_val, &class_weights);

        if !train_eval.loss.is_finite() || !val_eval.loss.is_finite() {
            return Err(KtrdrError::NumericalInstability { epoch });
        }

        debug!(
            epoch,
            train_loss = train_eval.loss,
            val_loss = val_eval.loss,
            "epoch complete"
        );
        history.epochs.push(EpochRecord {
            epoch,
            train_loss: train_eval.loss,
            train_accuracy: train_eval.accuracy,
            val_loss: val_eval.loss,
            val_accuracy: val_eval.accuracy,
        });
        observer.on_progress(epoch + 1, config.max_epochs);

        // Early stopping on validation loss, restoring the best checkpoint.
        if val_eval.loss < best_val_loss - config.min_delta {
            best_val_loss = val_eval.loss;
            best_weights = mlp.clone();
            best_epoch = epoch;
            patience_left = config.early_stopping_patience;
        } else if config.early_stopping_patience > 0 {
            patience_left -= 1;
            if patience_left == 0 {
                history.stopped_early = true;
                break;
            }
        }
    }

    let mlp = best_weights;
    history.best_epoch = best_epoch;

    let metrics = SplitMetrics {
        train: evaluate(&mlp, &x_train, y_train, &class_weights),
        validation: evaluate(&mlp, &x_val, y_val, &class_weights),
        test: evaluate(&mlp, &x_test, y_test, &class_weights),
    };

    observer.on_finish(&format!(
        "trained {} epochs, val accuracy {:.3}",
        history.epochs.len(),
        metrics.validation.accuracy
    ));

    Ok(TrainedModel {
        mlp,
        scaler,
        metrics,
        history,
        class_weights,
        split_sizes: (n_train, n_val, n_test),
        val_features: x_val,
        val_labels: y_val.to_vec(),
    })
}

/// Weighted cross-entropy loss and plain accuracy over a split.
pub fn evaluate(
    mlp: &Mlp,
    x: &Array2<f64>,
    y: &[Signal],
    class_weights: &[f64; Signal::COUNT],
) -> EvalMetrics {
    if y.is_empty() {
        return EvalMetrics {
            loss: 0.0,
            accuracy: 0.0,
        };
    }
    let probs = mlp.predict_proba(x);
    let mut loss = 0.0;
    let mut weight_sum = 0.0;
    let mut correct = 0usize;

    for (i, label) in y.iter().enumerate() {
        let target = label.class_index();
        let w = class_weights[target];
        let p = probs[[i, target]].max(1e-15);
        loss -= w * p.ln();
        weight_sum += w;

        let row = probs.row(i);
        let mut best = 0usize;
        for (j, &pj) in row.iter().enumerate() {
            if pj > row[best] {
                best = j;
            }
        }
        if best == target {
            correct += 1;
        }
    }

    EvalMetrics {
        loss: loss / weight_sum,
        accuracy: correct as f64 / y.len() as f64,
    }
}

// ── Optimizer internals ─────────────────────────────────────────────

/// Per-parameter optimizer accumulators (momentum, or Adam moments).
struct OptimizerState {
    kind: Optimizer,
    /// First accumulator (velocity for SGD, first moment for Adam).
    m_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    /// Second moment (Adam only).
    v_w: Vec<Array2<f64>>,
    v_b: Vec<Array1<f64>>,
    step: u64,
}

impl OptimizerState {
    fn new(mlp: &Mlp, kind: &Optimizer) -> Self {
        let m_w = mlp
            .layers
            .iter()
            .map(|l| Array2::zeros(l.weights.dim()))
            .collect();
        let m_b = mlp
            .layers
            .iter()
            .map(|l| Array1::zeros(l.biases.len()))
            .collect();
        let v_w = mlp
            .layers
            .iter()
            .map(|l| Array2::zeros(l.weights.dim()))
            .collect();
        let v_b = mlp
            .layers
            .iter()
            .map(|l| Array1::zeros(l.biases.len()))
            .collect();
        Self {
            kind: kind.clone(),
            m_w,
            m_b,
            v_w,
            v_b,
            step: 0,
        }
    }
}

/// One minibatch step: forward with dropout, backprop, parameter update.
fn train_step(
    mlp: &mut Mlp,
    opt: &mut OptimizerState,
    xb: &Array2<f64>,
    yb: &[Signal],
    class_weights: &[f64; Signal::COUNT],
    config: &TrainingConfig,
    rng: &mut StdRng,
) {
    let activations = mlp.forward_train(xb, rng);
    let logits = activations.last().expect("forward produces activations");
    let probs = softmax(logits);

    // dL/dlogits for weighted cross-entropy, normalized by batch weight.
    let mut delta = probs;
    let weight_sum: f64 = yb.iter().map(|y| class_weights[y.class_index()]).sum();
    for (i, label) in yb.iter().enumerate() {
        let target = label.class_index();
        delta[[i, target]] -= 1.0;
        let scale = class_weights[target] / weight_sum;
        for j in 0..Signal::COUNT {
            delta[[i, j]] *= scale;
        }
    }

    let n_layers = mlp.layers.len();
    let keep = 1.0 - mlp.dropout;

    opt.step += 1;
    for l in (0..n_layers).rev() {
        let grad_w = activations[l].t().dot(&delta) + &(&mlp.layers[l].weights * config.weight_decay);
        let grad_b = delta.sum_axis(Axis(0));

        if l > 0 {
            // Backprop through ReLU + inverted dropout. The stored
            // activation is zero exactly where the gradient must vanish
            // (dropped units and inactive ReLUs); surviving units carry
            // the 1/keep rescale from the forward pass.
            let mut prev = delta.dot(&mlp.layers[l].weights.t());
            Zip::from(&mut prev)
                .and(&activations[l])
                .for_each(|d, &a| {
                    *d = if a > 0.0 { *d / keep } else { 0.0 };
                });
            apply_update(mlp, opt, l, &grad_w, &grad_b, config);
            delta = prev;
        } else {
            apply_update(mlp, opt, l, &grad_w, &grad_b, config);
        }
    }
}

fn apply_update(
    mlp: &mut Mlp,
    opt: &mut OptimizerState,
    l: usize,
    grad_w: &Array2<f64>,
    grad_b: &Array1<f64>,
    config: &TrainingConfig,
) {
    let lr = config.learning_rate;
    match opt.kind {
        Optimizer::Sgd { momentum } => {
            Zip::from(&mut opt.m_w[l]).and(grad_w).for_each(|m, &g| {
                *m = momentum * *m - lr * g;
            });
            Zip::from(&mut mlp.layers[l].weights)
                .and(&opt.m_w[l])
                .for_each(|w, &m| *w += m);
            Zip::from(&mut opt.m_b[l]).and(grad_b).for_each(|m, &g| {
                *m = momentum * *m - lr * g;
            });
            Zip::from(&mut mlp.layers[l].biases)
                .and(&opt.m_b[l])
                .for_each(|b, &m| *b += m);
        }
        Optimizer::Adam {
            beta1,
            beta2,
            epsilon,
        } => {
            let t = opt.step as f64;
            let bias1 = 1.0 - beta1.powf(t);
            let bias2 = 1.0 - beta2.powf(t);

            Zip::from(&mut opt.m_w[l]).and(grad_w).for_each(|m, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
            });
            Zip::from(&mut opt.v_w[l]).and(grad_w).for_each(|v, &g| {
                *v = beta2 * *v + (1.0 - beta2) * g * g;
            });
            Zip::from(&mut mlp.layers[l].weights)
                .and(&opt.m_w[l])
                .and(&opt.v_w[l])
                .for_each(|w, &m, &v| {
                    *w -= lr * (m / bias1) / ((v / bias2).sqrt() + epsilon);
                });

            Zip::from(&mut opt.m_b[l]).and(grad_b).for_each(|m, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
            });
            Zip::from(&mut opt.v_b[l]).and(grad_b).for_each(|v, &g| {
                *v = beta2 * *v + (1.0 - beta2) * g * g;
            });
            Zip::from(&mut mlp.layers[l].biases)
                .and(&opt.m_b[l])
                .and(&opt.v_b[l])
                .for_each(|b, &m, &v| {
                    *b -= lr * (m / bias1) / ((v / bias2).sqrt() + epsilon);
                });
        }
    }
}

/// Gather a row subset into a new matrix.
fn select_rows(x: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    let mut out = Array2::zeros((rows.len(), x.ncols()));
    for (r, &i) in rows.iter().enumerate() {
        out.row_mut(r).assign(&x.row(i));
    }
    out
}
