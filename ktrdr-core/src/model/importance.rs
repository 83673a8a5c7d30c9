//! Post-hoc permutation importance over the validation split.
//!
//! For each feature column: shuffle it (seeded, column-independent),
//! re-evaluate validation accuracy, and report the drop. Columns run in
//! parallel; per-column seeds are derived by hashing so the result is
//! independent of scheduling order.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;

use crate::domain::Signal;
use crate::model::mlp::Mlp;

/// `feature name → accuracy drop` when that column is shuffled.
pub fn permutation_importance(
    mlp: &Mlp,
    x_val: &Array2<f64>,
    y_val: &[Signal],
    feature_names: &[String],
    seed: u64,
) -> BTreeMap<String, f64> {
    let base_accuracy = accuracy(mlp, x_val, y_val);

    let drops: Vec<(String, f64)> = (0..x_val.ncols())
        .into_par_iter()
        .map(|col| {
            let mut shuffled = x_val.clone();
            let mut values: Vec<f64> = shuffled.column(col).to_vec();
            let mut rng = StdRng::seed_from_u64(column_seed(seed, col));
            values.shuffle(&mut rng);
            for (row, v) in values.into_iter().enumerate() {
                shuffled[[row, col]] = v;
            }
            let acc = accuracy(mlp, &shuffled, y_val);
            let name = feature_names
                .get(col)
                .cloned()
                .unwrap_or_else(|| format!("feature_{col}"));
            (name, base_accuracy - acc)
        })
        .collect();

    drops.into_iter().collect()
}

/// Deterministic per-column sub-seed, independent of iteration order.
fn column_seed(master: u64, column: usize) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&master.to_le_bytes());
    hasher.update(&(column as u64).to_le_bytes());
    let hash = hasher.finalize();
    u64::from_le_bytes(hash.as_bytes()[..8].try_into().expect("8 bytes"))
}

fn accuracy(mlp: &Mlp, x: &Array2<f64>, y: &[Signal]) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let classes = mlp.predict_classes(x);
    let correct = classes
        .iter()
        .zip(y.iter())
        .filter(|(&c, label)| c == label.class_index())
        .count();
    correct as f64 / y.len() as f64
}
