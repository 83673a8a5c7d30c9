//! Per-feature scaling, fitted on the training split and persisted with the
//! model artifact.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{KtrdrError, Result};

/// Scaling family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    ZScore,
    MinMax,
}

/// Fitted per-column statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScalerState {
    ZScore { mean: Vec<f64>, std: Vec<f64> },
    MinMax { min: Vec<f64>, max: Vec<f64> },
}

/// A feature scaler. Unfitted until `fit` is called; transforming with an
/// unfitted scaler (a corrupt artifact) is `ScalerNotFit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    kind: ScalerKind,
    state: Option<ScalerState>,
}

impl Scaler {
    pub fn new(kind: ScalerKind) -> Self {
        Self { kind, state: None }
    }

    pub fn is_fit(&self) -> bool {
        self.state.is_some()
    }

    pub fn width(&self) -> Option<usize> {
        match &self.state {
            Some(ScalerState::ZScore { mean, .. }) => Some(mean.len()),
            Some(ScalerState::MinMax { min, .. }) => Some(min.len()),
            None => None,
        }
    }

    /// Fit column statistics. Constant columns scale by 1.0 instead of 0.
    pub fn fit(&mut self, x: &Array2<f64>) {
        let state = match self.kind {
            ScalerKind::ZScore => {
                let n = x.nrows().max(1) as f64;
                let mean: Vec<f64> = x.mean_axis(Axis(0)).map(|m| m.to_vec()).unwrap_or_default();
                let std: Vec<f64> = x
                    .axis_iter(Axis(1))
                    .enumerate()
                    .map(|(j, col)| {
                        let var = col.iter().map(|v| (v - mean[j]).powi(2)).sum::<f64>() / n;
                        let s = var.sqrt();
                        if s < 1e-12 {
                            1.0
                        } else {
                            s
                        }
                    })
                    .collect();
                ScalerState::ZScore { mean, std }
            }
            ScalerKind::MinMax => {
                let min: Vec<f64> = x
                    .axis_iter(Axis(1))
                    .map(|col| col.iter().cloned().fold(f64::INFINITY, f64::min))
                    .collect();
                let max: Vec<f64> = x
                    .axis_iter(Axis(1))
                    .map(|col| col.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
                    .collect();
                ScalerState::MinMax { min, max }
            }
        };
        self.state = Some(state);
    }

    /// Transform a matrix. Column count must match the fitted width.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let state = self.state.as_ref().ok_or(KtrdrError::ScalerNotFit)?;
        let expected = self.width().unwrap_or(0);
        if x.ncols() != expected {
            return Err(KtrdrError::FeatureSchemaMismatch {
                expected,
                actual: x.ncols(),
            });
        }
        let mut out = x.clone();
        match state {
            ScalerState::ZScore { mean, std } => {
                for mut row in out.axis_iter_mut(Axis(0)) {
                    for (j, v) in row.iter_mut().enumerate() {
                        *v = (*v - mean[j]) / std[j];
                    }
                }
            }
            ScalerState::MinMax { min, max } => {
                for mut row in out.axis_iter_mut(Axis(0)) {
                    for (j, v) in row.iter_mut().enumerate() {
                        let range = max[j] - min[j];
                        *v = if range < 1e-12 {
                            0.0
                        } else {
                            (*v - min[j]) / range
                        };
                    }
                }
            }
        }
        Ok(out)
    }

    /// Transform a single feature vector.
    pub fn transform_vec(&self, x: &[f64]) -> Result<Vec<f64>> {
        let state = self.state.as_ref().ok_or(KtrdrError::ScalerNotFit)?;
        let expected = self.width().unwrap_or(0);
        if x.len() != expected {
            return Err(KtrdrError::FeatureSchemaMismatch {
                expected,
                actual: x.len(),
            });
        }
        Ok(match state {
            ScalerState::ZScore { mean, std } => x
                .iter()
                .enumerate()
                .map(|(j, v)| (v - mean[j]) / std[j])
                .collect(),
            ScalerState::MinMax { min, max } => x
                .iter()
                .enumerate()
                .map(|(j, v)| {
                    let range = max[j] - min[j];
                    if range < 1e-12 {
                        0.0
                    } else {
                        (v - min[j]) / range
                    }
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn zscore_standardizes_columns() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let mut scaler = Scaler::new(ScalerKind::ZScore);
        scaler.fit(&x);
        let t = scaler.transform(&x).unwrap();

        for j in 0..2 {
            let col: Vec<f64> = t.column(j).to_vec();
            let mean: f64 = col.iter().sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-12);
            assert!(col[0] < 0.0 && col[2] > 0.0);
        }
    }

    #[test]
    fn minmax_maps_to_unit_interval() {
        let x = array![[5.0], [10.0], [15.0]];
        let mut scaler = Scaler::new(ScalerKind::MinMax);
        scaler.fit(&x);
        let t = scaler.transform(&x).unwrap();
        assert_eq!(t[[0, 0]], 0.0);
        assert_eq!(t[[1, 0]], 0.5);
        assert_eq!(t[[2, 0]], 1.0);
    }

    #[test]
    fn constant_column_does_not_blow_up() {
        let x = array![[7.0], [7.0], [7.0]];
        for kind in [ScalerKind::ZScore, ScalerKind::MinMax] {
            let mut scaler = Scaler::new(kind);
            scaler.fit(&x);
            let t = scaler.transform(&x).unwrap();
            assert!(t.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn unfit_transform_is_error() {
        let scaler = Scaler::new(ScalerKind::ZScore);
        let err = scaler.transform_vec(&[1.0, 2.0]).unwrap_err();
        assert_eq!(err.code(), "SCALER_NOT_FIT");
    }

    #[test]
    fn width_mismatch_is_schema_error() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let mut scaler = Scaler::new(ScalerKind::ZScore);
        scaler.fit(&x);
        let err = scaler.transform_vec(&[1.0, 2.0, 3.0]).unwrap_err();
        match err {
            KtrdrError::FeatureSchemaMismatch { expected, actual } => {
                assert_eq!((expected, actual), (2, 3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn serde_roundtrip_preserves_state() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let mut scaler = Scaler::new(ScalerKind::ZScore);
        scaler.fit(&x);
        let json = serde_json::to_string(&scaler).unwrap();
        let back: Scaler = serde_json::from_str(&json).unwrap();
        assert_eq!(scaler, back);
        assert_eq!(
            scaler.transform_vec(&[1.0, 2.0]).unwrap(),
            back.transform_vec(&[1.0, 2.0]).unwrap()
        );
    }
}
