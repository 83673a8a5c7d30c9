//! Decision engine — the inference path: indicators → fuzzy → features →
//! classifier → `(signal, confidence)`.
//!
//! Decisions for a series are precomputed in one pass. Because indicators
//! are causal (stable under extension), reading the precomputed row for
//! bar t is identical to recomputing on `bars[0..=t]` — nothing peeks past
//! t. Supervised labels never enter this path.

use tracing::debug;

use crate::domain::{Bar, Decision};
use crate::error::{KtrdrError, Result};
use crate::features::{FeatureAssembler, FeatureSpec};
use crate::fuzzy::FuzzyEngine;
use crate::indicators::Indicator;
use crate::model::ModelArtifact;

/// The composed inference pipeline for one strategy artifact.
#[derive(Debug)]
pub struct DecisionEngine {
    indicators: Vec<Box<dyn Indicator>>,
    fuzzy: FuzzyEngine,
    feature_spec: FeatureSpec,
    artifact: ModelArtifact,
}

impl DecisionEngine {
    /// Compose and verify: the feature columns the config reconstructs must
    /// match the artifact's frozen schema, width and order both.
    pub fn new(
        indicators: Vec<Box<dyn Indicator>>,
        fuzzy: FuzzyEngine,
        feature_spec: FeatureSpec,
        artifact: ModelArtifact,
    ) -> Result<Self> {
        let assembler = FeatureAssembler::new(&indicators, &fuzzy, &feature_spec)?;
        let names = assembler.feature_names();
        if names.len() != artifact.feature_names.len() {
            return Err(KtrdrError::FeatureSchemaMismatch {
                expected: artifact.feature_names.len(),
                actual: names.len(),
            });
        }
        if names != artifact.feature_names {
            return Err(KtrdrError::Model(format!(
                "feature schema order mismatch: config produces {names:?}, artifact expects {:?}",
                artifact.feature_names
            )));
        }
        Ok(Self {
            indicators,
            fuzzy,
            feature_spec,
            artifact,
        })
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Minimum bars needed before the first decision can be produced.
    pub fn min_bars_required(&self) -> Result<usize> {
        let assembler =
            FeatureAssembler::new(&self.indicators, &self.fuzzy, &self.feature_spec)?;
        Ok(assembler.min_bars_required())
    }

    /// Precompute the decision for every bar of the series.
    ///
    /// Bars inside the warmup union have no features and yield `None`
    /// ("flat, no decision").
    pub fn decide_series(&self, bars: &[Bar]) -> Result<Vec<Option<Decision>>> {
        let assembler =
            FeatureAssembler::new(&self.indicators, &self.fuzzy, &self.feature_spec)?;
        let matrix = assembler.assemble(bars)?;

        let scaled = self.artifact.scaler.transform(&matrix.values)?;
        let decisions = self.artifact.mlp.predict_decisions(&scaled);

        let mut out = vec![None; bars.len()];
        for (row, decision) in decisions.into_iter().enumerate() {
            out[matrix.bar_indices[row]] = Some(decision);
        }
        debug!(
            bars = bars.len(),
            decided = matrix.bar_indices.len(),
            "decision series computed"
        );
        Ok(out)
    }

    /// Decision for the final bar of the series.
    pub fn decide_latest(&self, bars: &[Bar]) -> Result<Decision> {
        let decisions = self.decide_series(bars)?;
        decisions
            .last()
            .cloned()
            .flatten()
            .ok_or_else(|| KtrdrError::InsufficientData {
                required: self.min_bars_required().unwrap_or(0),
                available: bars.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;
    use crate::features::{Scaler, ScalerKind};
    use crate::fuzzy::{default_rsi_sets, FuzzyGroup};
    use crate::indicators::{build_all, make_bars, IndicatorSpec};
    use crate::model::mlp::Architecture;
    use crate::model::trainer::{EvalMetrics, SplitMetrics, TrainingHistory};
    use crate::model::Mlp;
    use chrono::Utc;
    use ndarray::Array2;
    use std::collections::BTreeMap;

    fn fixture() -> (Vec<Box<dyn Indicator>>, FuzzyEngine, FeatureSpec, ModelArtifact) {
        let indicators =
            build_all(&[IndicatorSpec::new("rsi").with_param("period", 14.0)]).unwrap();
        let fuzzy = FuzzyEngine::new(vec![FuzzyGroup {
            indicator: "rsi_14".into(),
            sets: default_rsi_sets(),
        }])
        .unwrap();
        let feature_spec = FeatureSpec::default();

        let architecture = Architecture {
            input_dim: 3,
            hidden_layers: vec![4],
            dropout: 0.0,
        };
        let mlp = Mlp::new(&architecture, 5).unwrap();
        let mut scaler = Scaler::new(ScalerKind::ZScore);
        scaler.fit(&Array2::from_shape_vec((2, 3), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap());
        let eval = EvalMetrics {
            loss: 1.0,
            accuracy: 0.5,
        };
        let artifact = ModelArtifact {
            version: 1,
            strategy: "test".into(),
            symbol: "TEST".into(),
            timeframe: Timeframe::H1,
            created_at: Utc::now(),
            architecture,
            mlp,
            feature_names: vec![
                "rsi_14_low".into(),
                "rsi_14_neutral".into(),
                "rsi_14_high".into(),
            ],
            scaler,
            config_snapshot: "snapshot".into(),
            metrics: SplitMetrics {
                train: eval,
                validation: eval,
                test: eval,
            },
            importance: BTreeMap::new(),
            history: TrainingHistory::default(),
        };
        (indicators, fuzzy, feature_spec, artifact)
    }

    fn wavy_bars(n: usize) -> Vec<crate::domain::Bar> {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + 8.0 * ((i as f64) * 0.31).sin())
            .collect();
        make_bars(&closes)
    }

    #[test]
    fn warmup_bars_have_no_decision() {
        let (indicators, fuzzy, spec, artifact) = fixture();
        let engine = DecisionEngine::new(indicators, fuzzy, spec, artifact).unwrap();
        let decisions = engine.decide_series(&wavy_bars(40)).unwrap();

        for d in decisions.iter().take(14) {
            assert!(d.is_none());
        }
        for d in decisions.iter().skip(14) {
            let d = d.expect("post-warmup bars must have decisions");
            assert!((0.0..=1.0).contains(&d.confidence));
        }
    }

    #[test]
    fn series_decisions_are_stable_under_extension() {
        let (indicators, fuzzy, spec, artifact) = fixture();
        let engine = DecisionEngine::new(indicators, fuzzy, spec, artifact).unwrap();
        let bars = wavy_bars(60);

        let full = engine.decide_series(&bars).unwrap();
        let truncated = engine.decide_series(&bars[..45]).unwrap();
        for t in 0..45 {
            assert_eq!(full[t], truncated[t], "decision differs at bar {t}");
        }
    }

    #[test]
    fn decide_latest_matches_series_tail() {
        let (indicators, fuzzy, spec, artifact) = fixture();
        let engine = DecisionEngine::new(indicators, fuzzy, spec, artifact).unwrap();
        let bars = wavy_bars(50);

        let series = engine.decide_series(&bars).unwrap();
        let latest = engine.decide_latest(&bars).unwrap();
        assert_eq!(series.last().unwrap().unwrap(), latest);
    }

    #[test]
    fn schema_width_mismatch_rejected_at_composition() {
        let (indicators, fuzzy, spec, mut artifact) = fixture();
        artifact.feature_names.push("extra".into());
        let err = DecisionEngine::new(indicators, fuzzy, spec, artifact).unwrap_err();
        match err {
            KtrdrError::FeatureSchemaMismatch { expected, actual } => {
                assert_eq!((expected, actual), (4, 3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn schema_order_mismatch_rejected_at_composition() {
        let (indicators, fuzzy, spec, mut artifact) = fixture();
        artifact.feature_names.swap(0, 2);
        let err = DecisionEngine::new(indicators, fuzzy, spec, artifact).unwrap_err();
        assert_eq!(err.code(), "MODEL");
    }

    #[test]
    fn too_short_series_is_insufficient_data() {
        let (indicators, fuzzy, spec, artifact) = fixture();
        let engine = DecisionEngine::new(indicators, fuzzy, spec, artifact).unwrap();
        let err = engine.decide_latest(&wavy_bars(5)).unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_DATA");
    }
}
