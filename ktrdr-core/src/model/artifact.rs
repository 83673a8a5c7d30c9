//! Versioned model artifacts — the immutable persistence unit of a
//! training run.
//!
//! Layout: `{root}/{strategy}/{symbol}_{timeframe}_v{N}/` holding
//! `model.json` (network, feature schema, scaler, config snapshot),
//! `metadata.json` (metrics, training history), and `importance.json`
//! (feature-importance estimates). A new version directory is
//! materialized under a temporary name and renamed into place; the
//! `{symbol}_{timeframe}_latest.json` pointer is rewritten last, also via
//! tmp + rename. Readers see a fully written version or none.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::{Decision, Timeframe};
use crate::error::{KtrdrError, Result};
use crate::features::Scaler;
use crate::model::mlp::{Architecture, Mlp};
use crate::model::trainer::{SplitMetrics, TrainingHistory};

/// Everything needed to reproduce inference, plus training bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub strategy: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub created_at: DateTime<Utc>,

    pub architecture: Architecture,
    pub mlp: Mlp,
    /// Feature columns in the exact order the network expects.
    pub feature_names: Vec<String>,
    pub scaler: Scaler,
    /// blake3 hex of the indicator + fuzzy + model config sections.
    pub config_snapshot: String,

    pub metrics: SplitMetrics,
    pub importance: BTreeMap<String, f64>,
    pub history: TrainingHistory,
}

impl ModelArtifact {
    /// Scale and classify one raw feature vector.
    ///
    /// The vector must match the persisted feature schema exactly.
    pub fn predict(&self, features: &[f64]) -> Result<Decision> {
        if features.len() != self.feature_names.len() {
            return Err(KtrdrError::FeatureSchemaMismatch {
                expected: self.feature_names.len(),
                actual: features.len(),
            });
        }
        let scaled = self.scaler.transform_vec(features)?;
        self.mlp.predict_one(&scaled)
    }

    /// Internal consistency checks applied on save and load.
    fn validate(&self) -> Result<()> {
        if self.mlp.input_dim() != self.feature_names.len() {
            return Err(KtrdrError::Model(format!(
                "artifact corrupt: network input {} != feature schema {}",
                self.mlp.input_dim(),
                self.feature_names.len()
            )));
        }
        if !self.scaler.is_fit() {
            return Err(KtrdrError::ScalerNotFit);
        }
        Ok(())
    }
}

/// The on-disk split of an artifact: `model.json`.
#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    version: u32,
    strategy: String,
    symbol: String,
    timeframe: Timeframe,
    created_at: DateTime<Utc>,
    architecture: Architecture,
    mlp: Mlp,
    feature_names: Vec<String>,
    scaler: Scaler,
    config_snapshot: String,
}

/// The on-disk split of an artifact: `metadata.json`.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile {
    metrics: SplitMetrics,
    history: TrainingHistory,
}

/// Pointer file contents for the logical "latest" version.
#[derive(Debug, Serialize, Deserialize)]
struct LatestPointer {
    version: u32,
}

/// Filesystem store of versioned artifacts.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn strategy_dir(&self, strategy: &str) -> PathBuf {
        self.root.join(strategy)
    }

    fn slug(symbol: &str, timeframe: Timeframe) -> String {
        format!("{symbol}_{timeframe}")
    }

    fn version_dir(&self, strategy: &str, symbol: &str, tf: Timeframe, version: u32) -> PathBuf {
        self.strategy_dir(strategy)
            .join(format!("{}_v{version}", Self::slug(symbol, tf)))
    }

    fn latest_path(&self, strategy: &str, symbol: &str, tf: Timeframe) -> PathBuf {
        self.strategy_dir(strategy)
            .join(format!("{}_latest.json", Self::slug(symbol, tf)))
    }

    /// Versions present on disk, ascending.
    pub fn list_versions(&self, strategy: &str, symbol: &str, tf: Timeframe) -> Vec<u32> {
        let prefix = format!("{}_v", Self::slug(symbol, tf));
        let mut versions = Vec::new();
        if let Ok(entries) = fs::read_dir(self.strategy_dir(strategy)) {
            for entry in entries.flatten() {
                if !entry.path().is_dir() {
                    continue;
                }
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(rest) = name.strip_prefix(&prefix) {
                    if let Ok(v) = rest.parse::<u32>() {
                        versions.push(v);
                    }
                }
            }
        }
        versions.sort_unstable();
        versions
    }

    /// The version the "latest" pointer names, if any.
    pub fn latest_version(&self, strategy: &str, symbol: &str, tf: Timeframe) -> Result<Option<u32>> {
        let path = self.latest_path(strategy, symbol, tf);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let pointer: LatestPointer = serde_json::from_str(&content)
            .map_err(|e| KtrdrError::Model(format!("corrupt latest pointer: {e}")))?;
        Ok(Some(pointer.version))
    }

    /// Persist a new artifact version atomically and advance the pointer.
    ///
    /// The caller passes the artifact with `version = 0`; the store assigns
    /// the next version number and returns it.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<u32> {
        artifact.validate()?;
        let strategy_dir = self.strategy_dir(&artifact.strategy);
        fs::create_dir_all(&strategy_dir)?;

        let next = self
            .list_versions(&artifact.strategy, &artifact.symbol, artifact.timeframe)
            .last()
            .copied()
            .unwrap_or(0)
            + 1;

        let final_dir =
            self.version_dir(&artifact.strategy, &artifact.symbol, artifact.timeframe, next);
        let tmp_dir = strategy_dir.join(format!(
            ".tmp_{}_v{next}",
            Self::slug(&artifact.symbol, artifact.timeframe)
        ));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        let model_file = ModelFile {
            version: next,
            strategy: artifact.strategy.clone(),
            symbol: artifact.symbol.clone(),
            timeframe: artifact.timeframe,
            created_at: artifact.created_at,
            architecture: artifact.architecture.clone(),
            mlp: artifact.mlp.clone(),
            feature_names: artifact.feature_names.clone(),
            scaler: artifact.scaler.clone(),
            config_snapshot: artifact.config_snapshot.clone(),
        };
        let metadata_file = MetadataFile {
            metrics: artifact.metrics,
            history: artifact.history.clone(),
        };

        write_json(&tmp_dir.join("model.json"), &model_file)?;
        write_json(&tmp_dir.join("metadata.json"), &metadata_file)?;
        write_json(&tmp_dir.join("importance.json"), &artifact.importance)?;

        // Version directory appears atomically; pointer moves last.
        fs::rename(&tmp_dir, &final_dir)?;
        self.write_latest(&artifact.strategy, &artifact.symbol, artifact.timeframe, next)?;

        info!(
            strategy = %artifact.strategy,
            symbol = %artifact.symbol,
            timeframe = %artifact.timeframe,
            version = next,
            "saved model artifact"
        );
        Ok(next)
    }

    fn write_latest(&self, strategy: &str, symbol: &str, tf: Timeframe, version: u32) -> Result<()> {
        let path = self.latest_path(strategy, symbol, tf);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&LatestPointer { version })
            .map_err(|e| KtrdrError::Model(format!("latest pointer serialization: {e}")))?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load an artifact by version, or the latest when `version` is `None`.
    pub fn load(
        &self,
        strategy: &str,
        symbol: &str,
        tf: Timeframe,
        version: Option<u32>,
    ) -> Result<ModelArtifact> {
        let version = match version {
            Some(v) => v,
            None => self.latest_version(strategy, symbol, tf)?.ok_or_else(|| {
                KtrdrError::Model(format!(
                    "no trained model for {strategy}/{}",
                    Self::slug(symbol, tf)
                ))
            })?,
        };

        let dir = self.version_dir(strategy, symbol, tf, version);
        if !dir.exists() {
            return Err(KtrdrError::Model(format!(
                "unknown model version v{version} for {strategy}/{}",
                Self::slug(symbol, tf)
            )));
        }

        let model: ModelFile = read_json(&dir.join("model.json"))?;
        let metadata: MetadataFile = read_json(&dir.join("metadata.json"))?;
        let importance: BTreeMap<String, f64> = read_json(&dir.join("importance.json"))?;

        let artifact = ModelArtifact {
            version: model.version,
            strategy: model.strategy,
            symbol: model.symbol,
            timeframe: model.timeframe,
            created_at: model.created_at,
            architecture: model.architecture,
            mlp: model.mlp,
            feature_names: model.feature_names,
            scaler: model.scaler,
            config_snapshot: model.config_snapshot,
            metrics: metadata.metrics,
            importance,
            history: metadata.history,
        };
        artifact.validate()?;
        Ok(artifact)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| KtrdrError::Model(format!("artifact serialization: {e}")))?;
    fs::write(path, json)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| KtrdrError::Model(format!("artifact parse ({}): {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ScalerKind;
    use crate::model::trainer::{EvalMetrics, SplitMetrics};
    use ndarray::array;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("ktrdr_artifact_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_artifact() -> ModelArtifact {
        let architecture = Architecture {
            input_dim: 3,
            hidden_layers: vec![4],
            dropout: 0.0,
        };
        let mlp = Mlp::new(&architecture, 11).unwrap();
        let mut scaler = Scaler::new(ScalerKind::ZScore);
        scaler.fit(&array![[0.0, 0.5, 1.0], [1.0, 0.5, 0.0], [0.2, 0.8, 0.4]]);
        let eval = EvalMetrics {
            loss: 0.9,
            accuracy: 0.6,
        };
        ModelArtifact {
            version: 0,
            strategy: "neuro_mean_reversion".into(),
            symbol: "AAPL".into(),
            timeframe: Timeframe::H1,
            created_at: Utc::now(),
            architecture,
            mlp,
            feature_names: vec!["rsi_14_low".into(), "rsi_14_neutral".into(), "rsi_14_high".into()],
            scaler,
            config_snapshot: "deadbeef".into(),
            metrics: SplitMetrics {
                train: eval,
                validation: eval,
                test: eval,
            },
            importance: BTreeMap::new(),
            history: TrainingHistory::default(),
        }
    }

    #[test]
    fn save_load_roundtrip_preserves_inference() {
        let dir = temp_store_dir();
        let store = ArtifactStore::new(&dir);
        let artifact = sample_artifact();

        let version = store.save(&artifact).unwrap();
        assert_eq!(version, 1);

        let loaded = store
            .load("neuro_mean_reversion", "AAPL", Timeframe::H1, Some(1))
            .unwrap();
        let input = [0.3, 0.6, 0.9];
        assert_eq!(
            artifact.predict(&input).unwrap(),
            loaded.predict(&input).unwrap()
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn versions_increment_and_latest_advances() {
        let dir = temp_store_dir();
        let store = ArtifactStore::new(&dir);
        let artifact = sample_artifact();

        assert_eq!(store.save(&artifact).unwrap(), 1);
        assert_eq!(store.save(&artifact).unwrap(), 2);
        assert_eq!(store.save(&artifact).unwrap(), 3);

        assert_eq!(
            store.list_versions("neuro_mean_reversion", "AAPL", Timeframe::H1),
            vec![1, 2, 3]
        );
        assert_eq!(
            store
                .latest_version("neuro_mean_reversion", "AAPL", Timeframe::H1)
                .unwrap(),
            Some(3)
        );

        // Loading without an explicit version follows the pointer.
        let latest = store
            .load("neuro_mean_reversion", "AAPL", Timeframe::H1, None)
            .unwrap();
        assert_eq!(latest.version, 3);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_version_is_model_error() {
        let dir = temp_store_dir();
        let store = ArtifactStore::new(&dir);
        store.save(&sample_artifact()).unwrap();

        let err = store
            .load("neuro_mean_reversion", "AAPL", Timeframe::H1, Some(9))
            .unwrap_err();
        assert_eq!(err.code(), "MODEL");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_model_is_model_error() {
        let dir = temp_store_dir();
        let store = ArtifactStore::new(&dir);
        let err = store
            .load("nope", "AAPL", Timeframe::H1, None)
            .unwrap_err();
        assert_eq!(err.code(), "MODEL");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn predict_rejects_schema_mismatch() {
        let artifact = sample_artifact();
        let err = artifact.predict(&[0.0; 4]).unwrap_err();
        match err {
            KtrdrError::FeatureSchemaMismatch { expected, actual } => {
                assert_eq!((expected, actual), (3, 4));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn artifacts_are_separated_by_symbol_and_timeframe() {
        let dir = temp_store_dir();
        let store = ArtifactStore::new(&dir);
        let mut artifact = sample_artifact();
        store.save(&artifact).unwrap();

        artifact.symbol = "MSFT".into();
        assert_eq!(store.save(&artifact).unwrap(), 1);
        artifact.symbol = "AAPL".into();
        artifact.timeframe = Timeframe::D1;
        assert_eq!(store.save(&artifact).unwrap(), 1);

        let _ = fs::remove_dir_all(&dir);
    }
}
