//! Structured error taxonomy for the whole pipeline.
//!
//! Every error carries a stable identifier (`code()`) for boundary callers
//! and a human-readable message. The pipeline never retries internally;
//! retry policy belongs to whatever schedules runs.

use thiserror::Error;

/// Errors surfaced by the core pipeline.
#[derive(Debug, Error)]
pub enum KtrdrError {
    /// Malformed strategy config, unknown indicator, invalid fuzzy
    /// parameters. Detected at load time; no partial state.
    #[error("configuration error: {0}")]
    Config(String),

    /// Violated OHLC invariants, non-monotonic timestamps, impossible
    /// volumes. Reported with the offending bar index where known.
    #[error("data error{}: {message}", .bar_index.map(|i| format!(" at bar {i}")).unwrap_or_default())]
    Data {
        message: String,
        bar_index: Option<usize>,
    },

    /// Fewer bars than the maximum required warmup.
    #[error("insufficient data: {required} bars required, {available} available")]
    InsufficientData { required: usize, available: usize },

    /// Artifact schema mismatch, missing scaler, unknown version.
    #[error("model error: {0}")]
    Model(String),

    /// Inference input width differs from the artifact's feature schema.
    #[error("feature schema mismatch: model expects {expected} features, got {actual}")]
    FeatureSchemaMismatch { expected: usize, actual: usize },

    /// The artifact's scaler state is missing or was never fitted.
    #[error("scaler state missing or not fitted")]
    ScalerNotFit,

    /// NaN/Inf encountered in features or losses during training.
    #[error("numerical instability: non-finite loss at epoch {epoch}")]
    NumericalInstability { epoch: usize },

    /// Cooperative cancellation; ends the run cleanly.
    #[error("run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KtrdrError {
    /// Stable identifier for boundary consumers (HTTP/CLI façades).
    pub fn code(&self) -> &'static str {
        match self {
            KtrdrError::Config(_) => "CONFIG",
            KtrdrError::Data { .. } => "DATA",
            KtrdrError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            KtrdrError::Model(_) => "MODEL",
            KtrdrError::FeatureSchemaMismatch { .. } => "FEATURE_SCHEMA_MISMATCH",
            KtrdrError::ScalerNotFit => "SCALER_NOT_FIT",
            KtrdrError::NumericalInstability { .. } => "NUMERICAL_INSTABILITY",
            KtrdrError::Cancelled => "CANCELLED",
            KtrdrError::Io(_) => "IO",
        }
    }
}

pub type Result<T> = std::result::Result<T, KtrdrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_error_includes_bar_index() {
        let err = KtrdrError::Data {
            message: "high below low".into(),
            bar_index: Some(17),
        };
        assert!(err.to_string().contains("bar 17"));
        assert_eq!(err.code(), "DATA");
    }

    #[test]
    fn data_error_without_index() {
        let err = KtrdrError::Data {
            message: "empty series".into(),
            bar_index: None,
        };
        assert!(!err.to_string().contains("at bar"));
    }

    #[test]
    fn schema_mismatch_cites_both_widths() {
        let err = KtrdrError::FeatureSchemaMismatch {
            expected: 17,
            actual: 18,
        };
        let msg = err.to_string();
        assert!(msg.contains("17"));
        assert!(msg.contains("18"));
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(KtrdrError::Cancelled.code(), "CANCELLED");
        assert_eq!(
            KtrdrError::InsufficientData {
                required: 100,
                available: 5
            }
            .code(),
            "INSUFFICIENT_DATA"
        );
    }
}
