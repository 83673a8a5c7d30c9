//! Model subsystem: the MLP classifier, its training harness, permutation
//! importance, and versioned artifact persistence.

pub mod artifact;
pub mod importance;
pub mod mlp;
pub mod trainer;

pub use artifact::{ArtifactStore, ModelArtifact};
pub use importance::permutation_importance;
pub use mlp::{Architecture, Dense, Mlp};
pub use trainer::{
    train, ClassWeights, EpochRecord, EvalMetrics, Optimizer, SplitMetrics, SplitRatios,
    TrainedModel, TrainingConfig, TrainingHistory,
};
