//! Classifier, attribution and inference components

pub mod assembler;
pub mod attribution;
pub mod booster;
pub mod inference;
pub mod loader;
pub mod tree;

pub use assembler::ExplanationAssembler;
pub use attribution::{AttributionResult, TreeShapAttributor};
pub use booster::{BoosterParams, GradientBoostedClassifier};
pub use inference::InferenceContext;
pub use loader::{ArtifactSet, ArtifactStore, ModelInfo};
