//! Loan Approval Explainer Library
//!
//! Predicts loan approval from applicant attributes and explains each
//! prediction with exact per-feature attributions from the boosted trees.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod preprocessor;
pub mod schema;
pub mod synthetic;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use lifecycle::{LifecycleState, ModelLifecycle};
pub use metrics::ExplanationMetrics;
pub use models::inference::InferenceContext;
pub use preprocessor::{FeatureVector, Preprocessor};
pub use training::Trainer;
pub use types::{applicant::ApplicantRecord, explanation::Explanation};
