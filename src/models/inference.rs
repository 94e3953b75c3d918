//! Immutable inference context: one artifact set, ready to explain.

use crate::error::Result;
use crate::models::assembler::ExplanationAssembler;
use crate::models::attribution::TreeShapAttributor;
use crate::models::booster::GradientBoostedClassifier;
use crate::models::loader::{ArtifactSet, ModelInfo};
use crate::preprocessor::{FeatureVector, Preprocessor};
use crate::types::applicant::ApplicantRecord;
use crate::types::explanation::{Explanation, Prediction};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

/// Loaded preprocessing, classifier and attributor sharing one version.
///
/// Read-only after construction. Share it across request handlers behind
/// an `Arc`; every call allocates its own buffers.
#[derive(Debug)]
pub struct InferenceContext {
    version: Uuid,
    trained_at: DateTime<Utc>,
    preprocessor: Preprocessor,
    classifier: GradientBoostedClassifier,
    attributor: TreeShapAttributor,
    model_info: ModelInfo,
}

impl InferenceContext {
    /// Validate an artifact set and build the context from it.
    pub fn from_artifacts(artifacts: ArtifactSet) -> Result<Self> {
        let preprocessor = artifacts.preprocessor()?;
        let model_info = artifacts.model_info();
        let attributor = TreeShapAttributor::new(&artifacts.classifier);

        info!(
            version = %artifacts.version,
            features = preprocessor.feature_count(),
            trees = artifacts.classifier.trees().len(),
            baseline = attributor.baseline(),
            "Inference context ready"
        );

        Ok(Self {
            version: artifacts.version,
            trained_at: artifacts.trained_at,
            preprocessor,
            classifier: artifacts.classifier,
            attributor,
            model_info,
        })
    }

    /// Run preprocessing, prediction and attribution for one applicant.
    pub fn explain(&self, record: &ApplicantRecord) -> Result<Explanation> {
        let vector = self.preprocessor.prepare(record)?;
        let prediction = self.classifier.predict(&vector)?;
        let attribution = self.attributor.attribute(&vector, &self.classifier)?;
        let explanation =
            ExplanationAssembler::assemble(&vector, &prediction, &attribution, self.version)?;

        debug!(
            version = %self.version,
            prediction = explanation.prediction,
            approved = explanation.probability.approved,
            raw_score = explanation.raw_score,
            "Applicant explained"
        );
        Ok(explanation)
    }

    /// Prediction without attribution
    pub fn predict(&self, record: &ApplicantRecord) -> Result<Prediction> {
        let vector = self.preprocessor.prepare(record)?;
        self.classifier.predict(&vector)
    }

    pub fn prepare(&self, record: &ApplicantRecord) -> Result<FeatureVector> {
        self.preprocessor.prepare(record)
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }

    pub fn version(&self) -> Uuid {
        self.version
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn feature_names(&self) -> &[String] {
        self.preprocessor.feature_names()
    }

    pub fn baseline(&self) -> f64 {
        self.attributor.baseline()
    }
}
