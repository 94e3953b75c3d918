//! Persisted artifact set: everything inference needs, under one version.

use crate::error::{PipelineError, Result};
use crate::models::booster::GradientBoostedClassifier;
use crate::preprocessor::{median, CategorySets, ImputationStatistics, Preprocessor};
use crate::schema::NUMERIC_FIELDS;
use crate::training::evaluation::EvaluationReport;
use crate::types::applicant::{ApplicantRecord, FieldLookup};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Layout version of the artifact file
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Observed range of a numeric field in the training partition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl NumericRange {
    /// Ranges of every numeric field over the records' observed values.
    pub fn fit(records: &[ApplicantRecord]) -> BTreeMap<String, NumericRange> {
        let mut ranges = BTreeMap::new();
        for field in NUMERIC_FIELDS {
            let values: Vec<f64> = records
                .iter()
                .filter_map(|r| match r.lookup(field) {
                    FieldLookup::Present(v) => v.as_number(),
                    _ => None,
                })
                .collect();
            if let Some(median) = median(&values) {
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                ranges.insert(field.to_string(), NumericRange { min, max, median });
            }
        }
        ranges
    }
}

/// Classifier, imputation statistics, category sets and feature order
/// produced by one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub format_version: u32,
    /// Identity shared by every part of the set
    pub version: Uuid,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub statistics: ImputationStatistics,
    pub categories: CategorySets,
    pub classifier: GradientBoostedClassifier,
    pub numeric_ranges: BTreeMap<String, NumericRange>,
    /// Held-out evaluation of the classifier, when trained here
    #[serde(default)]
    pub evaluation: Option<EvaluationReport>,
}

impl ArtifactSet {
    /// Rebuild the preprocessor, checking that every part agrees on the
    /// feature layout.
    pub fn preprocessor(&self) -> Result<Preprocessor> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(PipelineError::Artifact(format!(
                "unsupported artifact format version {} (expected {})",
                self.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        let preprocessor = Preprocessor::from_parts(
            self.statistics.clone(),
            self.categories.clone(),
            self.feature_names.clone(),
        )?;
        self.classifier.validate(preprocessor.feature_count())?;
        Ok(preprocessor)
    }

    /// Summary of the input domain this artifact set was trained on.
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            version: self.version,
            trained_at: self.trained_at,
            feature_names: self.feature_names.clone(),
            categories: self
                .categories
                .iter()
                .map(|(field, cats)| (field.to_string(), cats.to_vec()))
                .collect(),
            numeric_ranges: self.numeric_ranges.clone(),
            num_trees: self.classifier.trees().len(),
            evaluation: self.evaluation.clone(),
        }
    }
}

/// Documented input domain of a loaded model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub version: Uuid,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    /// Fitted categories per categorical field; others encode as unseen
    pub categories: BTreeMap<String, Vec<String>>,
    pub numeric_ranges: BTreeMap<String, NumericRange>,
    pub num_trees: usize,
    pub evaluation: Option<EvaluationReport>,
}

/// Reads and writes an artifact set as a single JSON document.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the set to a sibling temp file, then rename it into place so a
    /// reader never sees a partial artifact.
    pub fn save(&self, artifacts: &ArtifactSet) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(artifacts)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        info!(
            path = %self.path.display(),
            version = %artifacts.version,
            features = artifacts.feature_names.len(),
            trees = artifacts.classifier.trees().len(),
            "Artifact set saved"
        );
        Ok(())
    }

    /// Load and validate the set.
    pub fn load(&self) -> Result<ArtifactSet> {
        let data = fs::read(&self.path).map_err(|e| {
            PipelineError::Artifact(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let artifacts: ArtifactSet = serde_json::from_slice(&data).map_err(|e| {
            PipelineError::Artifact(format!("malformed artifact {}: {}", self.path.display(), e))
        })?;
        artifacts.preprocessor()?;

        info!(
            path = %self.path.display(),
            version = %artifacts.version,
            trained_at = %artifacts.trained_at,
            "Artifact set loaded"
        );
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::models::booster::BoosterParams;
    use crate::synthetic::LoanGenerator;
    use crate::training::Trainer;

    fn trained() -> ArtifactSet {
        let dataset = LoanGenerator::new(3).dataset(200).unwrap();
        let config = TrainingConfig {
            booster: BoosterParams {
                n_trees: 10,
                max_depth: 3,
                ..BoosterParams::default()
            },
            ..TrainingConfig::default()
        };
        Trainer::new(config).train(&dataset).unwrap().artifacts
    }

    fn tamper(store: &ArtifactStore, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut value: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        edit(&mut value);
        fs::write(store.path(), serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested/model.json"));
        assert!(!store.exists());

        let artifacts = trained();
        store.save(&artifacts).unwrap();
        assert!(store.exists());
        assert!(!dir.path().join("nested/model.json.tmp").exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded, artifacts);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(PipelineError::Artifact(_))));
    }

    #[test]
    fn test_rejects_non_binary_classifier() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("model.json"));
        store.save(&trained()).unwrap();
        tamper(&store, |v| v["classifier"]["num_classes"] = 3.into());

        let err = store.load().unwrap_err();
        assert!(matches!(err, PipelineError::Artifact(_)));
        assert!(err.to_string().contains("3 classes"));
    }

    #[test]
    fn test_rejects_misaligned_feature_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("model.json"));
        store.save(&trained()).unwrap();
        tamper(&store, |v| {
            v["feature_names"].as_array_mut().unwrap().pop();
        });

        assert!(matches!(store.load(), Err(PipelineError::Artifact(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("model.json"));
        fs::write(store.path(), b"{ not json").unwrap();
        assert!(matches!(store.load(), Err(PipelineError::Artifact(_))));
    }

    #[test]
    fn test_model_info() {
        let artifacts = trained();
        let info = artifacts.model_info();

        assert_eq!(info.version, artifacts.version);
        assert_eq!(info.num_trees, 10);
        assert!(info.categories["Property_Area"].contains(&"Urban".to_string()));
        let income = info.numeric_ranges["ApplicantIncome"];
        assert!(income.min <= income.median && income.median <= income.max);
        assert_eq!(info.feature_names, artifacts.feature_names);
    }

    #[test]
    fn test_numeric_range_ignores_missing() {
        let records = vec![
            ApplicantRecord::new().with("LoanAmount", 10.0),
            ApplicantRecord::new().with_missing("LoanAmount"),
            ApplicantRecord::new().with("LoanAmount", 30.0),
        ];
        let ranges = NumericRange::fit(&records);
        let loan = ranges["LoanAmount"];
        assert_eq!((loan.min, loan.max, loan.median), (10.0, 30.0, 20.0));
        assert!(!ranges.contains_key("ApplicantIncome"));
    }
}
