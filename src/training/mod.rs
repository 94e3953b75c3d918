//! Offline training: split, fit preprocessing, boost, evaluate.

pub mod dataset;
pub mod evaluation;
pub mod split;

use crate::config::TrainingConfig;
use crate::error::{PipelineError, Result};
use crate::models::booster::GradientBoostedClassifier;
use crate::models::loader::{ArtifactSet, NumericRange, ARTIFACT_FORMAT_VERSION};
use crate::preprocessor::Preprocessor;
use chrono::Utc;
use dataset::LabeledDataset;
use evaluation::EvaluationReport;
use split::stratified_split;
use std::path::Path;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Result of one training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifacts: ArtifactSet,
    pub report: EvaluationReport,
}

/// Runs the training procedure with fixed settings
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn train_from_path<P: AsRef<Path>>(&self, path: P) -> Result<TrainingOutcome> {
        let dataset = LabeledDataset::from_path(path)?;
        self.train(&dataset)
    }

    /// Train on `dataset` and return a complete artifact set.
    ///
    /// Statistics and category sets come from the training partition only.
    /// Both partitions are encoded by [`Preprocessor::prepare`], the routine
    /// used at inference.
    pub fn train(&self, dataset: &LabeledDataset) -> Result<TrainingOutcome> {
        let start = Instant::now();
        self.config.booster.validate()?;

        let split = stratified_split(
            dataset.labels(),
            self.config.test_fraction,
            self.config.seed,
        )?;
        let train = dataset.subset(&split.train);
        let test = dataset.subset(&split.test);
        info!(
            train_rows = train.len(),
            test_rows = test.len(),
            seed = self.config.seed,
            "Stratified split complete"
        );

        let preprocessor = Preprocessor::fit(train.records())?;
        info!(
            features = preprocessor.feature_count(),
            "Preprocessing fitted on training partition"
        );

        // Unparseable cells in either partition are training data errors
        let encode = |part: &LabeledDataset| -> Result<Vec<Vec<f64>>> {
            part.records()
                .iter()
                .map(|r| {
                    preprocessor
                        .prepare(r)
                        .map(|v| v.values().to_vec())
                        .map_err(|e| match e {
                            PipelineError::InvalidValue { field, value } => {
                                PipelineError::TrainingData(format!(
                                    "invalid value '{}' in column '{}'",
                                    value, field
                                ))
                            }
                            other => other,
                        })
                })
                .collect()
        };
        let train_rows = encode(&train)?;
        let test_rows = encode(&test)?;

        let classifier =
            GradientBoostedClassifier::fit(&train_rows, train.labels(), &self.config.booster)?;

        let predicted: Vec<u8> = test_rows
            .iter()
            .map(|row| classifier.predict_label(row))
            .collect();
        let report = EvaluationReport::evaluate(test.labels(), &predicted);
        info!(
            accuracy = report.accuracy,
            weighted_f1 = report.weighted_avg.f1,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training complete"
        );
        info!("Held-out evaluation\n{}", report);

        let artifacts = ArtifactSet {
            format_version: ARTIFACT_FORMAT_VERSION,
            version: Uuid::new_v4(),
            trained_at: Utc::now(),
            feature_names: preprocessor.feature_names().to_vec(),
            statistics: preprocessor.statistics().clone(),
            categories: preprocessor.categories().clone(),
            classifier,
            numeric_ranges: NumericRange::fit(train.records()),
            evaluation: Some(report.clone()),
        };

        Ok(TrainingOutcome { artifacts, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booster::BoosterParams;
    use crate::preprocessor::{CategorySets, ImputationStatistics};
    use crate::synthetic::LoanGenerator;

    fn config(n_trees: usize) -> TrainingConfig {
        TrainingConfig {
            booster: BoosterParams {
                n_trees,
                max_depth: 3,
                ..BoosterParams::default()
            },
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_train_produces_consistent_artifacts() {
        let dataset = LoanGenerator::new(11).dataset(300).unwrap();
        let outcome = Trainer::new(config(20)).train(&dataset).unwrap();
        let artifacts = &outcome.artifacts;

        let preprocessor = artifacts.preprocessor().unwrap();
        assert_eq!(preprocessor.feature_count(), artifacts.classifier.num_features());
        assert_eq!(artifacts.classifier.trees().len(), 20);
        assert_eq!(outcome.report.confusion.iter().flatten().sum::<usize>(), 60);
        assert_eq!(artifacts.evaluation.as_ref(), Some(&outcome.report));
    }

    #[test]
    fn test_model_learns_credit_history() {
        let dataset = LoanGenerator::new(5).dataset(500).unwrap();
        let outcome = Trainer::new(config(30)).train(&dataset).unwrap();
        // Credit history alone separates most rows in the generated data
        assert!(outcome.report.accuracy > 0.65, "accuracy {}", outcome.report.accuracy);
    }

    #[test]
    fn test_same_seed_same_model() {
        let dataset = LoanGenerator::new(8).dataset(200).unwrap();
        let a = Trainer::new(config(5)).train(&dataset).unwrap().artifacts;
        let b = Trainer::new(config(5)).train(&dataset).unwrap().artifacts;
        assert_eq!(a.classifier, b.classifier);
        assert_eq!(a.statistics, b.statistics);
        assert_ne!(a.version, b.version);
    }

    #[test]
    fn test_preprocessing_fitted_on_training_partition_only() {
        let generated = LoanGenerator::new(13).dataset(200).unwrap();
        let cfg = config(5);
        let split = stratified_split(generated.labels(), cfg.test_fraction, cfg.seed).unwrap();

        // Push the held-out rows far from the rest so leakage would show
        let mut records = generated.records().to_vec();
        for &i in &split.test {
            records[i] = records[i]
                .clone()
                .with("ApplicantIncome", 1.0e9)
                .with("LoanAmount", 1.0e6)
                .with("Property_Area", "Offshore");
        }
        let dataset = LabeledDataset::new(records, generated.labels().to_vec()).unwrap();
        let train = dataset.subset(&split.train);

        let artifacts = Trainer::new(cfg).train(&dataset).unwrap().artifacts;

        let train_stats = ImputationStatistics::fit(train.records()).unwrap();
        let train_categories = CategorySets::fit(train.records(), &train_stats).unwrap();
        assert_eq!(artifacts.statistics, train_stats);
        assert_eq!(artifacts.categories, train_categories);

        let full_stats = ImputationStatistics::fit(dataset.records()).unwrap();
        assert_ne!(artifacts.statistics, full_stats);
        let areas = artifacts.categories.categories("Property_Area").unwrap();
        assert!(!areas.contains(&"Offshore".to_string()));
        assert!(artifacts.numeric_ranges["ApplicantIncome"].max < 1.0e9);
    }

    #[test]
    fn test_bad_cell_in_held_out_rows_is_training_error() {
        let generated = LoanGenerator::new(17).dataset(100).unwrap();
        let cfg = config(3);
        let split = stratified_split(generated.labels(), cfg.test_fraction, cfg.seed).unwrap();

        let mut records = generated.records().to_vec();
        let bad = split.test[0];
        records[bad] = records[bad].clone().with("ApplicantIncome", "n/a");
        let dataset = LabeledDataset::new(records, generated.labels().to_vec()).unwrap();

        match Trainer::new(cfg).train(&dataset) {
            Err(err @ PipelineError::TrainingData(_)) => {
                assert!(!err.is_client_error());
                assert!(err.to_string().contains("ApplicantIncome"));
            }
            other => panic!("expected training data error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_params_rejected() {
        let dataset = LoanGenerator::new(8).dataset(50).unwrap();
        let mut bad = config(5);
        bad.booster.learning_rate = 0.0;
        assert!(Trainer::new(bad).train(&dataset).is_err());
    }
}
