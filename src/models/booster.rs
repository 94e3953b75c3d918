//! Gradient-boosted tree classifier for loan approval.
//!
//! Second-order boosting on the logistic loss: each round fits a regression
//! tree to the gradient and hessian of the log-loss at the current margin,
//! with exact greedy split search and L2-regularized leaf weights. The raw
//! score is the log-odds of approval.

use crate::error::{PipelineError, Result};
use crate::models::tree::{GrowthParams, RegressionTree, TreeGrower};
use crate::preprocessor::FeatureVector;
use crate::schema::APPROVED;
use crate::types::explanation::{ClassProbabilities, Decision, Prediction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Boosting hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    /// Number of boosting rounds
    pub n_trees: usize,
    /// Shrinkage applied to every leaf weight
    pub learning_rate: f64,
    pub max_depth: usize,
    /// L2 regularization on leaf weights
    pub lambda: f64,
    /// Minimum hessian sum on each side of a split
    pub min_child_weight: f64,
    /// Minimum loss reduction required to split
    pub min_split_gain: f64,
    /// Initial probability of approval before any tree
    pub base_score: f64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            learning_rate: 0.3,
            max_depth: 6,
            lambda: 1.0,
            min_child_weight: 1.0,
            min_split_gain: 0.0,
            base_score: 0.5,
        }
    }
}

impl BoosterParams {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| {
            Err(PipelineError::TrainingData(format!(
                "invalid booster parameters: {}",
                msg
            )))
        };
        if self.n_trees == 0 {
            return invalid("n_trees must be at least 1");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return invalid("learning_rate must be in (0, 1]");
        }
        if !(self.lambda >= 0.0) {
            return invalid("lambda must be non-negative");
        }
        if !(self.min_child_weight > 0.0) {
            return invalid("min_child_weight must be positive");
        }
        if !(self.min_split_gain >= 0.0) {
            return invalid("min_split_gain must be non-negative");
        }
        if !(self.base_score > 0.0 && self.base_score < 1.0) {
            return invalid("base_score must be in (0, 1)");
        }
        Ok(())
    }

    fn growth(&self) -> GrowthParams {
        GrowthParams {
            max_depth: self.max_depth,
            lambda: self.lambda,
            min_child_weight: self.min_child_weight,
            min_split_gain: self.min_split_gain,
            learning_rate: self.learning_rate,
        }
    }
}

/// Trained binary classifier. Immutable after training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    /// Log-odds before any tree is applied
    base_margin: f64,
    num_features: usize,
    num_classes: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedClassifier {
    /// Train on encoded rows with labels in {0, 1}.
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], params: &BoosterParams) -> Result<Self> {
        params.validate()?;
        if rows.is_empty() {
            return Err(PipelineError::TrainingData(
                "cannot train on an empty partition".to_string(),
            ));
        }
        if rows.len() != labels.len() {
            return Err(PipelineError::TrainingData(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let num_features = rows[0].len();
        if rows.iter().any(|r| r.len() != num_features) {
            return Err(PipelineError::TrainingData(
                "rows have inconsistent feature counts".to_string(),
            ));
        }

        let targets: Vec<f64> = labels
            .iter()
            .map(|&y| if y == APPROVED { 1.0 } else { 0.0 })
            .collect();
        let base_margin = logit(params.base_score);
        let mut margins = vec![base_margin; rows.len()];
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut grad = vec![0.0; rows.len()];
        let mut hess = vec![0.0; rows.len()];

        for round in 0..params.n_trees {
            for i in 0..rows.len() {
                let p = sigmoid(margins[i]);
                grad[i] = p - targets[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let tree = TreeGrower::new(rows, &grad, &hess, params.growth()).grow();
            for (margin, row) in margins.iter_mut().zip(rows) {
                *margin += tree.predict(row);
            }
            trees.push(tree);

            if (round + 1) % 10 == 0 {
                debug!(
                    round = round + 1,
                    train_logloss = log_loss(&margins, &targets),
                    "Boosting progress"
                );
            }
        }

        info!(
            trees = trees.len(),
            features = num_features,
            train_logloss = log_loss(&margins, &targets),
            "Classifier trained"
        );

        Ok(Self {
            base_margin,
            num_features,
            num_classes: 2,
            trees,
        })
    }

    /// Log-odds of approval for a raw feature slice.
    pub fn raw_score_values(&self, x: &[f64]) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    /// Log-odds of approval, the pre-threshold output that attributions
    /// decompose.
    pub fn raw_score(&self, vector: &FeatureVector) -> Result<f64> {
        self.check_dimension(vector)?;
        Ok(self.raw_score_values(vector.values()))
    }

    /// Probability of each class.
    pub fn predict_proba(&self, vector: &FeatureVector) -> Result<ClassProbabilities> {
        Ok(ClassProbabilities::from_approved(sigmoid(self.raw_score(vector)?)))
    }

    /// Label and class probabilities for one feature vector.
    pub fn predict(&self, vector: &FeatureVector) -> Result<Prediction> {
        let raw_score = self.raw_score(vector)?;
        let probability = ClassProbabilities::from_approved(sigmoid(raw_score));
        Ok(Prediction {
            decision: Decision::from_probability(probability.approved),
            probability,
            raw_score,
        })
    }

    /// Label for a raw feature slice.
    pub fn predict_label(&self, x: &[f64]) -> u8 {
        Decision::from_probability(sigmoid(self.raw_score_values(x))).label()
    }

    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Check a deserialized classifier before it is used for serving.
    pub fn validate(&self, expected_features: usize) -> Result<()> {
        if self.num_classes != 2 {
            return Err(PipelineError::Artifact(format!(
                "classifier has {} classes; only binary classifiers are supported",
                self.num_classes
            )));
        }
        if self.num_features != expected_features {
            return Err(PipelineError::Artifact(format!(
                "classifier expects {} features but the preprocessor produces {}",
                self.num_features, expected_features
            )));
        }
        if !self.base_margin.is_finite() {
            return Err(PipelineError::Artifact("non-finite base margin".to_string()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.num_features)
                .map_err(|e| PipelineError::Artifact(format!("tree {}: {}", i, e)))?;
        }
        Ok(())
    }

    fn check_dimension(&self, vector: &FeatureVector) -> Result<()> {
        if vector.len() != self.num_features {
            return Err(PipelineError::Explanation(format!(
                "feature vector has {} features, classifier expects {}",
                vector.len(),
                self.num_features
            )));
        }
        Ok(())
    }
}

/// Numerically stable logistic function.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

fn log_loss(margins: &[f64], targets: &[f64]) -> f64 {
    let eps = 1e-15;
    let total: f64 = margins
        .iter()
        .zip(targets)
        .map(|(&m, &y)| {
            let p = sigmoid(m).clamp(eps, 1.0 - eps);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / margins.len().max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn toy_data() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..60 {
            let credit = if i % 3 == 0 { 0.0 } else { 1.0 };
            let income = 2000.0 + (i as f64) * 100.0;
            rows.push(vec![credit, income]);
            labels.push(if credit == 1.0 { 1 } else { 0 });
        }
        (rows, labels)
    }

    fn small_params() -> BoosterParams {
        BoosterParams {
            n_trees: 10,
            max_depth: 2,
            ..BoosterParams::default()
        }
    }

    fn vector(values: Vec<f64>) -> FeatureVector {
        let names: Arc<[String]> = vec!["credit".to_string(), "income".to_string()].into();
        FeatureVector::new(names, values).unwrap()
    }

    #[test]
    fn test_fit_learns_separable_rule() {
        let (rows, labels) = toy_data();
        let model = GradientBoostedClassifier::fit(&rows, &labels, &small_params()).unwrap();

        assert_eq!(model.trees().len(), 10);
        assert_eq!(model.base_margin(), 0.0);

        let good = model.predict(&vector(vec![1.0, 4000.0])).unwrap();
        let bad = model.predict(&vector(vec![0.0, 4000.0])).unwrap();
        assert_eq!(good.decision, Decision::Approved);
        assert_eq!(bad.decision, Decision::Rejected);
        assert!(good.raw_score > 0.0);
        assert!(bad.raw_score < 0.0);
    }

    #[test]
    fn test_probabilities_normalized() {
        let (rows, labels) = toy_data();
        let model = GradientBoostedClassifier::fit(&rows, &labels, &small_params()).unwrap();

        for row in &rows {
            let p = model.predict_proba(&vector(row.clone())).unwrap();
            assert!((p.approved + p.rejected - 1.0).abs() < 1e-6);
            assert!((0.0..=1.0).contains(&p.approved));
        }
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let (rows, labels) = toy_data();
        let a = GradientBoostedClassifier::fit(&rows, &labels, &small_params()).unwrap();
        let b = GradientBoostedClassifier::fit(&rows, &labels, &small_params()).unwrap();
        assert_eq!(a, b);

        let v = vector(vec![1.0, 3000.0]);
        assert_eq!(a.raw_score(&v).unwrap(), a.raw_score(&v).unwrap());
    }

    #[test]
    fn test_dimension_mismatch() {
        let (rows, labels) = toy_data();
        let model = GradientBoostedClassifier::fit(&rows, &labels, &small_params()).unwrap();
        let names: Arc<[String]> = vec!["credit".to_string()].into();
        let short = FeatureVector::new(names, vec![1.0]).unwrap();
        assert!(matches!(
            model.predict(&short),
            Err(PipelineError::Explanation(_))
        ));
    }

    #[test]
    fn test_validate() {
        let (rows, labels) = toy_data();
        let model = GradientBoostedClassifier::fit(&rows, &labels, &small_params()).unwrap();
        assert!(model.validate(2).is_ok());
        assert!(matches!(model.validate(3), Err(PipelineError::Artifact(_))));

        let mut multi = model.clone();
        multi.num_classes = 3;
        assert!(matches!(multi.validate(2), Err(PipelineError::Artifact(_))));
    }

    #[test]
    fn test_invalid_params() {
        let params = BoosterParams {
            min_child_weight: 0.0,
            ..BoosterParams::default()
        };
        assert!(params.validate().is_err());
        assert!(BoosterParams::default().validate().is_ok());
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-12);
    }
}
