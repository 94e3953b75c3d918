//! Assembles classifier output and attributions into an [`Explanation`].

use crate::error::{PipelineError, Result};
use crate::models::attribution::AttributionResult;
use crate::preprocessor::FeatureVector;
use crate::types::explanation::{Explanation, Prediction};
use std::collections::{BTreeMap, BTreeSet};
use tracing::error;
use uuid::Uuid;

/// Combines a prediction and its attribution into the response entity.
pub struct ExplanationAssembler;

impl ExplanationAssembler {
    /// Build the explanation, failing when the attribution's feature names
    /// are not exactly the vector's feature names.
    pub fn assemble(
        vector: &FeatureVector,
        prediction: &Prediction,
        attribution: &AttributionResult,
        model_version: Uuid,
    ) -> Result<Explanation> {
        let expected: BTreeSet<&str> = vector.names().iter().map(String::as_str).collect();
        let mut feature_importance = BTreeMap::new();
        for (name, value) in attribution.iter() {
            if feature_importance.insert(name.to_string(), value).is_some() {
                return Err(mismatch(format!("duplicate attribution for '{}'", name)));
            }
        }

        let actual: BTreeSet<&str> = feature_importance.keys().map(String::as_str).collect();
        if actual != expected {
            let missing: Vec<&str> = expected.difference(&actual).copied().collect();
            let extra: Vec<&str> = actual.difference(&expected).copied().collect();
            return Err(mismatch(format!(
                "attribution features do not match vector features (missing: {:?}, extra: {:?})",
                missing, extra
            )));
        }

        Ok(Explanation {
            prediction: prediction.decision.label(),
            prediction_text: prediction.decision.text().to_string(),
            probability: prediction.probability,
            feature_importance,
            baseline: attribution.baseline(),
            raw_score: prediction.raw_score,
            model_version,
        })
    }
}

fn mismatch(message: String) -> PipelineError {
    error!(reason = %message, "Explanation assembly failed; artifact set is inconsistent");
    PipelineError::Explanation(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attribution::TreeShapAttributor;
    use crate::models::booster::{BoosterParams, GradientBoostedClassifier};
    use std::sync::Arc;

    fn fitted() -> (GradientBoostedClassifier, TreeShapAttributor) {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![(i % 2) as f64, i as f64])
            .collect();
        let labels: Vec<u8> = (0..40).map(|i| (i % 2) as u8).collect();
        let params = BoosterParams {
            n_trees: 5,
            max_depth: 2,
            ..BoosterParams::default()
        };
        let model = GradientBoostedClassifier::fit(&rows, &labels, &params).unwrap();
        let attributor = TreeShapAttributor::new(&model);
        (model, attributor)
    }

    fn vector(names: &[&str], values: Vec<f64>) -> FeatureVector {
        let names: Arc<[String]> = names.iter().map(|n| n.to_string()).collect::<Vec<_>>().into();
        FeatureVector::new(names, values).unwrap()
    }

    #[test]
    fn test_assemble() {
        let (model, attributor) = fitted();
        let v = vector(&["a", "b"], vec![1.0, 7.0]);
        let prediction = model.predict(&v).unwrap();
        let attribution = attributor.attribute(&v, &model).unwrap();
        let version = Uuid::new_v4();

        let explanation =
            ExplanationAssembler::assemble(&v, &prediction, &attribution, version).unwrap();

        assert_eq!(explanation.prediction, 1);
        assert_eq!(explanation.prediction_text, "Approved");
        assert_eq!(explanation.model_version, version);
        assert_eq!(
            explanation.feature_importance.keys().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_mismatched_names_rejected() {
        let (model, attributor) = fitted();
        let v = vector(&["a", "b"], vec![1.0, 7.0]);
        let prediction = model.predict(&v).unwrap();
        let other = vector(&["a", "c"], vec![1.0, 7.0]);
        let attribution = attributor.attribute(&other, &model).unwrap();

        let err = ExplanationAssembler::assemble(&v, &prediction, &attribution, Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Explanation(_)));
        assert!(err.to_string().contains("\"b\""));
    }
}
