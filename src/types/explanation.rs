//! Prediction and explanation data structures

use crate::schema::{APPROVED, REJECTED};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Binary loan decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    /// Decision for a probability of approval; ties go to approval.
    pub fn from_probability(approved: f64) -> Self {
        if approved >= 0.5 {
            Decision::Approved
        } else {
            Decision::Rejected
        }
    }

    pub fn label(&self) -> u8 {
        match self {
            Decision::Approved => APPROVED,
            Decision::Rejected => REJECTED,
        }
    }

    /// Human-readable label text
    pub fn text(&self) -> &'static str {
        match self {
            Decision::Approved => "Approved",
            Decision::Rejected => "Rejected",
        }
    }
}

/// Probability of each class. The two values always sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub approved: f64,
    pub rejected: f64,
}

impl ClassProbabilities {
    pub fn from_approved(approved: f64) -> Self {
        let approved = approved.clamp(0.0, 1.0);
        Self {
            approved,
            rejected: 1.0 - approved,
        }
    }
}

/// Classifier output for one feature vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub decision: Decision,
    pub probability: ClassProbabilities,
    /// Pre-threshold log-odds of approval
    pub raw_score: f64,
}

/// Explanation returned for a single applicant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Predicted label (1 = approved, 0 = rejected)
    pub prediction: u8,

    /// "Approved" or "Rejected"
    pub prediction_text: String,

    pub probability: ClassProbabilities,

    /// Signed contribution of each feature to the raw score
    pub feature_importance: BTreeMap<String, f64>,

    /// Expected raw score with no feature information
    pub baseline: f64,

    /// Log-odds the classifier produced for this applicant
    pub raw_score: f64,

    /// Identity of the artifact set that produced this explanation
    pub model_version: Uuid,
}

impl Explanation {
    pub fn decision(&self) -> Decision {
        if self.prediction == APPROVED {
            Decision::Approved
        } else {
            Decision::Rejected
        }
    }

    /// Features ordered by absolute contribution, largest first.
    pub fn top_features(&self, n: usize) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .feature_importance
            .iter()
            .map(|(name, &value)| (name.as_str(), value))
            .collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        ranked.truncate(n);
        ranked
    }
}
