//! Held-out evaluation: accuracy, per-class precision/recall/F1 and the
//! confusion matrix.

use crate::schema::APPROVED;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Precision, recall, F1 and support for one class (or an average).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Evaluation of a classifier on the test partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    /// Index 0 = rejected, 1 = approved
    pub per_class: [ClassMetrics; 2],
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    /// `confusion[actual][predicted]`
    pub confusion: [[usize; 2]; 2],
}

impl EvaluationReport {
    /// Compare predicted labels against the truth. Undefined ratios (no
    /// predictions or no support for a class) are reported as 0.
    pub fn evaluate(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut confusion = [[0usize; 2]; 2];
        for (&actual, &predicted) in y_true.iter().zip(y_pred) {
            confusion[class_index(actual)][class_index(predicted)] += 1;
        }

        let total: usize = confusion.iter().flatten().sum();
        let correct = confusion[0][0] + confusion[1][1];
        let accuracy = ratio(correct, total);

        let per_class = [0, 1].map(|c| {
            let true_positive = confusion[c][c];
            let predicted = confusion[0][c] + confusion[1][c];
            let support = confusion[c][0] + confusion[c][1];
            let precision = ratio(true_positive, predicted);
            let recall = ratio(true_positive, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                precision,
                recall,
                f1,
                support,
            }
        });

        let macro_avg = ClassMetrics {
            precision: (per_class[0].precision + per_class[1].precision) / 2.0,
            recall: (per_class[0].recall + per_class[1].recall) / 2.0,
            f1: (per_class[0].f1 + per_class[1].f1) / 2.0,
            support: total,
        };
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                per_class
                    .iter()
                    .map(|m| f(m) * m.support as f64)
                    .sum::<f64>()
                    / total as f64
            }
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            support: total,
        };

        Self {
            accuracy,
            per_class,
            macro_avg,
            weighted_avg,
            confusion,
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        writeln!(
            f,
            "{:>14} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        let rows = [
            ("rejected", &self.per_class[0]),
            ("approved", &self.per_class[1]),
            ("macro avg", &self.macro_avg),
            ("weighted avg", &self.weighted_avg),
        ];
        for (name, m) in rows {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        write!(
            f,
            "Confusion (actual x predicted): [[{}, {}], [{}, {}]]",
            self.confusion[0][0], self.confusion[0][1], self.confusion[1][0], self.confusion[1][1]
        )
    }
}

fn class_index(label: u8) -> usize {
    if label == APPROVED {
        1
    } else {
        0
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
