//! Feature preprocessing for loan approval inference.
//!
//! This module turns an [`ApplicantRecord`] into the numeric feature vector
//! the classifier was trained on. The same routine encodes the training
//! partition, so training and inference share one preprocessing contract.
//!
//! Layout of the produced vector:
//! - every numeric field, unscaled, named `num__<Field>`
//! - per categorical field, one indicator per fitted category except the
//!   first (sorted order), named `cat__<Field>_<Category>`
//!
//! Missing values are replaced by statistics fitted on the training
//! partition. A category not seen at training encodes as all zeros.

use crate::error::{PipelineError, Result};
use crate::schema::{
    categorical_feature_name, numeric_feature_name, required_fields, CATEGORICAL_FIELDS,
    NUMERIC_FIELDS,
};
use crate::types::applicant::{ApplicantRecord, FieldLookup};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error};

/// Per-field fallback values captured from the training partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationStatistics {
    /// Median of each numeric field
    pub medians: BTreeMap<String, f64>,
    /// Most frequent value of each categorical field
    pub modes: BTreeMap<String, String>,
}

impl ImputationStatistics {
    /// Fit medians and modes from training records.
    pub fn fit(records: &[ApplicantRecord]) -> Result<Self> {
        let mut medians = BTreeMap::new();
        for field in NUMERIC_FIELDS {
            let values = numeric_column(records, field)?;
            let median = median(&values).ok_or_else(|| {
                PipelineError::TrainingData(format!("no observed values for field '{}'", field))
            })?;
            medians.insert(field.to_string(), median);
        }

        let mut modes = BTreeMap::new();
        for field in CATEGORICAL_FIELDS {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for record in records {
                if let FieldLookup::Present(value) = record.lookup(field) {
                    *counts.entry(value.as_category()).or_insert(0) += 1;
                }
            }
            // BTreeMap iterates in key order, so ties resolve to the smallest value.
            let mode = counts
                .into_iter()
                .fold(None::<(String, usize)>, |best, (value, count)| match best {
                    Some((_, best_count)) if best_count >= count => best,
                    _ => Some((value, count)),
                })
                .map(|(value, _)| value)
                .ok_or_else(|| {
                    PipelineError::TrainingData(format!(
                        "no observed values for field '{}'",
                        field
                    ))
                })?;
            modes.insert(field.to_string(), mode);
        }

        Ok(Self { medians, modes })
    }

    pub fn median(&self, field: &str) -> Option<f64> {
        self.medians.get(field).copied()
    }

    pub fn mode(&self, field: &str) -> Option<&str> {
        self.modes.get(field).map(String::as_str)
    }
}

/// Sorted category set per categorical field, fitted on training data.
///
/// The first category of each field is the dropped reference category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySets {
    sets: BTreeMap<String, Vec<String>>,
}

impl CategorySets {
    /// Collect the distinct categories of each field. Missing values count
    /// as the field's imputed mode.
    pub fn fit(records: &[ApplicantRecord], statistics: &ImputationStatistics) -> Result<Self> {
        let mut sets = BTreeMap::new();
        for field in CATEGORICAL_FIELDS {
            let mut distinct = BTreeSet::new();
            for record in records {
                match record.lookup(field) {
                    FieldLookup::Present(value) => {
                        distinct.insert(value.as_category());
                    }
                    FieldLookup::Missing | FieldLookup::Absent => {
                        let mode = statistics.mode(field).ok_or_else(|| {
                            PipelineError::ImputationGap {
                                field: field.to_string(),
                            }
                        })?;
                        distinct.insert(mode.to_string());
                    }
                }
            }
            if distinct.is_empty() {
                return Err(PipelineError::TrainingData(format!(
                    "no categories observed for field '{}'",
                    field
                )));
            }
            sets.insert(field.to_string(), distinct.into_iter().collect());
        }
        Ok(Self { sets })
    }

    pub fn categories(&self, field: &str) -> Option<&[String]> {
        self.sets.get(field).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.sets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Feature names implied by these category sets, in vector order.
    pub fn feature_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = NUMERIC_FIELDS
            .iter()
            .map(|f| numeric_feature_name(f))
            .collect();
        for field in CATEGORICAL_FIELDS {
            let categories = self.categories(field).ok_or_else(|| {
                PipelineError::Artifact(format!("no category set for field '{}'", field))
            })?;
            names.extend(
                categories
                    .iter()
                    .skip(1)
                    .map(|category| categorical_feature_name(field, category)),
            );
        }
        Ok(names)
    }
}

/// Ordered, named numeric features for one applicant.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Arc<[String]>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(names: Arc<[String]>, values: Vec<f64>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(PipelineError::Explanation(format!(
                "feature vector has {} values for {} names",
                values.len(),
                names.len()
            )));
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn shared_names(&self) -> Arc<[String]> {
        Arc::clone(&self.names)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// Fitted preprocessing state: statistics, category sets and feature order.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    statistics: ImputationStatistics,
    categories: CategorySets,
    feature_names: Arc<[String]>,
    /// Start index of each categorical field's indicators
    offsets: BTreeMap<String, usize>,
}

impl Preprocessor {
    /// Fit the preprocessing contract from training records.
    pub fn fit(records: &[ApplicantRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(PipelineError::TrainingData(
                "cannot fit preprocessing on an empty partition".to_string(),
            ));
        }
        let statistics = ImputationStatistics::fit(records)?;
        let categories = CategorySets::fit(records, &statistics)?;
        let feature_names = categories.feature_names()?;
        Self::from_parts(statistics, categories, feature_names)
    }

    /// Rebuild from persisted parts, rejecting a feature order that does not
    /// match the category sets.
    pub fn from_parts(
        statistics: ImputationStatistics,
        categories: CategorySets,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        let expected = categories.feature_names()?;
        if expected != feature_names {
            return Err(PipelineError::Artifact(format!(
                "persisted feature order ({} features) does not match category sets ({} features)",
                feature_names.len(),
                expected.len()
            )));
        }

        let mut offsets = BTreeMap::new();
        let mut offset = NUMERIC_FIELDS.len();
        for field in CATEGORICAL_FIELDS {
            offsets.insert(field.to_string(), offset);
            offset += categories
                .categories(field)
                .map(|c| c.len().saturating_sub(1))
                .unwrap_or(0);
        }

        Ok(Self {
            statistics,
            categories,
            feature_names: feature_names.into(),
            offsets,
        })
    }

    /// Transform a raw record into the fixed-order feature vector.
    pub fn prepare(&self, record: &ApplicantRecord) -> Result<FeatureVector> {
        if let Some(field) = required_fields().find(|f| !record.contains(f)) {
            return Err(PipelineError::Schema {
                field: field.to_string(),
            });
        }

        let mut values = vec![0.0; self.feature_names.len()];

        for (i, field) in NUMERIC_FIELDS.iter().enumerate() {
            values[i] = match record.lookup(field) {
                FieldLookup::Present(value) => {
                    value.as_number().ok_or_else(|| PipelineError::InvalidValue {
                        field: field.to_string(),
                        value: value.to_string(),
                    })?
                }
                FieldLookup::Missing | FieldLookup::Absent => self.impute_numeric(field)?,
            };
        }

        for field in CATEGORICAL_FIELDS {
            let category = match record.lookup(field) {
                FieldLookup::Present(value) => value.as_category(),
                FieldLookup::Missing | FieldLookup::Absent => self.impute_category(field)?,
            };
            if let Some(slot) = self.indicator_slot(field, &category) {
                values[slot] = 1.0;
            }
        }

        FeatureVector::new(Arc::clone(&self.feature_names), values)
    }

    fn impute_numeric(&self, field: &str) -> Result<f64> {
        self.statistics.median(field).ok_or_else(|| {
            error!(field = %field, "No median fitted for numeric field");
            PipelineError::ImputationGap {
                field: field.to_string(),
            }
        })
    }

    fn impute_category(&self, field: &str) -> Result<String> {
        self.statistics
            .mode(field)
            .map(str::to_string)
            .ok_or_else(|| {
                error!(field = %field, "No mode fitted for categorical field");
                PipelineError::ImputationGap {
                    field: field.to_string(),
                }
            })
    }

    /// Index of the indicator for `category`, or `None` for the reference
    /// category and for categories unseen at training.
    fn indicator_slot(&self, field: &str, category: &str) -> Option<usize> {
        let categories = self.categories.categories(field)?;
        let offset = *self.offsets.get(field)?;
        match categories.iter().position(|c| c == category) {
            Some(0) => None,
            Some(index) => Some(offset + index - 1),
            None => {
                debug!(
                    field = %field,
                    category = %category,
                    "Unseen category encoded as all zeros"
                );
                None
            }
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    pub fn statistics(&self) -> &ImputationStatistics {
        &self.statistics
    }

    pub fn categories(&self) -> &CategorySets {
        &self.categories
    }
}

fn numeric_column(records: &[ApplicantRecord], field: &str) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(records.len());
    for record in records {
        if let FieldLookup::Present(value) = record.lookup(field) {
            let number = value.as_number().ok_or_else(|| {
                PipelineError::TrainingData(format!(
                    "non-numeric value '{}' in numeric column '{}'",
                    value, field
                ))
            })?;
            values.push(number);
        }
    }
    Ok(values)
}

/// Median with the two middle values averaged for even counts.
pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
