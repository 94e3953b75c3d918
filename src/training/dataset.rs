//! Labeled training data loaded from CSV.

use crate::error::{PipelineError, Result};
use crate::schema::{parse_label, required_fields, APPROVED, LABEL_COLUMN};
use crate::types::applicant::{ApplicantRecord, FieldValue};
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Applicant records paired with their approval labels.
#[derive(Debug, Clone, Default)]
pub struct LabeledDataset {
    records: Vec<ApplicantRecord>,
    labels: Vec<u8>,
}

impl LabeledDataset {
    pub fn new(records: Vec<ApplicantRecord>, labels: Vec<u8>) -> Result<Self> {
        if records.len() != labels.len() {
            return Err(PipelineError::TrainingData(format!(
                "{} records but {} labels",
                records.len(),
                labels.len()
            )));
        }
        Ok(Self { records, labels })
    }

    /// Load a CSV file with a header row.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            PipelineError::TrainingData(format!("cannot open {}: {}", path.display(), e))
        })?;
        let dataset = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            rows = dataset.len(),
            approved = dataset.class_counts()[1],
            rejected = dataset.class_counts()[0],
            "Training data loaded"
        );
        Ok(dataset)
    }

    /// Parse CSV from any reader. Empty cells are missing values; the
    /// `Loan_ID` column and any other extra columns are ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader.headers()?.clone();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let missing: Vec<&str> = required_fields()
            .chain(std::iter::once(LABEL_COLUMN))
            .filter(|f| column(*f).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::TrainingData(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        let field_columns: Vec<(&str, usize)> = required_fields()
            .filter_map(|f| column(f).map(|i| (f, i)))
            .collect();
        let label_column = column(LABEL_COLUMN).ok_or_else(|| {
            PipelineError::TrainingData(format!("missing label column {}", LABEL_COLUMN))
        })?;

        let mut records = Vec::new();
        let mut labels = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let row_data = result?;

            let raw_label = row_data.get(label_column).unwrap_or("");
            let label = parse_label(raw_label).ok_or_else(|| {
                PipelineError::TrainingData(format!(
                    "row {}: invalid {} value '{}'",
                    row + 1,
                    LABEL_COLUMN,
                    raw_label
                ))
            })?;

            let mut record = ApplicantRecord::new();
            for (field, index) in &field_columns {
                let cell = row_data.get(*index).unwrap_or("");
                let value = if cell.is_empty() {
                    None
                } else {
                    Some(FieldValue::Text(cell.to_string()))
                };
                record.insert(field, value);
            }

            records.push(record);
            labels.push(label);
        }

        if records.is_empty() {
            return Err(PipelineError::TrainingData("dataset has no rows".to_string()));
        }

        Self::new(records, labels)
    }

    pub fn records(&self) -> &[ApplicantRecord] {
        &self.records
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of rejected (index 0) and approved (index 1) rows.
    pub fn class_counts(&self) -> [usize; 2] {
        let approved = self.labels.iter().filter(|&&l| l == APPROVED).count();
        [self.labels.len() - approved, approved]
    }

    /// Rows at the given indices, in that order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}
