//! Applicant record data structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A raw field value as received from a caller or read from training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Interpret the value as a number. Text is parsed after trimming.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) if v.is_finite() => Some(*v),
            FieldValue::Number(_) => None,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Interpret the value as a category label.
    ///
    /// Integral numbers render without a fractional part so that `0` and
    /// `"0"` name the same category.
    pub fn as_category(&self) -> String {
        match self {
            FieldValue::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => {
                format!("{}", *v as i64)
            }
            FieldValue::Number(v) => v.to_string(),
            FieldValue::Text(s) => s.trim().to_string(),
        }
    }

    fn is_blank(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Number(v as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Result of looking a field up in a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldLookup<'a> {
    /// The field name is not in the record at all.
    Absent,
    /// The field is present but null or blank.
    Missing,
    Present(&'a FieldValue),
}

/// A loan application: named fields mapped to raw, possibly-null values.
///
/// Deserializes from a flat JSON object. Keys outside the declared schema
/// (such as `Loan_ID`) are kept but ignored by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicantRecord {
    fields: BTreeMap<String, Option<FieldValue>>,
}

impl ApplicantRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field to a value
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(field, Some(value.into()));
        self
    }

    /// Set a field to null
    pub fn with_missing(mut self, field: &str) -> Self {
        self.insert(field, None);
        self
    }

    /// Remove a field name entirely
    pub fn without(mut self, field: &str) -> Self {
        self.fields.remove(field);
        self
    }

    pub fn insert(&mut self, field: &str, value: Option<FieldValue>) {
        self.fields.insert(field.to_string(), value);
    }

    pub fn lookup(&self, field: &str) -> FieldLookup<'_> {
        match self.fields.get(field) {
            None => FieldLookup::Absent,
            Some(None) => FieldLookup::Missing,
            Some(Some(value)) if value.is_blank() => FieldLookup::Missing,
            Some(Some(value)) => FieldLookup::Present(value),
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_deserialization() {
        let json = r#"{
            "Loan_ID": "LP001002",
            "Gender": "Male",
            "ApplicantIncome": 5849,
            "LoanAmount": null,
            "Dependents": 0
        }"#;
        let record: ApplicantRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.len(), 5);
        assert_eq!(
            record.lookup("Gender"),
            FieldLookup::Present(&FieldValue::Text("Male".to_string()))
        );
        assert_eq!(record.lookup("LoanAmount"), FieldLookup::Missing);
        assert_eq!(record.lookup("Credit_History"), FieldLookup::Absent);

        match record.lookup("Dependents") {
            FieldLookup::Present(value) => assert_eq!(value.as_category(), "0"),
            other => panic!("unexpected lookup {:?}", other),
        }
    }

    #[test]
    fn test_blank_text_is_missing() {
        let record = ApplicantRecord::new().with("Married", "  ");
        assert_eq!(record.lookup("Married"), FieldLookup::Missing);
    }

    #[test]
    fn test_numeric_interpretation() {
        assert_eq!(FieldValue::from(360.0).as_number(), Some(360.0));
        assert_eq!(FieldValue::from(" 128 ").as_number(), Some(128.0));
        assert_eq!(FieldValue::from("abc").as_number(), None);
        assert_eq!(FieldValue::Number(f64::NAN).as_number(), None);
        assert_eq!(FieldValue::from(1.5).as_category(), "1.5");
    }
}
