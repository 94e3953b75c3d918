//! Declared applicant fields and feature naming.
//!
//! The field lists here are the fixed input contract shared by the training
//! data loader and the inference-time preprocessor.

/// Numeric fields, passed through unscaled, in feature order.
pub const NUMERIC_FIELDS: [&str; 5] = [
    "ApplicantIncome",
    "CoapplicantIncome",
    "LoanAmount",
    "Loan_Amount_Term",
    "Credit_History",
];

/// Categorical fields, one-hot encoded, in feature order.
pub const CATEGORICAL_FIELDS: [&str; 6] = [
    "Gender",
    "Married",
    "Dependents",
    "Education",
    "Self_Employed",
    "Property_Area",
];

/// Identifier column present in training data and ignored by the pipeline.
pub const ID_COLUMN: &str = "Loan_ID";

/// Binary label column in training data.
pub const LABEL_COLUMN: &str = "Loan_Status";

/// Label value for an approved application.
pub const APPROVED: u8 = 1;

/// Label value for a rejected application.
pub const REJECTED: u8 = 0;

/// All required fields: numeric first, then categorical.
pub fn required_fields() -> impl Iterator<Item = &'static str> {
    NUMERIC_FIELDS.iter().chain(CATEGORICAL_FIELDS.iter()).copied()
}

pub fn is_numeric(field: &str) -> bool {
    NUMERIC_FIELDS.contains(&field)
}

pub fn numeric_feature_name(field: &str) -> String {
    format!("num__{}", field)
}

pub fn categorical_feature_name(field: &str, category: &str) -> String {
    format!("cat__{}_{}", field, category)
}

/// Parse a label cell (`Y`/`N`, or `1`/`0`).
pub fn parse_label(raw: &str) -> Option<u8> {
    match raw.trim() {
        "Y" | "y" | "1" => Some(APPROVED),
        "N" | "n" | "0" => Some(REJECTED),
        _ => None,
    }
}
