//! Error types for the loan explanation pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required field name is absent from the applicant record.
    #[error("Schema error: required field '{field}' is absent")]
    Schema { field: String },

    /// A field is present but its value cannot be interpreted.
    #[error("Invalid value for field '{field}': {value}")]
    InvalidValue { field: String, value: String },

    /// A value is missing and the fitted statistics have no fallback for it.
    #[error("Imputation gap: no fitted statistic for field '{field}'")]
    ImputationGap { field: String },

    /// Attribution features do not line up with the feature vector.
    #[error("Explanation error: {0}")]
    Explanation(String),

    #[error("Training data error: {0}")]
    TrainingData(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl PipelineError {
    /// True when the failure is caused by the caller's input rather than by
    /// the loaded artifacts or the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Schema { .. } | PipelineError::InvalidValue { .. }
        )
    }

    /// Short stable name used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Schema { .. } => "schema",
            PipelineError::InvalidValue { .. } => "invalid_value",
            PipelineError::ImputationGap { .. } => "imputation_gap",
            PipelineError::Explanation(_) => "explanation",
            PipelineError::TrainingData(_) => "training_data",
            PipelineError::Artifact(_) => "artifact",
            PipelineError::Lifecycle(_) => "lifecycle",
            PipelineError::Io(_) => "io",
            PipelineError::Json(_) => "json",
            PipelineError::Csv(_) => "csv",
            PipelineError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        let schema = PipelineError::Schema {
            field: "Credit_History".to_string(),
        };
        assert!(schema.is_client_error());
        assert_eq!(schema.kind(), "schema");

        let gap = PipelineError::ImputationGap {
            field: "LoanAmount".to_string(),
        };
        assert!(!gap.is_client_error());
        assert!(!PipelineError::Explanation("mismatch".to_string()).is_client_error());
    }

    #[test]
    fn test_error_messages_name_the_field() {
        let err = PipelineError::Schema {
            field: "Credit_History".to_string(),
        };
        assert!(err.to_string().contains("Credit_History"));
    }
}
