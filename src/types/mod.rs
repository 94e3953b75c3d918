//! Type definitions for the loan explanation pipeline

pub mod applicant;
pub mod explanation;

pub use applicant::{ApplicantRecord, FieldLookup, FieldValue};
pub use explanation::{ClassProbabilities, Decision, Explanation, Prediction};
