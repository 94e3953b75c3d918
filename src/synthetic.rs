//! Synthetic loan applications for local runs and tests.
//!
//! Rows follow the training CSV schema. Approval is drawn from a logistic
//! model dominated by credit history, with income, loan size and property
//! area as secondary effects, and a small share of cells left empty.

use crate::error::Result;
use crate::schema::{ID_COLUMN, LABEL_COLUMN};
use crate::training::dataset::LabeledDataset;
use crate::types::applicant::{ApplicantRecord, FieldValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;

/// Column order of generated CSV files
pub const CSV_COLUMNS: [&str; 13] = [
    ID_COLUMN,
    "Gender",
    "Married",
    "Dependents",
    "Education",
    "Self_Employed",
    "ApplicantIncome",
    "CoapplicantIncome",
    "LoanAmount",
    "Loan_Amount_Term",
    "Credit_History",
    "Property_Area",
    LABEL_COLUMN,
];

/// Seeded generator of loan application rows.
pub struct LoanGenerator {
    rng: StdRng,
    counter: u64,
    missing_rate: f64,
}

impl LoanGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            counter: 0,
            missing_rate: 0.03,
        }
    }

    /// Fraction of optional cells left empty (default 3%)
    pub fn with_missing_rate(mut self, rate: f64) -> Self {
        self.missing_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Generate one row as CSV cells in [`CSV_COLUMNS`] order.
    pub fn generate_row(&mut self) -> Vec<String> {
        self.counter += 1;

        let gender = self.choose(&["Male", "Male", "Male", "Female"]);
        let married = self.choose(&["Yes", "Yes", "No"]);
        let dependents = self.choose(&["0", "0", "0", "1", "2", "3+"]);
        let education = self.choose(&["Graduate", "Graduate", "Graduate", "Not Graduate"]);
        let self_employed = self.choose(&["No", "No", "No", "No", "No", "Yes"]);
        let area = self.choose(&["Urban", "Semiurban", "Rural"]);

        let income: f64 = (self.rng.gen_range(7.3..9.6f64)).exp().round();
        let coapplicant: f64 = if self.rng.gen_bool(0.45) {
            0.0
        } else {
            self.rng.gen_range(500.0..4000.0f64).round()
        };
        let loan_amount: f64 =
            ((income + coapplicant) / 45.0 + self.rng.gen_range(-40.0..60.0f64)).max(9.0).round();
        let term = self.choose(&["360", "360", "360", "360", "180", "480", "300", "120"]);
        let credit_history = if self.rng.gen_bool(0.84) { 1.0 } else { 0.0 };

        let mut logit = -1.6 + 3.2 * credit_history;
        logit += 0.00006 * (income + coapplicant - 5000.0);
        logit -= 0.004 * (loan_amount - 140.0);
        logit += match area {
            "Semiurban" => 0.6,
            "Rural" => -0.3,
            _ => 0.0,
        };
        if married == "Yes" {
            logit += 0.2;
        }
        let p_approved = 1.0 / (1.0 + (-logit).exp());
        let status = if self.rng.gen_bool(p_approved) { "Y" } else { "N" };

        let mut row = vec![
            format!("LP{:06}", self.counter),
            gender.to_string(),
            married.to_string(),
            dependents.to_string(),
            education.to_string(),
            self_employed.to_string(),
            format!("{}", income),
            format!("{}", coapplicant),
            format!("{}", loan_amount),
            term.to_string(),
            format!("{}", credit_history),
            area.to_string(),
            status.to_string(),
        ];

        // Leave some optional cells empty, as in the real data
        for index in [1, 2, 3, 5, 8, 9, 10] {
            if self.rng.gen_bool(self.missing_rate) {
                row[index].clear();
            }
        }
        row
    }

    /// Write `count` rows with a header as CSV.
    pub fn write_csv<W: Write>(&mut self, writer: W, count: usize) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(CSV_COLUMNS)?;
        for _ in 0..count {
            csv.write_record(self.generate_row())?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Generate `count` rows as an in-memory labeled dataset.
    pub fn dataset(&mut self, count: usize) -> Result<LabeledDataset> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer, count)?;
        LabeledDataset::from_reader(buffer.as_slice())
    }

    fn choose<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

/// The applicant used in documentation and end-to-end checks.
pub fn reference_applicant() -> ApplicantRecord {
    ApplicantRecord::new()
        .with("Credit_History", 1.0)
        .with("ApplicantIncome", 5000.0)
        .with("CoapplicantIncome", 0.0)
        .with("LoanAmount", 150.0)
        .with("Loan_Amount_Term", 360.0)
        .with("Gender", "Male")
        .with("Married", "Yes")
        .with("Dependents", "0")
        .with("Education", "Graduate")
        .with("Self_Employed", "No")
        .with("Property_Area", FieldValue::from("Urban"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_match_columns() {
        let mut generator = LoanGenerator::new(1);
        for _ in 0..20 {
            assert_eq!(generator.generate_row().len(), CSV_COLUMNS.len());
        }
    }

    #[test]
    fn test_generation_is_seeded() {
        let a: Vec<Vec<String>> = {
            let mut g = LoanGenerator::new(9);
            (0..5).map(|_| g.generate_row()).collect()
        };
        let b: Vec<Vec<String>> = {
            let mut g = LoanGenerator::new(9);
            (0..5).map(|_| g.generate_row()).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_dataset_has_both_classes() {
        let dataset = LoanGenerator::new(42).dataset(300).unwrap();
        let [rejected, approved] = dataset.class_counts();
        assert_eq!(dataset.len(), 300);
        assert!(rejected > 30);
        assert!(approved > 100);
    }
}
