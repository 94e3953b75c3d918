//! Synthetic Loan Dataset Generator
//!
//! Writes a CSV with the training schema for local runs.
//!
//! usage: generate-dataset [output.csv] [rows] [seed] [missing_rate]

use anyhow::Context;
use loan_approval_explainer::synthetic::LoanGenerator;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_dataset=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let output = args.get(1).map(|s| s.as_str()).unwrap_or("data/loans.csv");
    let rows: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(614);
    let seed: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(42);
    let missing_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.03);

    let path = Path::new(output);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Cannot create {}", output))?;

    LoanGenerator::new(seed)
        .with_missing_rate(missing_rate)
        .write_csv(BufWriter::new(file), rows)?;

    info!(
        output = %output,
        rows = rows,
        seed = seed,
        missing_rate = missing_rate,
        "Dataset written"
    );
    Ok(())
}
