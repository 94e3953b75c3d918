//! Loan Approval Explainer - Main Entry Point
//!
//! `train` fits and persists an artifact set, `explain` reads applicant
//! records as JSON lines and writes one explanation per line, `info` prints
//! the loaded model's input domain.

use anyhow::{bail, Context, Result};
use futures::{future, stream, StreamExt};
use loan_approval_explainer::{
    config::{AppConfig, LoggingConfig},
    lifecycle::ModelLifecycle,
    metrics::ExplanationMetrics,
    models::loader::ArtifactStore,
    training::Trainer,
    ApplicantRecord, InferenceContext, PipelineError,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: loan-explainer <train | explain <records.jsonl | -> | info>";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("LOAN_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
    let config = AppConfig::load_from_path(&config_path)?;
    init_logging(&config.logging)?;
    info!(config = %config_path, "Configuration loaded");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("train") => train(&config),
        Some("explain") => {
            let source = args.get(1).map(String::as_str).unwrap_or("-");
            explain(&config, source).await
        }
        Some("info") => info_command(&config),
        _ => bail!(USAGE),
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(
        format!("loan_approval_explainer={}", logging.level)
            .parse()
            .context("Invalid logging level")?,
    );
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.pretty().init(),
    }
    Ok(())
}

fn train(config: &AppConfig) -> Result<()> {
    info!(dataset = %config.artifacts.dataset_path.display(), "Training model");
    let outcome = Trainer::new(config.training.clone())
        .train_from_path(&config.artifacts.dataset_path)
        .context("Training failed")?;
    ArtifactStore::new(config.artifacts.path.clone())
        .save(&outcome.artifacts)
        .context("Failed to persist artifact set")?;

    println!("{}", outcome.report);
    println!(
        "Artifact set {} written to {}",
        outcome.artifacts.version,
        config.artifacts.path.display()
    );
    Ok(())
}

fn info_command(config: &AppConfig) -> Result<()> {
    let context = initialize(config)?;
    println!("{}", serde_json::to_string_pretty(context.model_info())?);
    Ok(())
}

fn initialize(config: &AppConfig) -> Result<Arc<InferenceContext>> {
    let mut lifecycle = ModelLifecycle::from_config(config);
    lifecycle.initialize().context("Failed to initialize model")
}

async fn explain(config: &AppConfig, source: &str) -> Result<()> {
    let context = initialize(config)?;
    let metrics = Arc::new(ExplanationMetrics::new());

    let reader: Box<dyn AsyncRead + Unpin + Send> = if source == "-" {
        Box::new(tokio::io::stdin())
    } else {
        let file = tokio::fs::File::open(source)
            .await
            .with_context(|| format!("Cannot open {}", source))?;
        Box::new(file)
    };

    let workers = config.pipeline.workers.max(1);
    info!(
        source = %source,
        workers = workers,
        version = %context.version(),
        "Explaining applicants"
    );

    // Numbered input lines; a read error ends the stream after it is yielded
    let initial = Some((BufReader::new(reader).lines(), 0usize));
    let lines = stream::unfold(initial, |state| async move {
        let (mut lines, line_no) = state?;
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok((line_no + 1, line)), Some((lines, line_no + 1)))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    });

    let results = lines
        .filter(|item| future::ready(!matches!(item, Ok((_, line)) if line.trim().is_empty())))
        .map(|item| {
            let context = Arc::clone(&context);
            let metrics = Arc::clone(&metrics);
            async move {
                let (line_no, line) = item.context("Failed to read input")?;
                tokio::task::spawn_blocking(move || {
                    explain_line(&context, &metrics, line_no, &line)
                })
                .await
                .context("Explanation task panicked")
            }
        })
        .buffered(workers);
    futures::pin_mut!(results);

    let mut out = std::io::stdout();
    while let Some(output) = results.next().await {
        writeln!(out, "{}", output?)?;
        out.flush()?;
    }

    metrics.print_summary();
    Ok(())
}

fn explain_line(
    context: &InferenceContext,
    metrics: &ExplanationMetrics,
    line_no: usize,
    line: &str,
) -> serde_json::Value {
    let start = Instant::now();
    let outcome = serde_json::from_str::<ApplicantRecord>(line)
        .map_err(PipelineError::from)
        .and_then(|record| context.explain(&record));

    match outcome {
        Ok(explanation) => {
            metrics.record_explanation(start.elapsed(), &explanation);
            serde_json::to_value(&explanation)
                .unwrap_or_else(|e| json!({ "line": line_no, "error": e.to_string() }))
        }
        Err(e) => {
            warn!(line = line_no, kind = e.kind(), error = %e, "Explanation failed");
            metrics.record_failure(&e);
            json!({
                "line": line_no,
                "error": e.to_string(),
                "kind": e.kind(),
                "client_error": e.is_client_error(),
            })
        }
    }
}
