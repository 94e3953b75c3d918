//! Request statistics for the explanation pipeline.

use crate::error::PipelineError;
use crate::types::explanation::{Decision, Explanation};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for explanation requests
pub struct ExplanationMetrics {
    /// Applications explained successfully
    pub explanations_served: AtomicU64,
    /// Explanations with an approved decision
    pub approvals: AtomicU64,
    /// Failures by error kind
    failures: RwLock<BTreeMap<&'static str, u64>>,
    /// Latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Approval probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ExplanationMetrics {
    pub fn new() -> Self {
        Self {
            explanations_served: AtomicU64::new(0),
            approvals: AtomicU64::new(0),
            failures: RwLock::new(BTreeMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a successful explanation
    pub fn record_explanation(&self, latency: Duration, explanation: &Explanation) {
        self.explanations_served.fetch_add(1, Ordering::Relaxed);
        if explanation.decision() == Decision::Approved {
            self.approvals.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = (explanation.probability.approved * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a failed request
    pub fn record_failure(&self, error: &PipelineError) {
        if let Ok(mut failures) = self.failures.write() {
            *failures.entry(error.kind()).or_insert(0) += 1;
        }
    }

    pub fn latency_stats(&self) -> LatencyStats {
        let times = match self.latencies.read() {
            Ok(times) => times,
            Err(_) => return LatencyStats::default(),
        };
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    pub fn failures(&self) -> BTreeMap<&'static str, u64> {
        self.failures.read().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn failure_count(&self) -> u64 {
        self.failures().values().sum()
    }

    pub fn probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Explanations per second since creation
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.explanations_served.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let served = self.explanations_served.load(Ordering::Relaxed);
        let approvals = self.approvals.load(Ordering::Relaxed);
        let approval_rate = if served > 0 {
            approvals as f64 / served as f64 * 100.0
        } else {
            0.0
        };
        let latency = self.latency_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║           LOAN EXPLANATION PIPELINE - METRICS SUMMARY        ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Explained: {:>8}  │  Throughput: {:>8.1} req/s              ║",
            served,
            self.throughput()
        );
        info!(
            "║ Approved:  {:>8}  │  Approval Rate: {:>6.1}%                ║",
            approvals, approval_rate
        );
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}       ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        let failures = self.failures();
        if failures.is_empty() {
            info!("║ Failures: none                                               ║");
        } else {
            info!("║ Failures by kind:                                            ║");
            for (kind, count) in &failures {
                info!("║   {:16}: {:>6}", kind, count);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Approval Probability Distribution:                           ║");
        let distribution = self.probability_distribution();
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 { count as f64 / total as f64 * 100.0 } else { 0.0 };
            let bar = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ExplanationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}
