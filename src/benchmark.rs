//! Side-by-side comparison of vision models on a single frame

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::analysis::{AnalysisError, Analyzer};
use crate::capture::Frame;
use crate::pipeline::AnalysisOutcome;

/// Longest error text shown in a table cell
const ERROR_CELL_CHARS: usize = 50;

/// One model's attempt at the shared frame
#[derive(Debug, Clone, Serialize)]
pub struct ModelRun {
    pub model: String,
    pub latency: Duration,
    pub outcome: AnalysisOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub started_at: DateTime<Local>,
    /// Successful runs first, each group by ascending latency
    pub runs: Vec<ModelRun>,
}

/// Send `frame` to every analyzer in turn, waiting `pause` between requests.
///
/// Each call is bounded by `timeout`; a slow model is recorded as failed and the
/// run moves on.
pub async fn run(
    frame: &Frame,
    analyzers: &[Arc<dyn Analyzer>],
    timeout: Duration,
    pause: Duration,
) -> BenchmarkReport {
    let started_at = Local::now();
    let mut runs = Vec::with_capacity(analyzers.len());

    for (i, analyzer) in analyzers.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let model = analyzer.model().to_string();
        info!("Testing {}/{}: {}", i + 1, analyzers.len(), model);

        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, analyzer.analyze(frame)).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Timeout(timeout)),
        };
        let latency = started.elapsed();

        let outcome = match result {
            Ok(response) => {
                info!("{} answered in {:.3}s ({} chars)", model, latency.as_secs_f64(), response.len());
                AnalysisOutcome::Success { response }
            }
            Err(e) => {
                warn!("{} failed after {:.3}s: {}", model, latency.as_secs_f64(), e);
                AnalysisOutcome::Failure {
                    error: e.to_string(),
                }
            }
        };

        runs.push(ModelRun {
            model,
            latency,
            outcome,
        });
    }

    runs.sort_by_key(|run| (!run.outcome.is_success(), run.latency));
    BenchmarkReport { started_at, runs }
}

impl BenchmarkReport {
    pub fn successful(&self) -> impl Iterator<Item = &ModelRun> {
        self.runs.iter().filter(|run| run.outcome.is_success())
    }

    /// Ranked table plus a summary of the successful runs
    pub fn to_markdown(&self) -> String {
        let mut md = String::from("# Vision Model Benchmark Results\n\n");
        let _ = writeln!(
            md,
            "Test conducted at: {}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        md.push_str("| Rank | Model ID | Analyze Time (s) | Status | Error |\n");
        md.push_str("|------|----------|------------------|--------|-------|\n");

        for (rank, run) in self.runs.iter().enumerate() {
            let (status, error) = match &run.outcome {
                AnalysisOutcome::Success { .. } => ("Success", "-".to_string()),
                AnalysisOutcome::Failure { error } => ("Failed", truncate(error)),
            };
            let _ = writeln!(
                md,
                "| {} | `{}` | {:.3} | {} | {} |",
                rank + 1,
                run.model,
                run.latency.as_secs_f64(),
                status,
                error
            );
        }

        let latencies: Vec<f64> = self.successful().map(|run| run.latency.as_secs_f64()).collect();
        let Some(fastest) = self.successful().next() else {
            return md;
        };

        let slowest = latencies.iter().copied().fold(0.0, f64::max);
        let average = latencies.iter().sum::<f64>() / latencies.len() as f64;

        md.push_str("\n## Summary\n\n");
        let _ = writeln!(md, "- Total models tested: {}", self.runs.len());
        let _ = writeln!(md, "- Successful: {}", latencies.len());
        let _ = writeln!(md, "- Failed: {}", self.runs.len() - latencies.len());
        let _ = writeln!(
            md,
            "- Fastest successful: {:.3}s ({})",
            fastest.latency.as_secs_f64(),
            fastest.model
        );
        let _ = writeln!(md, "- Slowest successful: {slowest:.3}s");
        let _ = writeln!(md, "- Average time: {average:.3}s");
        md
    }
}

fn truncate(error: &str) -> String {
    // Pipes would break the table row
    let error = error.replace('|', "/").replace('\n', " ");
    if error.chars().count() <= ERROR_CELL_CHARS {
        return error;
    }
    let head: String = error.chars().take(ERROR_CELL_CHARS - 3).collect();
    format!("{head}...")
}
