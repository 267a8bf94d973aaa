//! Live text feed

use std::io::{self, Write};
use std::sync::Mutex;

use tracing::warn;

use super::EventSink;
use crate::pipeline::{AnalysisOutcome, PipelineEvent, StatsSnapshot};

const RULER_WIDTH: usize = 60;

pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    fn render(&self, event: &PipelineEvent) -> Vec<String> {
        let ts = event.timestamp().format("%H:%M:%S").to_string();

        match event {
            PipelineEvent::Status { message, .. } => vec![format!("[{ts}] {message}")],
            PipelineEvent::Error { message, .. } => vec![format!("[{ts}] ERROR {message}")],
            PipelineEvent::CaptureDone {
                sequence,
                size_bytes,
                path,
                width,
                height,
                ..
            } => vec![format!(
                "[{ts}] Frame #{sequence} saved: {} ({width}x{height}, {:.1} KB)",
                path.display(),
                *size_bytes as f64 / 1024.0
            )],
            PipelineEvent::AnalysisDone {
                sequence,
                duration,
                outcome,
                ..
            } => {
                let ruler = "-".repeat(RULER_WIDTH);
                let mut lines = vec![
                    String::new(),
                    format!("[{ts}] ANALYSIS COMPLETE - Frame #{sequence}"),
                    format!("[{ts}] Analysis time: {:.2}s", duration.as_secs_f64()),
                    ruler.clone(),
                ];
                match outcome {
                    AnalysisOutcome::Success { response } => lines.extend(
                        response
                            .lines()
                            .map(str::trim)
                            .filter(|line| !line.is_empty())
                            .map(|line| format!("[{ts}] > {line}")),
                    ),
                    AnalysisOutcome::Failure { error } => {
                        lines.push(format!("[{ts}] Analysis failed: {error}"))
                    }
                }
                lines.push(ruler);
                lines
            }
        }
    }
}

impl EventSink for ConsoleSink {
    fn on_event(&self, event: &PipelineEvent, _stats: &StatsSnapshot) {
        let lines = self.render(event);
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        for line in lines {
            if let Err(e) = writeln!(out, "{line}") {
                warn!("Console sink write failed: {}", e);
                return;
            }
        }
        let _ = out.flush();
    }
}
