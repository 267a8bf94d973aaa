//! Messages flowing from the workers to the aggregator

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::analysis::AnalysisError;

/// Everything the producer and consumer report, in emission order
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Status {
        message: String,
        at: DateTime<Local>,
    },
    CaptureDone {
        sequence: u64,
        size_bytes: u64,
        path: PathBuf,
        width: u32,
        height: u32,
        at: DateTime<Local>,
    },
    AnalysisDone {
        sequence: u64,
        duration: Duration,
        outcome: AnalysisOutcome,
        at: DateTime<Local>,
    },
    Error {
        message: String,
        at: DateTime<Local>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Success { response: String },
    Failure { error: String },
}

impl PipelineEvent {
    pub fn status(message: impl Into<String>) -> Self {
        PipelineEvent::Status {
            message: message.into(),
            at: Local::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        PipelineEvent::Error {
            message: message.into(),
            at: Local::now(),
        }
    }

    pub fn analysis(
        sequence: u64,
        duration: Duration,
        result: Result<String, AnalysisError>,
    ) -> Self {
        let outcome = match result {
            Ok(response) => AnalysisOutcome::Success { response },
            Err(e) => AnalysisOutcome::Failure {
                error: e.to_string(),
            },
        };
        PipelineEvent::AnalysisDone {
            sequence,
            duration,
            outcome,
            at: Local::now(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        match self {
            PipelineEvent::Status { at, .. }
            | PipelineEvent::CaptureDone { at, .. }
            | PipelineEvent::AnalysisDone { at, .. }
            | PipelineEvent::Error { at, .. } => *at,
        }
    }

    /// Capture sequence this event refers to, if any
    pub fn sequence(&self) -> Option<u64> {
        match self {
            PipelineEvent::CaptureDone { sequence, .. }
            | PipelineEvent::AnalysisDone { sequence, .. } => Some(*sequence),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::Status { .. } => "status",
            PipelineEvent::CaptureDone { .. } => "capture_done",
            PipelineEvent::AnalysisDone { .. } => "analysis_done",
            PipelineEvent::Error { .. } => "error",
        }
    }
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_constructor_maps_result() {
        let ok = PipelineEvent::analysis(3, Duration::from_millis(1500), Ok("text".into()));
        match ok {
            PipelineEvent::AnalysisDone {
                sequence, outcome, ..
            } => {
                assert_eq!(sequence, 3);
                assert!(outcome.is_success());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let failed = PipelineEvent::analysis(
            4,
            Duration::from_secs(60),
            Err(AnalysisError::Timeout(Duration::from_secs(60))),
        );
        match failed {
            PipelineEvent::AnalysisDone {
                outcome: AnalysisOutcome::Failure { error },
                ..
            } => assert!(error.contains("timed out")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_serialized_tags() {
        let json = serde_json::to_value(PipelineEvent::status("hello")).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["message"], "hello");

        let json = serde_json::to_value(PipelineEvent::analysis(
            1,
            Duration::from_secs(2),
            Ok("done".into()),
        ))
        .unwrap();
        assert_eq!(json["type"], "analysis_done");
        assert_eq!(json["outcome"]["status"], "success");
        assert_eq!(json["outcome"]["response"], "done");
    }
}
