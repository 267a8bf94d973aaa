//! Remote frame analysis

pub mod openrouter;

pub use openrouter::OpenRouterAnalyzer;

use std::time::Duration;

use async_trait::async_trait;

use crate::capture::Frame;
use crate::pipeline::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("environment variable {0} is not set")]
    MissingCredential(String),

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// Turns a frame into a textual description.
///
/// The pipeline calls `analyze` from a single consumer, one frame at a time,
/// and bounds every call with its own timeout.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Checked by the controller before any worker is spawned
    fn preflight(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn analyze(&self, frame: &Frame) -> Result<String, AnalysisError>;

    /// Model identifier, used in status messages
    fn model(&self) -> &str;
}
