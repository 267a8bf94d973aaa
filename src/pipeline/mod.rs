//! Capture → analyze → aggregate pipeline
//!
//! Three tasks per run, connected only by two flume queues:
//! - the producer captures on a fixed cadence and pushes `CaptureTask`s onto
//!   an unbounded task queue, plus status/capture events onto the event queue
//! - the consumer pulls tasks one at a time, calls the analyzer and pushes
//!   `AnalysisDone` events
//! - the aggregator is the only reader of the event queue and the only writer
//!   of `Statistics`; it publishes snapshots and forwards events to the sink
//!
//! A slow analyzer grows the task queue; the producer is never blocked.

mod aggregator;
mod consumer;
pub mod controller;
pub mod event;
mod producer;
pub mod state;
pub mod stats;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{Collaborators, Pipeline, ShutdownReport};
pub use event::{AnalysisOutcome, PipelineEvent};
pub use state::PipelineState;
pub use stats::{Statistics, StatsReader, StatsSnapshot};
pub use supervisor::WorkerExit;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Local};

use crate::capture::Frame;
use crate::display::EventSink;
use crate::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("monitoring is already running")]
    AlreadyRunning,

    #[error("monitoring is not running")]
    NotRunning,

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("{worker} worker failed: {reason}")]
    WorkerFailed { worker: &'static str, reason: String },
}

/// One captured frame waiting for analysis
#[derive(Debug, Clone)]
pub struct CaptureTask {
    /// Starts at 1, +1 per successful capture
    pub sequence: u64,
    pub frame: Frame,
    pub captured_at: DateTime<Local>,
}

/// Task queue item; `Shutdown` unparks a consumer waiting on an empty queue
#[derive(Debug)]
pub(crate) enum TaskMessage {
    Capture(CaptureTask),
    Shutdown,
}

/// Currently attached presentation sink, swappable while running
pub(crate) type SinkSlot = ArcSwapOption<Box<dyn EventSink>>;
