//! Scripted collaborators for driving the pipeline under a paused clock

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use tokio::time::Instant;

use super::{AnalysisOutcome, Collaborators, Pipeline, PipelineError, PipelineEvent, StatsSnapshot};
use crate::analysis::{AnalysisError, Analyzer};
use crate::capture::{CaptureError, Frame, FrameSource};
use crate::display::EventSink;
use crate::storage::{FrameStore, PersistError};
use crate::{Config, ConfigError};

pub(crate) const FRAME_SIZE: (u32, u32) = (16, 9);

/// Pipeline with default timings, the given cadence and an in-memory store
pub(crate) fn test_pipeline(
    cadence: Duration,
    source: ScriptedSource,
    analyzer: ScriptedAnalyzer,
) -> Pipeline {
    let mut config = Config::default();
    config.capture.cadence_ms = cadence.as_millis() as u64;
    config.capture.target_width = FRAME_SIZE.0;
    config.capture.target_height = FRAME_SIZE.1;

    Pipeline::new(
        config,
        Collaborators {
            source: Arc::new(source),
            analyzer: Arc::new(analyzer),
            store: Arc::new(MemoryStore),
        },
    )
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedSource {
    latency: Duration,
    failing: Arc<HashSet<u64>>,
    attempts: Arc<AtomicU64>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail these attempts (1-based call numbers)
    pub(crate) fn failing_on(mut self, attempts: &[u64]) -> Self {
        self.failing = Arc::new(attempts.iter().copied().collect());
        self
    }

    pub(crate) fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.contains(&attempt) {
            return Err(CaptureError::Unavailable("permission denied".into()));
        }
        Ok(Frame::from_rgba(RgbaImage::new(FRAME_SIZE.0, FRAME_SIZE.1)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub(crate) struct ScriptedAnalyzer {
    latency: Duration,
    fail_every: Option<u64>,
    has_credential: bool,
    calls: AtomicU64,
    model: String,
}

impl ScriptedAnalyzer {
    pub(crate) fn new(latency: Duration) -> Self {
        Self {
            latency,
            fail_every: None,
            has_credential: true,
            calls: AtomicU64::new(0),
            model: "scripted-model".into(),
        }
    }

    pub(crate) fn named(mut self, model: &str) -> Self {
        self.model = model.into();
        self
    }

    /// Every `n`th call returns an HTTP error
    pub(crate) fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n);
        self
    }

    pub(crate) fn without_credential(mut self) -> Self {
        self.has_credential = false;
        self
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn preflight(&self) -> Result<(), PipelineError> {
        if self.has_credential {
            Ok(())
        } else {
            Err(ConfigError::MissingCredential("OPENROUTER_API_KEY".into()).into())
        }
    }

    async fn analyze(&self, _frame: &Frame) -> Result<String, AnalysisError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.latency).await;
        match self.fail_every {
            Some(n) if call % n == 0 => Err(AnalysisError::Http {
                status: 429,
                body: "rate limited".into(),
            }),
            _ => Ok(format!("analysis #{call}")),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

pub(crate) struct MemoryStore;

#[async_trait]
impl FrameStore for MemoryStore {
    async fn persist(&self, frame: &Frame, _path: &Path) -> Result<u64, PersistError> {
        Ok(frame.len() as u64)
    }
}

type Recorded = (Instant, PipelineEvent, StatsSnapshot);

#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: &PipelineEvent, stats: &StatsSnapshot) {
        self.events
            .lock()
            .unwrap()
            .push((Instant::now(), event.clone(), stats.clone()));
    }
}

impl RecordingSink {
    pub(crate) fn events_with_times(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn events(&self) -> Vec<(PipelineEvent, StatsSnapshot)> {
        self.events_with_times()
            .into_iter()
            .map(|(_, event, stats)| (event, stats))
            .collect()
    }

    pub(crate) fn capture_times(&self) -> Vec<Instant> {
        self.events_with_times()
            .into_iter()
            .filter(|(_, event, _)| matches!(event, PipelineEvent::CaptureDone { .. }))
            .map(|(at, _, _)| at)
            .collect()
    }

    pub(crate) fn capture_sequences(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|(event, _)| match event {
                PipelineEvent::CaptureDone { sequence, .. } => Some(sequence),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn analysis_sequences(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|(event, _)| match event {
                PipelineEvent::AnalysisDone { sequence, .. } => Some(sequence),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn analysis_outcomes(&self) -> Vec<AnalysisOutcome> {
        self.events()
            .into_iter()
            .filter_map(|(event, _)| match event {
                PipelineEvent::AnalysisDone { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn error_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|(event, _)| matches!(event, PipelineEvent::Error { .. }))
            .count()
    }
}
