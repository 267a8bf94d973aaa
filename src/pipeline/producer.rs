//! Capture producer: one attempt per cadence tick, scheduled on absolute time

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use flume::Sender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::PipelineEvent;
use super::{CaptureTask, TaskMessage};
use crate::capture::{CaptureError, Frame, FrameSource};
use crate::imaging;
use crate::storage::{FrameStore, PersistError};

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("save failed: {0}")]
    Persist(#[from] PersistError),
}

pub(crate) struct Producer {
    pub(crate) source: Arc<dyn FrameSource>,
    pub(crate) store: Arc<dyn FrameStore>,
    pub(crate) cadence: Duration,
    pub(crate) poll: Duration,
    pub(crate) target: (u32, u32),
    pub(crate) output_dir: PathBuf,
    pub(crate) tasks: Sender<TaskMessage>,
    pub(crate) events: Sender<PipelineEvent>,
    pub(crate) cancel: CancellationToken,
}

impl Producer {
    pub(crate) async fn run(self) {
        info!(
            "Capture producer started (source: {}, cadence: {:?})",
            self.source.name(),
            self.cadence
        );

        let mut sequence: u64 = 0;
        let mut next_capture = Instant::now();

        while !self.cancel.is_cancelled() {
            if Instant::now() >= next_capture {
                let attempt = sequence + 1;
                match self.capture_once(attempt).await {
                    Ok(task) => {
                        sequence = attempt;
                        if self.tasks.send(TaskMessage::Capture(task)).is_err() {
                            warn!("Task queue closed, stopping producer");
                            break;
                        }
                    }
                    Err(e) => {
                        // Same sequence is tried again on the next tick
                        warn!("Capture #{} failed: {}", attempt, e);
                        self.emit(PipelineEvent::error(format!("Capture #{attempt} failed: {e}")));
                    }
                }

                // Absolute schedule: latency of this attempt does not push later ticks
                next_capture += self.cadence;
                if next_capture < Instant::now() {
                    debug!("Capture #{} overran the cadence", attempt);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll) => {}
            }
        }

        info!("Capture producer stopped after {} captures", sequence);
    }

    async fn capture_once(&self, sequence: u64) -> Result<CaptureTask, AttemptError> {
        self.emit(PipelineEvent::status(format!(
            "Capturing frame #{sequence}..."
        )));

        let raw = self.source.capture().await?;
        let frame = self.fit(raw).await?;

        let captured_at = Local::now();
        let path = self
            .output_dir
            .join(format!("live_{}_{}.png", captured_at.timestamp(), sequence));
        let size_bytes = self.store.persist(&frame, &path).await?;

        debug!(
            "Captured frame #{} ({}x{}, {} bytes)",
            sequence,
            frame.width(),
            frame.height(),
            size_bytes
        );

        self.emit(PipelineEvent::CaptureDone {
            sequence,
            size_bytes,
            path,
            width: frame.width(),
            height: frame.height(),
            at: Local::now(),
        });

        Ok(CaptureTask {
            sequence,
            frame,
            captured_at,
        })
    }

    async fn fit(&self, raw: Frame) -> Result<Frame, AttemptError> {
        let (max_w, max_h) = self.target;
        let (w, h) = raw.dimensions();
        if imaging::fit_dimensions(w, h, max_w, max_h) == (w, h) {
            return Ok(raw);
        }

        tokio::task::spawn_blocking(move || imaging::fit_within(&raw, max_w, max_h))
            .await
            .map_err(|e| AttemptError::Resize(e.to_string()))
    }

    fn emit(&self, event: PipelineEvent) {
        // The aggregator outlives the producer, a closed queue means teardown
        let _ = self.events.send(event);
    }
}
