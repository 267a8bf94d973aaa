//! Single reader of the event queue: statistics + fan-out to the attached sink

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use flume::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::event::PipelineEvent;
use super::stats::{Statistics, StatsSnapshot};
use super::SinkSlot;

pub(crate) struct Aggregator {
    pub(crate) events: Receiver<PipelineEvent>,
    pub(crate) stats: Statistics,
    pub(crate) published: Arc<ArcSwap<StatsSnapshot>>,
    pub(crate) sink: Arc<SinkSlot>,
    pub(crate) poll: Duration,
    /// Set once the producer and consumer have been joined
    pub(crate) drain: CancellationToken,
}

impl Aggregator {
    pub(crate) async fn run(mut self) {
        debug!("Aggregator started");

        loop {
            match tokio::time::timeout(self.poll, self.events.recv_async()).await {
                Ok(Ok(event)) => self.dispatch(event),
                // Every sender is gone and the queue is empty
                Ok(Err(_)) => break,
                Err(_) => {
                    if self.drain.is_cancelled() && self.events.is_empty() {
                        break;
                    }
                }
            }
        }

        self.dispatch(PipelineEvent::status("Monitoring stopped"));
        info!("Aggregator stopped: {}", self.stats.snapshot());
    }

    fn dispatch(&mut self, event: PipelineEvent) {
        self.stats.record(&event);
        record_metrics(&event);

        let snapshot = Arc::new(self.stats.snapshot());
        self.published.store(snapshot.clone());

        if let Some(sink) = self.sink.load_full() {
            sink.on_event(&event, &snapshot);
        }
    }
}

fn record_metrics(event: &PipelineEvent) {
    match event {
        PipelineEvent::CaptureDone { size_bytes, .. } => {
            metrics::counter!("screenwatch_captures_total").increment(1);
            metrics::histogram!("screenwatch_capture_bytes").record(*size_bytes as f64);
        }
        PipelineEvent::AnalysisDone {
            duration, outcome, ..
        } => {
            let label = if outcome.is_success() { "success" } else { "failure" };
            metrics::counter!("screenwatch_analyses_total", "outcome" => label).increment(1);
            metrics::histogram!("screenwatch_analysis_seconds").record(duration.as_secs_f64());
        }
        PipelineEvent::Error { .. } => {
            metrics::counter!("screenwatch_errors_total").increment(1);
        }
        PipelineEvent::Status { .. } => {}
    }
}
