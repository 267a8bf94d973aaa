//! Pipeline lifecycle: refuse double starts, bounded and escalating stop

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use flume::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::aggregator::Aggregator;
use super::consumer::Consumer;
use super::event::PipelineEvent;
use super::producer::Producer;
use super::state::PipelineState;
use super::stats::{Statistics, StatsReader, StatsSnapshot};
use super::supervisor::{Worker, WorkerExit};
use super::{PipelineError, SinkSlot, TaskMessage};
use crate::analysis::Analyzer;
use crate::capture::FrameSource;
use crate::display::EventSink;
use crate::storage::FrameStore;
use crate::Config;

/// External collaborators the workers call into
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn FrameSource>,
    pub analyzer: Arc<dyn Analyzer>,
    pub store: Arc<dyn FrameStore>,
}

/// What `stop` had to do to get every worker down
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers aborted after the join window ran out
    pub forced: Vec<&'static str>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.forced.is_empty()
    }
}

struct ActiveRun {
    cancel: CancellationToken,
    drain: CancellationToken,
    tasks: Sender<TaskMessage>,
    producer: Worker,
    consumer: Worker,
    aggregator: Worker,
}

impl ActiveRun {
    fn abort_all(&self) {
        self.cancel.cancel();
        self.drain.cancel();
        self.producer.abort();
        self.consumer.abort();
        self.aggregator.abort();
    }
}

/// Owns one capture/analysis run at a time.
///
/// `start` must be called from within a Tokio runtime.
pub struct Pipeline {
    config: Config,
    collaborators: Collaborators,
    state: PipelineState,
    sink: Arc<SinkSlot>,
    stats: Arc<ArcSwap<StatsSnapshot>>,
    run: Option<ActiveRun>,
}

impl Pipeline {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            state: PipelineState::Idle,
            sink: Arc::new(ArcSwapOption::empty()),
            stats: Arc::new(ArcSwap::from_pointee(StatsSnapshot::default())),
            run: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Replace the presentation sink; takes effect from the next event
    pub fn attach_sink<S: EventSink + 'static>(&self, sink: S) {
        let sink: Box<dyn EventSink> = Box::new(sink);
        self.sink.store(Some(Arc::new(sink)));
    }

    pub fn detach_sink(&self) {
        self.sink.store(None);
    }

    /// Latest snapshot published by the aggregator
    pub fn stats(&self) -> Arc<StatsSnapshot> {
        self.stats.load_full()
    }

    pub fn stats_reader(&self) -> StatsReader {
        StatsReader::new(self.stats.clone())
    }

    /// Tasks waiting in the queue, not counting the one being analyzed
    pub fn task_queue_depth(&self) -> usize {
        self.run.as_ref().map(|run| run.tasks.len()).unwrap_or(0)
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if !self.state.is_idle() {
            warn!("Start requested while {}", self.state);
            return Err(PipelineError::AlreadyRunning);
        }

        self.collaborators.analyzer.preflight()?;

        let statistics = Statistics::new(self.config.pipeline.recent_events);
        self.stats.store(Arc::new(statistics.snapshot()));

        let (task_tx, task_rx) = flume::unbounded::<TaskMessage>();
        let (event_tx, event_rx) = flume::unbounded::<PipelineEvent>();
        let cancel = CancellationToken::new();
        let drain = CancellationToken::new();

        let _ = event_tx.send(PipelineEvent::status("Monitoring started"));

        let capture = &self.config.capture;
        let pipeline = &self.config.pipeline;
        let cadence = capture.cadence();

        let producer = Producer {
            source: self.collaborators.source.clone(),
            store: self.collaborators.store.clone(),
            cadence,
            poll: pipeline.producer_poll(),
            target: (capture.target_width, capture.target_height),
            output_dir: self.config.storage.output_dir.clone(),
            tasks: task_tx.clone(),
            events: event_tx.clone(),
            cancel: cancel.clone(),
        };

        let consumer = Consumer {
            analyzer: self.collaborators.analyzer.clone(),
            tasks: task_rx,
            events: event_tx,
            poll: pipeline.consumer_poll(),
            analysis_timeout: self.config.analysis.timeout(),
            cancel: cancel.clone(),
        };

        let aggregator = Aggregator {
            events: event_rx,
            stats: statistics,
            published: self.stats.clone(),
            sink: self.sink.clone(),
            poll: pipeline.aggregator_poll(),
            drain: drain.clone(),
        };

        self.run = Some(ActiveRun {
            cancel,
            drain,
            tasks: task_tx,
            aggregator: Worker::spawn("aggregator", aggregator.run()),
            consumer: Worker::spawn("consumer", consumer.run()),
            producer: Worker::spawn("producer", producer.run()),
        });
        self.transition(PipelineState::Running);

        info!(
            "Monitoring started (cadence: {:?}, model: {})",
            cadence,
            self.collaborators.analyzer.model()
        );
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<ShutdownReport, PipelineError> {
        let Some(run) = self.run.take() else {
            return Err(PipelineError::NotRunning);
        };
        self.transition(PipelineState::Stopping);
        info!("Stopping monitoring");

        let limit = self.config.pipeline.shutdown_timeout();
        // Back to Idle however this future ends, dropped mid-join included
        let idle = IdleOnDrop(&mut self.state);

        run.cancel.cancel();
        let _ = run.tasks.send(TaskMessage::Shutdown);
        drop(run.tasks);

        let producer_name = run.producer.name();
        let consumer_name = run.consumer.name();
        let (producer_exit, consumer_exit) = tokio::join!(
            run.producer.join_within(limit),
            run.consumer.join_within(limit)
        );

        // Workers are gone, let the aggregator flush what they left behind
        run.drain.cancel();
        let aggregator_name = run.aggregator.name();
        let aggregator_exit = run.aggregator.join_within(limit).await;
        drop(idle);

        let mut report = ShutdownReport::default();
        let mut failure = None;
        for (name, exit) in [
            (producer_name, producer_exit),
            (consumer_name, consumer_exit),
            (aggregator_name, aggregator_exit),
        ] {
            match exit {
                WorkerExit::Finished => {}
                WorkerExit::ForceTerminated => report.forced.push(name),
                WorkerExit::Panicked(reason) => {
                    failure.get_or_insert(PipelineError::WorkerFailed {
                        worker: name,
                        reason,
                    });
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        if report.is_clean() {
            info!("Monitoring stopped");
        } else {
            warn!("Monitoring stopped, force-terminated: {:?}", report.forced);
        }
        Ok(report)
    }
}

/// Resets the state when `stop` finishes or is abandoned
struct IdleOnDrop<'a>(&'a mut PipelineState);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.0 = PipelineState::Idle;
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.abort_all();
        }
    }
}
