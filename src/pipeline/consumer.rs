//! Analysis consumer: strictly serial, one remote call in flight

use std::sync::Arc;
use std::time::Duration;

use flume::Receiver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event::PipelineEvent;
use super::TaskMessage;
use crate::analysis::{AnalysisError, Analyzer};

pub(crate) struct Consumer {
    pub(crate) analyzer: Arc<dyn Analyzer>,
    pub(crate) tasks: Receiver<TaskMessage>,
    pub(crate) events: flume::Sender<PipelineEvent>,
    pub(crate) poll: Duration,
    pub(crate) analysis_timeout: Duration,
    pub(crate) cancel: CancellationToken,
}

impl Consumer {
    pub(crate) async fn run(self) {
        info!("Analysis consumer started (model: {})", self.analyzer.model());
        let mut analyzed: u64 = 0;

        while !self.cancel.is_cancelled() {
            let message = match tokio::time::timeout(self.poll, self.tasks.recv_async()).await {
                // Empty queue, look at the cancel token again
                Err(_) => continue,
                Ok(Err(_)) => {
                    debug!("Task queue disconnected");
                    break;
                }
                Ok(Ok(message)) => message,
            };

            let task = match message {
                TaskMessage::Shutdown => {
                    debug!("Received shutdown sentinel");
                    break;
                }
                TaskMessage::Capture(task) => task,
            };

            self.emit(PipelineEvent::status(format!(
                "Analyzing frame #{} with {}...",
                task.sequence,
                self.analyzer.model()
            )));

            let started = Instant::now();
            let result =
                match tokio::time::timeout(self.analysis_timeout, self.analyzer.analyze(&task.frame))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AnalysisError::Timeout(self.analysis_timeout)),
                };
            let duration = started.elapsed();

            match &result {
                Ok(_) => debug!("Frame #{} analyzed in {:?}", task.sequence, duration),
                Err(e) => warn!("Analysis of frame #{} failed: {}", task.sequence, e),
            }

            analyzed += 1;
            self.emit(PipelineEvent::analysis(task.sequence, duration, result));
        }

        info!("Analysis consumer stopped after {} analyses", analyzed);
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }
}
