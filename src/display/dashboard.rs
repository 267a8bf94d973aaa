//! Push channel for a web dashboard.
//!
//! Every pipeline event becomes one or more `DashboardMessage`s on a
//! `tokio::sync::broadcast` channel. A transport (socket server, SSE, or a
//! plain JSON line printer) subscribes and forwards them. New subscribers get
//! a greeting with the current stats and the recent screenshots so the view
//! can be rebuilt without waiting for the next capture.

use serde::Serialize;
use tokio::sync::broadcast;

use super::EventSink;
use crate::pipeline::{AnalysisOutcome, PipelineEvent, StatsReader, StatsSnapshot};

const CLOCK: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum DashboardMessage {
    StatusUpdate(Notice),
    NewScreenshot(Screenshot),
    AnalysisResult(AnalysisReport),
    StatsUpdate(DashboardStats),
    ErrorMessage(Notice),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Screenshot {
    pub num: u64,
    pub filename: String,
    pub filepath: String,
    pub size_kb: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub screenshot_num: u64,
    pub analyze_time: f64,
    pub success: bool,
    pub response: String,
    pub error: String,
    pub timestamp: String,
}

/// Rounded view of a `StatsSnapshot`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub screenshots_taken: u64,
    pub analyses_completed: u64,
    pub analyses_failed: u64,
    pub avg_analysis_time: f64,
    pub success_rate: f64,
    pub runtime: f64,
}

impl From<&StatsSnapshot> for DashboardStats {
    fn from(stats: &StatsSnapshot) -> Self {
        Self {
            screenshots_taken: stats.captures_taken,
            analyses_completed: stats.analyses_completed,
            analyses_failed: stats.analyses_failed,
            avg_analysis_time: round_to(stats.avg_analysis_secs, 2),
            success_rate: round_to(stats.success_rate, 1),
            runtime: round_to(stats.runtime.as_secs_f64(), 1),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

impl DashboardMessage {
    pub fn name(&self) -> &'static str {
        match self {
            DashboardMessage::StatusUpdate(_) => "status_update",
            DashboardMessage::NewScreenshot(_) => "new_screenshot",
            DashboardMessage::AnalysisResult(_) => "analysis_result",
            DashboardMessage::StatsUpdate(_) => "stats_update",
            DashboardMessage::ErrorMessage(_) => "error_message",
        }
    }

    fn screenshot(event: &PipelineEvent) -> Option<Self> {
        let PipelineEvent::CaptureDone {
            sequence,
            size_bytes,
            path,
            at,
            ..
        } = event
        else {
            return None;
        };

        Some(DashboardMessage::NewScreenshot(Screenshot {
            num: *sequence,
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            filepath: path.display().to_string(),
            size_kb: round_to(*size_bytes as f64 / 1024.0, 1),
            timestamp: at.format(CLOCK).to_string(),
        }))
    }

    /// Messages for one event; captures and analyses are followed by fresh stats
    pub fn from_event(event: &PipelineEvent, stats: &StatsSnapshot) -> Vec<Self> {
        let timestamp = event.timestamp().format(CLOCK).to_string();

        match event {
            PipelineEvent::Status { message, .. } => {
                vec![DashboardMessage::StatusUpdate(Notice {
                    message: message.clone(),
                    timestamp,
                })]
            }
            PipelineEvent::Error { message, .. } => {
                vec![DashboardMessage::ErrorMessage(Notice {
                    message: message.clone(),
                    timestamp,
                })]
            }
            PipelineEvent::CaptureDone { .. } => Self::screenshot(event)
                .into_iter()
                .chain([DashboardMessage::StatsUpdate(stats.into())])
                .collect(),
            PipelineEvent::AnalysisDone {
                sequence,
                duration,
                outcome,
                ..
            } => {
                let (response, error) = match outcome {
                    AnalysisOutcome::Success { response } => (response.clone(), String::new()),
                    AnalysisOutcome::Failure { error } => (String::new(), error.clone()),
                };
                vec![
                    DashboardMessage::AnalysisResult(AnalysisReport {
                        screenshot_num: *sequence,
                        analyze_time: round_to(duration.as_secs_f64(), 2),
                        success: outcome.is_success(),
                        response,
                        error,
                        timestamp,
                    }),
                    DashboardMessage::StatsUpdate(stats.into()),
                ]
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// What a new subscriber receives
pub struct Subscription {
    /// Current stats followed by the recent screenshots, oldest first
    pub greeting: Vec<DashboardMessage>,
    pub receiver: broadcast::Receiver<DashboardMessage>,
}

#[derive(Clone)]
pub struct DashboardChannel {
    tx: broadcast::Sender<DashboardMessage>,
    stats: StatsReader,
}

impl DashboardChannel {
    pub fn new(capacity: usize, stats: StatsReader) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, stats }
    }

    pub fn subscribe(&self) -> Subscription {
        let receiver = self.tx.subscribe();
        let snapshot = self.stats.load();

        let mut greeting = vec![DashboardMessage::StatsUpdate(snapshot.as_ref().into())];
        greeting.extend(snapshot.recent_captures.iter().filter_map(DashboardMessage::screenshot));

        Subscription { greeting, receiver }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for DashboardChannel {
    fn on_event(&self, event: &PipelineEvent, stats: &StatsSnapshot) {
        for message in DashboardMessage::from_event(event, stats) {
            // No subscribers is fine, nobody is watching
            let _ = self.tx.send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Statistics;
    use arc_swap::ArcSwap;
    use chrono::Local;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn capture(sequence: u64) -> PipelineEvent {
        PipelineEvent::CaptureDone {
            sequence,
            size_bytes: 1536,
            path: PathBuf::from(format!("screenshots/live_100_{sequence}.png")),
            width: 1536,
            height: 864,
            at: Local::now(),
        }
    }

    fn channel_with(stats: Statistics) -> DashboardChannel {
        let shared = Arc::new(ArcSwap::from_pointee(stats.snapshot()));
        DashboardChannel::new(16, StatsReader::new(shared))
    }

    #[test]
    fn test_capture_is_followed_by_stats() {
        let messages = DashboardMessage::from_event(&capture(4), &StatsSnapshot::default());
        let names: Vec<_> = messages.iter().map(DashboardMessage::name).collect();
        assert_eq!(names, vec!["new_screenshot", "stats_update"]);

        match &messages[0] {
            DashboardMessage::NewScreenshot(shot) => {
                assert_eq!(shot.num, 4);
                assert_eq!(shot.filename, "live_100_4.png");
                assert_eq!(shot.size_kb, 1.5);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_json_shape() {
        let failed = PipelineEvent::analysis(
            2,
            Duration::from_millis(1234),
            Err(crate::analysis::AnalysisError::Transport("reset".into())),
        );
        let messages = DashboardMessage::from_event(&failed, &StatsSnapshot::default());
        let json: serde_json::Value =
            serde_json::from_str(&messages[0].to_json().unwrap()).unwrap();

        assert_eq!(json["event"], "analysis_result");
        assert_eq!(json["data"]["screenshot_num"], 2);
        assert_eq!(json["data"]["analyze_time"], 1.23);
        assert_eq!(json["data"]["success"], false);
        assert_eq!(json["data"]["response"], "");
        assert_eq!(json["data"]["error"], "request failed: reset");
    }

    #[test]
    fn test_stats_are_rounded() {
        let snapshot = StatsSnapshot {
            avg_analysis_secs: 2.3456,
            success_rate: 66.6666,
            runtime: Duration::from_millis(12_345),
            ..StatsSnapshot::default()
        };
        let stats = DashboardStats::from(&snapshot);
        assert_eq!(stats.avg_analysis_time, 2.35);
        assert_eq!(stats.success_rate, 66.7);
        assert_eq!(stats.runtime, 12.3);
    }

    #[test]
    fn test_subscriber_gets_greeting_then_live_messages() {
        let mut stats = Statistics::new(10);
        stats.record(&capture(1));
        stats.record(&PipelineEvent::status("Analyzing frame #1..."));
        stats.record(&capture(2));
        let channel = channel_with(stats);

        let Subscription {
            greeting,
            mut receiver,
        } = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 1);

        let names: Vec<_> = greeting.iter().map(DashboardMessage::name).collect();
        assert_eq!(names, vec!["stats_update", "new_screenshot", "new_screenshot"]);
        match &greeting[0] {
            DashboardMessage::StatsUpdate(s) => assert_eq!(s.screenshots_taken, 2),
            other => panic!("unexpected message: {other:?}"),
        }

        channel.on_event(&PipelineEvent::error("disk full"), &StatsSnapshot::default());
        match receiver.try_recv().unwrap() {
            DashboardMessage::ErrorMessage(notice) => assert_eq!(notice.message, "disk full"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_greeting_replays_last_ten_screenshots() {
        let mut stats = Statistics::new(10);
        for sequence in 1..=12 {
            stats.record(&PipelineEvent::status(format!("Capturing frame #{sequence}...")));
            stats.record(&capture(sequence));
            stats.record(&PipelineEvent::status(format!("Analyzing frame #{sequence}...")));
            stats.record(&PipelineEvent::analysis(sequence, Duration::from_secs(2), Ok("ok".into())));
        }
        let channel = channel_with(stats);

        let replayed: Vec<u64> = channel
            .subscribe()
            .greeting
            .iter()
            .filter_map(|message| match message {
                DashboardMessage::NewScreenshot(shot) => Some(shot.num),
                _ => None,
            })
            .collect();
        assert_eq!(replayed, (3..=12).collect::<Vec<_>>());
    }

    #[test]
    fn test_send_without_subscribers_is_harmless() {
        let channel = channel_with(Statistics::new(10));
        channel.on_event(&capture(1), &StatsSnapshot::default());
        assert_eq!(channel.subscriber_count(), 0);
    }
}
