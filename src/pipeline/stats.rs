//! Running statistics, owned by the aggregator

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::time::Instant;

use super::event::PipelineEvent;

/// Mutable counters. Exactly one writer (the aggregator task); everyone else
/// sees `StatsSnapshot`s.
#[derive(Debug)]
pub struct Statistics {
    captures_taken: u64,
    analyses_completed: u64,
    analyses_failed: u64,
    /// Sum over successful analyses only
    cumulative_analysis_time: Duration,
    started_at: DateTime<Local>,
    started: Instant,
    recent_events: VecDeque<PipelineEvent>,
    /// Kept apart so chatty status traffic cannot push screenshots out
    recent_captures: VecDeque<PipelineEvent>,
    capacity: usize,
}

/// Immutable copy handed to sinks and readers
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub captures_taken: u64,
    pub analyses_completed: u64,
    pub analyses_failed: u64,
    pub cumulative_analysis_time: Duration,
    pub avg_analysis_secs: f64,
    /// Percentage of finished analyses that succeeded
    pub success_rate: f64,
    pub runtime: Duration,
    /// Captured frames whose analysis has not finished yet
    pub pending_analyses: u64,
    pub started_at: Option<DateTime<Local>>,
    /// Oldest first
    pub recent_events: Vec<PipelineEvent>,
    /// Last `CaptureDone` events, oldest first
    pub recent_captures: Vec<PipelineEvent>,
}

impl Statistics {
    pub fn new(capacity: usize) -> Self {
        Self {
            captures_taken: 0,
            analyses_completed: 0,
            analyses_failed: 0,
            cumulative_analysis_time: Duration::ZERO,
            started_at: Local::now(),
            started: Instant::now(),
            recent_events: VecDeque::with_capacity(capacity),
            recent_captures: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::CaptureDone { .. } => {
                self.captures_taken += 1;
                push_capped(&mut self.recent_captures, event, self.capacity);
            }
            PipelineEvent::AnalysisDone {
                duration, outcome, ..
            } => {
                if outcome.is_success() {
                    self.analyses_completed += 1;
                    self.cumulative_analysis_time += *duration;
                } else {
                    self.analyses_failed += 1;
                }
            }
            PipelineEvent::Status { .. } | PipelineEvent::Error { .. } => {}
        }

        push_capped(&mut self.recent_events, event, self.capacity);
    }

    pub fn analyses_finished(&self) -> u64 {
        self.analyses_completed + self.analyses_failed
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let avg_analysis_secs = if self.analyses_completed > 0 {
            self.cumulative_analysis_time.as_secs_f64() / self.analyses_completed as f64
        } else {
            0.0
        };

        let finished = self.analyses_finished();
        let success_rate = if finished > 0 {
            self.analyses_completed as f64 / finished as f64 * 100.0
        } else {
            0.0
        };

        StatsSnapshot {
            captures_taken: self.captures_taken,
            analyses_completed: self.analyses_completed,
            analyses_failed: self.analyses_failed,
            cumulative_analysis_time: self.cumulative_analysis_time,
            avg_analysis_secs,
            success_rate,
            runtime: self.started.elapsed(),
            pending_analyses: self.captures_taken.saturating_sub(finished),
            started_at: Some(self.started_at),
            recent_events: self.recent_events.iter().cloned().collect(),
            recent_captures: self.recent_captures.iter().cloned().collect(),
        }
    }
}

fn push_capped(queue: &mut VecDeque<PipelineEvent>, event: &PipelineEvent, capacity: usize) {
    if capacity == 0 {
        return;
    }
    if queue.len() == capacity {
        queue.pop_front();
    }
    queue.push_back(event.clone());
}

/// Cheap, clonable read handle on the latest published snapshot
#[derive(Clone)]
pub struct StatsReader {
    inner: Arc<ArcSwap<StatsSnapshot>>,
}

impl StatsReader {
    pub(crate) fn new(inner: Arc<ArcSwap<StatsSnapshot>>) -> Self {
        Self { inner }
    }

    pub fn load(&self) -> Arc<StatsSnapshot> {
        self.inner.load_full()
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} captures, {} analyses ({} ok, {} failed, {:.1}% success, avg {:.2}s), {} pending, runtime {:.1}s",
            self.captures_taken,
            self.analyses_completed + self.analyses_failed,
            self.analyses_completed,
            self.analyses_failed,
            self.success_rate,
            self.avg_analysis_secs,
            self.pending_analyses,
            self.runtime.as_secs_f64()
        )
    }
}
