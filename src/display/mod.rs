//! Presentation sinks fed by the aggregator

pub mod console;
pub mod dashboard;

pub use console::ConsoleSink;
pub use dashboard::{DashboardChannel, DashboardMessage, Subscription};

use crate::pipeline::{PipelineEvent, StatsSnapshot};

/// Receives every event after it has been applied to the statistics.
///
/// Called on the aggregator task, so implementations must not block for long.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &PipelineEvent, stats: &StatsSnapshot);
}
