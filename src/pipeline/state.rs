//! Pipeline lifecycle state

/// `Idle --start--> Running --stop--> Stopping --(joined or aborted)--> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No workers alive; `start` is accepted
    Idle,

    /// Producer, consumer and aggregator are alive
    Running,

    /// Workers have been signalled and are being joined
    Stopping,
}

impl PipelineState {
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Idle, Running) | (Running, Stopping) | (Stopping, Idle)
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Running => "Running",
            PipelineState::Stopping => "Stopping",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PipelineState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Running)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
