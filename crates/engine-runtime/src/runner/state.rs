use std::fmt;

/// Observable runner state. `Drained`, `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Fetching,
    Processing,
    Committing,
    Drained,
    Stopped,
    Failed,
}

impl RunnerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunnerState::Drained | RunnerState::Stopped | RunnerState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerState::Idle => "idle",
            RunnerState::Fetching => "fetching",
            RunnerState::Processing => "processing",
            RunnerState::Committing => "committing",
            RunnerState::Drained => "drained",
            RunnerState::Stopped => "stopped",
            RunnerState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
