//! Interpreter configuration

/// Knobs for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Abort after this many scheduler ticks. `None` runs until quiescence.
    pub step_limit: Option<u64>,
    /// Treat a quiet run with blocked communications as an error
    pub fail_on_deadlock: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    pub fn fail_on_deadlock(mut self, enabled: bool) -> Self {
        self.fail_on_deadlock = enabled;
        self
    }
}
