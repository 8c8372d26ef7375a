use std::time::Duration;

/// Settings for the backward scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Worker count of the graph's pool. `None` lets rayon pick (one per logical CPU).
    pub num_threads: Option<usize>,
    /// Wall-clock budget for one backward pass. Checked before each node runs.
    pub deadline: Option<Duration>,
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}
