use std::time::Duration;

/// Scheduler tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Consecutive ticks without work after which `run` returns. The same
    /// limit bounds how long `await` waits on a promise that makes no progress.
    pub idle_tick_limit: usize,
    pub max_call_depth: usize,
    /// Size of the background pool, started on first use.
    pub worker_threads: usize,
    /// Pause between ticks while only background work is outstanding.
    pub poll_interval: Duration,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            idle_tick_limit: 3,
            max_call_depth: 256,
            worker_threads: 2,
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl VmConfig {
    pub fn with_idle_tick_limit(mut self, ticks: usize) -> Self {
        self.idle_tick_limit = ticks;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
