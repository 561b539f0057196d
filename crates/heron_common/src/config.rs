use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine configuration. All timeouts are in milliseconds so the struct
/// stays serde-friendly for config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a write statement waits for a row lock before failing.
    pub lock_timeout_ms: u64,
    /// Upper bound for `wait_for_tablespace`.
    pub tablespace_ready_timeout_ms: u64,
    /// Poll interval while waiting for a tablespace to become ready.
    pub tablespace_ready_poll_ms: u64,
    /// Statement worker pool size.
    pub worker_threads: usize,
    /// Bound on queued statements awaiting a worker.
    pub worker_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 10_000,
            tablespace_ready_timeout_ms: 10_000,
            tablespace_ready_poll_ms: 10,
            worker_threads: 4,
            worker_queue_depth: 64,
        }
    }
}

impl EngineConfig {
    pub fn with_lock_timeout_ms(mut self, ms: u64) -> Self {
        self.lock_timeout_ms = ms;
        self
    }

    pub fn with_tablespace_ready_timeout_ms(mut self, ms: u64) -> Self {
        self.tablespace_ready_timeout_ms = ms;
        self
    }

    pub fn with_tablespace_ready_poll_ms(mut self, ms: u64) -> Self {
        self.tablespace_ready_poll_ms = ms;
        self
    }

    pub fn with_worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    pub fn with_worker_queue_depth(mut self, n: usize) -> Self {
        self.worker_queue_depth = n;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn tablespace_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.tablespace_ready_timeout_ms)
    }

    pub fn tablespace_ready_poll(&self) -> Duration {
        Duration::from_millis(self.tablespace_ready_poll_ms)
    }
}
