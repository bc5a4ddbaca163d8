use std::time::Duration;

/// Default per-call timeout for ordinary verbs
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for compress/decompress
pub const DEFAULT_CONVERSION_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Configuration for an [`super::RpcChannel`]
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Number of engine worker threads
    pub worker_threads: usize,
    /// Timeout applied to every verb except conversions
    pub call_timeout: Duration,
    /// Timeout applied to compress/decompress
    pub conversion_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(2),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            conversion_timeout: DEFAULT_CONVERSION_TIMEOUT,
        }
    }
}

impl RpcConfig {
    /// Set the worker count
    pub fn with_workers(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    /// Set the ordinary call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the conversion timeout
    pub fn with_conversion_timeout(mut self, timeout: Duration) -> Self {
        self.conversion_timeout = timeout;
        self
    }
}
