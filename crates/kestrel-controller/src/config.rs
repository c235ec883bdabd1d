//! Controller configuration.

use std::time::Duration;

use clap::Parser;
use kestrel_store::RetryPolicy;

/// Configuration for the ReplicaSet controller.
#[derive(Debug, Clone, Parser)]
#[command(name = "kestrel-controller", version, about = "Kestrel ReplicaSet controller")]
pub struct ControllerConfig {
    /// Base URL of the store.
    #[arg(long, env = "KESTREL_STORE_URL", default_value = "http://127.0.0.1:9100")]
    pub store_url: String,

    /// Attempts per store operation, including the first.
    #[arg(long, env = "KESTREL_MAX_RETRY", default_value_t = 5)]
    pub max_retry: u32,

    /// Delay between store retries, in milliseconds.
    #[arg(long, env = "KESTREL_RETRY_INTERVAL_MS", default_value_t = 1000)]
    pub retry_interval_ms: u64,

    /// Interval between full resyncs, in seconds.
    #[arg(long, env = "KESTREL_RESYNC_INTERVAL_SECS", default_value_t = 30)]
    pub resync_interval_secs: u64,

    /// Address for the health endpoints.
    #[arg(long, env = "KESTREL_LISTEN_ADDR", default_value = "0.0.0.0:10252")]
    pub listen_addr: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            store_url: "http://127.0.0.1:9100".to_string(),
            max_retry: 5,
            retry_interval_ms: 1000,
            resync_interval_secs: 30,
            listen_addr: "0.0.0.0:10252".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Retry policy for store operations.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retry, Duration::from_millis(self.retry_interval_ms))
    }

    /// Interval between full resyncs.
    #[must_use]
    pub const fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}
