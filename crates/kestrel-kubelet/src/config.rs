//! Node agent configuration.

use std::time::Duration;

use clap::Parser;
use kestrel_store::RetryPolicy;

/// Configuration for the node agent.
///
/// Every field can be set on the command line or through its environment
/// variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "kestrel-kubelet", version, about = "Kestrel node agent")]
pub struct AgentConfig {
    /// Base URL of the store.
    #[arg(long, env = "KESTREL_STORE_URL", default_value = "http://127.0.0.1:9100")]
    pub store_url: String,

    /// Name of this node. Allocated from the subnet allocator when unset.
    #[arg(long, env = "KESTREL_NODE_NAME")]
    pub node_name: Option<String>,

    /// Address other nodes reach this node on.
    #[arg(long, env = "KESTREL_NODE_IP", default_value = "127.0.0.1")]
    pub node_ip: String,

    /// Pod subnet for this node. Allocated when unset.
    #[arg(long, env = "KESTREL_POD_CIDR")]
    pub pod_cidr: Option<String>,

    /// Attempts per store operation, including the first.
    #[arg(long, env = "KESTREL_MAX_RETRY", default_value_t = 5)]
    pub max_retry: u32,

    /// Delay between store retries, in milliseconds.
    #[arg(long, env = "KESTREL_RETRY_INTERVAL_MS", default_value_t = 1000)]
    pub retry_interval_ms: u64,

    /// Interval between resource samples, in milliseconds.
    #[arg(long, env = "KESTREL_MONITOR_INTERVAL_MS", default_value_t = 2000)]
    pub monitor_interval_ms: u64,

    /// Capacity of the pod event queue.
    #[arg(long, env = "KESTREL_QUEUE_CAPACITY", default_value_t = 1)]
    pub queue_capacity: usize,

    /// Address for the health endpoints.
    #[arg(long, env = "KESTREL_LISTEN_ADDR", default_value = "0.0.0.0:10250")]
    pub listen_addr: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            store_url: "http://127.0.0.1:9100".to_string(),
            node_name: None,
            node_ip: "127.0.0.1".to_string(),
            pod_cidr: None,
            max_retry: 5,
            retry_interval_ms: 1000,
            monitor_interval_ms: 2000,
            queue_capacity: 1,
            listen_addr: "0.0.0.0:10250".to_string(),
        }
    }
}

impl AgentConfig {
    /// Retry policy for store operations.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retry, Duration::from_millis(self.retry_interval_ms))
    }

    /// Interval between resource samples.
    #[must_use]
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}
