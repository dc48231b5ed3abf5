use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Background worker broker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Number of worker tasks claiming from the queue.
    #[serde(default = "d_workers")]
    pub workers: usize,
    /// Queue poll interval when idle.
    #[serde(default = "d_poll_ms")]
    pub poll_ms: u64,
    /// A claimed task becomes claimable again after this long without an
    /// ack (at-least-once redelivery).
    #[serde(default = "d_lease")]
    pub lease_sec: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            workers: d_workers(),
            poll_ms: d_poll_ms(),
            lease_sec: d_lease(),
        }
    }
}

fn d_workers() -> usize {
    4
}
fn d_poll_ms() -> u64 {
    500
}
fn d_lease() -> u64 {
    2100
}
