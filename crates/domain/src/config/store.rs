use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which store backend a process uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    Memory,
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_mode")]
    pub mode: StoreMode,
    /// SQLite connection URL for the durable store.
    #[serde(default = "d_database_url")]
    pub database_url: String,
    /// Events expire after this many seconds (default 7 days).
    #[serde(default = "d_event_ttl")]
    pub event_ttl_sec: u64,
    /// Messages expire after this many seconds (default 30 days).
    /// Messages are the conversation of record, so they outlive events.
    #[serde(default = "d_message_ttl")]
    pub message_ttl_sec: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: d_mode(),
            database_url: d_database_url(),
            event_ttl_sec: d_event_ttl(),
            message_ttl_sec: d_message_ttl(),
        }
    }
}

fn d_mode() -> StoreMode {
    StoreMode::Database
}
fn d_database_url() -> String {
    "sqlite://data/mgx.db?mode=rwc".into()
}
fn d_event_ttl() -> u64 {
    7 * 24 * 3600
}
fn d_message_ttl() -> u64 {
    30 * 24 * 3600
}
