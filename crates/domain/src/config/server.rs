use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub sse: SseConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            max_concurrent_requests: d_max_concurrent(),
            cors: CorsConfig::default(),
            sse: SseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Use `["*"]` for permissive (NOT recommended).
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

/// Server-sent-event delivery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    /// Store polling interval while a stream is open.
    #[serde(default = "d_poll_ms")]
    pub poll_ms: u64,
    /// Maximum events fetched per poll.
    #[serde(default = "d_batch")]
    pub batch_size: usize,
    /// Idle connections are closed after this long without a finish event.
    #[serde(default = "d_idle_timeout")]
    pub idle_timeout_sec: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            poll_ms: d_poll_ms(),
            batch_size: d_batch(),
            idle_timeout_sec: d_idle_timeout(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_port() -> u16 {
    8080
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_max_concurrent() -> usize {
    256
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()]
}
fn d_poll_ms() -> u64 {
    500
}
fn d_batch() -> usize {
    100
}
fn d_idle_timeout() -> u64 {
    300
}
