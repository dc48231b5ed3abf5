use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any OpenAI-compatible chat-completions endpoint.
    OpenaiCompat,
    /// Deterministic scripted provider for tests and offline development.
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key (never the key itself).
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Default model for this provider.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider instances, keyed by id.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider id used by agents unless overridden per role.
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Provider id used for context-compression summaries; falls back to
    /// the default provider.
    #[serde(default)]
    pub summarizer: Option<String>,
    /// Per-call timeout.
    #[serde(default = "d_request_timeout")]
    pub request_timeout_sec: u64,
    /// Bounded retry attempts for model calls.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: None,
            summarizer: None,
            request_timeout_sec: d_request_timeout(),
            max_retries: d_max_retries(),
        }
    }
}

fn d_request_timeout() -> u64 {
    60
}
fn d_max_retries() -> u32 {
    3
}
