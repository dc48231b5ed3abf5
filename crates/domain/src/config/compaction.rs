use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context compression
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "d_enabled")]
    pub enabled: bool,
    /// Summarize once the estimated token count exceeds this.
    #[serde(default = "d_trigger_tokens")]
    pub trigger_tokens: usize,
    /// Summarize once the message count exceeds this.
    #[serde(default = "d_trigger_messages")]
    pub trigger_messages: usize,
    /// How many recent messages to keep verbatim.
    #[serde(default = "d_keep_last")]
    pub keep_last_messages: usize,
    /// Custom summarization prompt; `None` uses the built-in one.
    #[serde(default)]
    pub prompt: Option<String>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: d_enabled(),
            trigger_tokens: d_trigger_tokens(),
            trigger_messages: d_trigger_messages(),
            keep_last_messages: d_keep_last(),
            prompt: None,
        }
    }
}

fn d_enabled() -> bool {
    true
}
fn d_trigger_tokens() -> usize {
    24_000
}
fn d_trigger_messages() -> usize {
    60
}
fn d_keep_last() -> usize {
    12
}
