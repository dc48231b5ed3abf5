use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Team / graph execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Hard cap on graph node transitions per run.
    #[serde(default = "d_max_transitions")]
    pub max_transitions: u32,
    /// Maximum model/tool iterations within a single agent invocation.
    #[serde(default = "d_max_tool_loops")]
    pub max_tool_loops: u32,
    /// Number of prior messages preloaded as run history.
    #[serde(default = "d_history_limit")]
    pub history_limit: usize,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            max_transitions: d_max_transitions(),
            max_tool_loops: d_max_tool_loops(),
            history_limit: d_history_limit(),
        }
    }
}

fn d_max_transitions() -> u32 {
    40
}
fn d_max_tool_loops() -> u32 {
    12
}
fn d_history_limit() -> usize {
    40
}
