use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub dev_server: DevServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Wall-clock limit for one command.
    #[serde(default = "d_exec_timeout")]
    pub timeout_sec: u64,
    /// Captured output is truncated beyond this.
    #[serde(default = "d_max_output")]
    pub max_output_bytes: usize,
    /// Regex patterns for commands that are refused outright.
    #[serde(default = "d_denied_patterns")]
    pub denied_patterns: Vec<String>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_sec: d_exec_timeout(),
            max_output_bytes: d_max_output(),
            denied_patterns: d_denied_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevServerConfig {
    /// Seconds between TERM and KILL when stopping the dev server.
    #[serde(default = "d_grace")]
    pub stop_grace_sec: u64,
    /// Lines of log tailed by the status tool.
    #[serde(default = "d_tail_lines")]
    pub status_tail_lines: usize,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            stop_grace_sec: d_grace(),
            status_tail_lines: d_tail_lines(),
        }
    }
}

fn d_exec_timeout() -> u64 {
    120
}
fn d_max_output() -> usize {
    64 * 1024
}
fn d_denied_patterns() -> Vec<String> {
    vec![
        r"rm\s+(-[a-zA-Z]*\s+)*-?[rf]+[a-zA-Z]*\s+/(\s|$)".into(),
        r":\(\)\s*\{.*\};\s*:".into(),
        r"mkfs(\.|(\s))".into(),
        r"dd\s+.*of=/dev/".into(),
        r">\s*/dev/sd[a-z]".into(),
        r"shutdown(\s|$)|reboot(\s|$)".into(),
    ]
}
fn d_grace() -> u64 {
    5
}
fn d_tail_lines() -> usize {
    40
}
