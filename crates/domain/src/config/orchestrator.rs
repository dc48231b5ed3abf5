use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task orchestration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How execution tasks are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// One Docker container per task (deployment mode).
    Docker,
    /// Run the agent runtime inside the worker process (dev/test mode).
    InProcess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "d_executor")]
    pub executor: ExecutorKind,
    /// Agent container image reference.
    #[serde(default = "d_image")]
    pub image: String,
    /// Container memory cap in bytes (default 2 GiB).
    #[serde(default = "d_memory")]
    pub memory_bytes: i64,
    /// Container CPU quota in units of 1e-9 cores (default 1 core).
    #[serde(default = "d_nano_cpus")]
    pub nano_cpus: i64,
    /// Wall-clock limit for one task (default 30 minutes).
    #[serde(default = "d_task_timeout")]
    pub task_timeout_sec: u64,
    /// Monitor poll interval.
    #[serde(default = "d_poll")]
    pub poll_interval_sec: u64,
    /// TERM-to-KILL grace when stopping a container.
    #[serde(default = "d_stop_grace")]
    pub stop_grace_sec: u64,
    /// Extra environment passed through to agent containers
    /// (e.g. LLM credentials).
    #[serde(default)]
    pub passthrough_env: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            executor: d_executor(),
            image: d_image(),
            memory_bytes: d_memory(),
            nano_cpus: d_nano_cpus(),
            task_timeout_sec: d_task_timeout(),
            poll_interval_sec: d_poll(),
            stop_grace_sec: d_stop_grace(),
            passthrough_env: Vec::new(),
        }
    }
}

fn d_executor() -> ExecutorKind {
    ExecutorKind::Docker
}
fn d_image() -> String {
    "mgx-agent:latest".into()
}
fn d_memory() -> i64 {
    2 * 1024 * 1024 * 1024
}
fn d_nano_cpus() -> i64 {
    1_000_000_000
}
fn d_task_timeout() -> u64 {
    1800
}
fn d_poll() -> u64 {
    2
}
fn d_stop_grace() -> u64 {
    10
}
