//! Dev-server lifecycle tools.
//!
//! The dev server is a long-running process the Engineer starts inside the
//! dev container. The detach pattern writes three well-known files under
//! the workspace root:
//!
//! - `.dev-server.pid` — the detached process id
//! - `.dev-server.log` — combined stdout/stderr
//! - `.dev-server.cmd` — the command line, for status display
//!
//! Status checks PID liveness with a zero signal and tails the log; stop
//! sends TERM, waits a grace window, then KILL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use mgx_domain::ToolDefinition;

use crate::{Tool, ToolOutcome};

pub const PID_FILE: &str = ".dev-server.pid";
pub const LOG_FILE: &str = ".dev-server.log";
pub const CMD_FILE: &str = ".dev-server.cmd";

fn pid_path(root: &Path) -> PathBuf {
    root.join(PID_FILE)
}

fn workspace_root() -> Result<PathBuf, ToolOutcome> {
    mgx_context::current()
        .map(|ctx| ctx.workspace_path.clone())
        .map_err(|e| ToolOutcome::error(e.to_string()))
}

/// Whether a PID refers to a live process (signal 0 probe).
fn pid_alive(pid: i32) -> bool {
    // SAFETY: kill with signal 0 performs no action, only a liveness check.
    unsafe { libc::kill(pid, 0) == 0 }
}

async fn read_pid(root: &Path) -> Option<i32> {
    let raw = fs::read_to_string(pid_path(root)).await.ok()?;
    raw.trim().parse().ok()
}

async fn tail_log(root: &Path, lines: usize) -> String {
    let Ok(content) = fs::read_to_string(root.join(LOG_FILE)).await else {
        return String::new();
    };
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// start_dev_server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct StartArgs {
    command: String,
}

pub struct StartDevServerTool;

#[async_trait::async_trait]
impl Tool for StartDevServerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "start_dev_server".into(),
            description: "Start the app's dev server detached; logs go to .dev-server.log.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Server command, e.g. 'npm run dev'" }
                },
                "required": ["command"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> ToolOutcome {
        let args: StartArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::error(format!("invalid arguments: {e}")),
        };
        let root = match workspace_root() {
            Ok(r) => r,
            Err(e) => return e,
        };

        // Refuse a second server while the previous one is alive.
        if let Some(pid) = read_pid(&root).await {
            if pid_alive(pid) {
                return ToolOutcome::error(format!(
                    "a dev server is already running (pid {pid}); stop it first"
                ));
            }
        }

        // Detach: redirect into the log, background, echo the child pid.
        let launcher = format!(
            "nohup {} > {} 2>&1 & echo $!",
            args.command, LOG_FILE
        );
        let output = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&launcher)
            .current_dir(&root)
            .output()
            .await
        {
            Ok(o) => o,
            Err(e) => return ToolOutcome::error(format!("failed to launch: {e}")),
        };

        let pid_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let Ok(pid) = pid_str.parse::<i32>() else {
            return ToolOutcome::error(format!("launcher did not report a pid: '{pid_str}'"));
        };

        if let Err(e) = fs::write(pid_path(&root), format!("{pid}\n")).await {
            return ToolOutcome::error(format!("failed to record pid: {e}"));
        }
        if let Err(e) = fs::write(root.join(CMD_FILE), format!("{}\n", args.command)).await {
            tracing::warn!(error = %e, "failed to record dev-server command");
        }

        tracing::info!(pid, command = %args.command, "dev server started");
        ToolOutcome::json(json!({ "pid": pid, "log": LOG_FILE }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// dev_server_status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DevServerStatusTool {
    pub tail_lines: usize,
}

#[async_trait::async_trait]
impl Tool for DevServerStatusTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "dev_server_status".into(),
            description: "Check whether the dev server is running and tail its log.".into(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn invoke(&self, _args: Value) -> ToolOutcome {
        let root = match workspace_root() {
            Ok(r) => r,
            Err(e) => return e,
        };

        let Some(pid) = read_pid(&root).await else {
            return ToolOutcome::json(json!({ "running": false }));
        };
        let running = pid_alive(pid);
        let command = fs::read_to_string(root.join(CMD_FILE))
            .await
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        ToolOutcome::json(json!({
            "running": running,
            "pid": pid,
            "command": command,
            "log_tail": tail_log(&root, self.tail_lines).await,
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// stop_dev_server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StopDevServerTool {
    pub grace: Duration,
}

#[async_trait::async_trait]
impl Tool for StopDevServerTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "stop_dev_server".into(),
            description: "Stop the dev server (TERM, then KILL after a grace window).".into(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn invoke(&self, _args: Value) -> ToolOutcome {
        let root = match workspace_root() {
            Ok(r) => r,
            Err(e) => return e,
        };

        let Some(pid) = read_pid(&root).await else {
            return ToolOutcome::json(json!({ "stopped": false, "reason": "no pid file" }));
        };

        if !pid_alive(pid) {
            let _ = fs::remove_file(pid_path(&root)).await;
            return ToolOutcome::json(json!({ "stopped": false, "reason": "not running" }));
        }

        // SAFETY: plain signal sends to a pid we recorded ourselves.
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }

        let deadline = tokio::time::Instant::now() + self.grace;
        let mut forced = false;
        loop {
            if !pid_alive(pid) {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                // SAFETY: as above.
                unsafe {
                    libc::kill(pid, libc::SIGKILL);
                }
                forced = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let _ = fs::remove_file(pid_path(&root)).await;
        tracing::info!(pid, forced, "dev server stopped");
        ToolOutcome::json(json!({ "stopped": true, "pid": pid, "forced": forced }))
    }
}
