//! Confined shell execution.
//!
//! Commands run via `sh -c` with the working directory pinned to the
//! workspace root. A deny-list compiled at registry build refuses
//! destructive patterns before anything is spawned; output is truncated
//! and the wall clock is bounded.

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;

use mgx_domain::config::ExecConfig;
use mgx_domain::{Error, Result, ToolDefinition};

use crate::{Tool, ToolOutcome};

#[derive(Deserialize)]
struct RunCommandArgs {
    command: String,
    /// Working directory relative to the workspace root.
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    timeout_sec: Option<u64>,
}

pub struct RunCommandTool {
    denied: regex::RegexSet,
    timeout: Duration,
    max_output_bytes: usize,
}

impl RunCommandTool {
    pub fn from_config(cfg: &ExecConfig) -> Result<Self> {
        let denied = regex::RegexSet::new(&cfg.denied_patterns)
            .map_err(|e| Error::Config(format!("tools.exec.denied_patterns: {e}")))?;
        Ok(Self {
            denied,
            timeout: Duration::from_secs(cfg.timeout_sec),
            max_output_bytes: cfg.max_output_bytes,
        })
    }

    fn truncate(&self, mut output: String) -> (String, bool) {
        if output.len() <= self.max_output_bytes {
            return (output, false);
        }
        let mut end = self.max_output_bytes;
        while end > 0 && !output.is_char_boundary(end) {
            end -= 1;
        }
        output.truncate(end);
        output.push_str("\n[output truncated]");
        (output, true)
    }
}

#[async_trait::async_trait]
impl Tool for RunCommandTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "run_command".into(),
            description: "Run a shell command inside the workspace. Returns combined output and exit code.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Shell command to execute" },
                    "workdir": { "type": "string", "description": "Working directory relative to the workspace root" },
                    "timeout_sec": { "type": "integer", "description": "Override the wall-clock limit" }
                },
                "required": ["command"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> ToolOutcome {
        let args: RunCommandArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolOutcome::error(format!("invalid arguments: {e}")),
        };

        if self.denied.is_match(&args.command) {
            return ToolOutcome::error(format!(
                "command refused by security policy: '{}'",
                args.command
            ));
        }

        let ctx = match mgx_context::current() {
            Ok(c) => c,
            Err(e) => return ToolOutcome::error(e.to_string()),
        };

        let cwd = match &args.workdir {
            Some(rel) => match crate::workspace_ops::validate_path(&ctx.workspace_path, rel) {
                Ok(p) => p,
                Err(e) => return ToolOutcome::error(e),
            },
            None => ctx.workspace_path.clone(),
        };

        let timeout = args
            .timeout_sec
            .map(Duration::from_secs)
            .unwrap_or(self.timeout)
            .min(self.timeout);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&args.command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ToolOutcome::error(format!("failed to spawn: {e}")),
        };

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolOutcome::error(format!("command failed: {e}")),
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped.
                return ToolOutcome::error(format!(
                    "command timed out after {}s",
                    timeout.as_secs()
                ));
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        let (combined, truncated) = self.truncate(combined);
        let exit_code = output.status.code();

        tracing::debug!(
            command = %args.command,
            exit_code = ?exit_code,
            truncated,
            "command finished"
        );

        ToolOutcome {
            content: json!({
                "exit_code": exit_code,
                "output": combined,
                "truncated": truncated,
            })
            .to_string(),
            is_error: !output.status.success(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;
    use tempfile::TempDir;

    fn tool() -> RunCommandTool {
        RunCommandTool::from_config(&ExecConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn runs_in_workspace_cwd() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("here.txt"), "x").unwrap();
        let ctx = test_context(ws.path());

        mgx_context::with_context(ctx, async {
            let outcome = tool().invoke(json!({ "command": "ls" })).await;
            assert!(!outcome.is_error, "{}", outcome.content);
            let v: Value = serde_json::from_str(&outcome.content).unwrap();
            assert!(v["output"].as_str().unwrap().contains("here.txt"));
            assert_eq!(v["exit_code"], 0);
        })
        .await;
    }

    #[tokio::test]
    async fn nonzero_exit_is_error_outcome() {
        let ws = TempDir::new().unwrap();
        let ctx = test_context(ws.path());
        mgx_context::with_context(ctx, async {
            let outcome = tool().invoke(json!({ "command": "false" })).await;
            assert!(outcome.is_error);
            let v: Value = serde_json::from_str(&outcome.content).unwrap();
            assert_eq!(v["exit_code"], 1);
        })
        .await;
    }

    #[tokio::test]
    async fn deny_list_refuses_destructive_commands() {
        let ws = TempDir::new().unwrap();
        let ctx = test_context(ws.path());
        mgx_context::with_context(ctx, async {
            let outcome = tool().invoke(json!({ "command": "rm -rf /" })).await;
            assert!(outcome.is_error);
            assert!(outcome.content.contains("security policy"));
            let fork_bomb = tool().invoke(json!({ "command": ":(){ :|:& };:" })).await;
            assert!(fork_bomb.is_error);
        })
        .await;
    }

    #[tokio::test]
    async fn timeout_kills_long_command() {
        let ws = TempDir::new().unwrap();
        let ctx = test_context(ws.path());
        mgx_context::with_context(ctx, async {
            let outcome = tool()
                .invoke(json!({ "command": "sleep 30", "timeout_sec": 1 }))
                .await;
            assert!(outcome.is_error);
            assert!(outcome.content.contains("timed out"));
        })
        .await;
    }

    #[tokio::test]
    async fn output_is_truncated() {
        let ws = TempDir::new().unwrap();
        let ctx = test_context(ws.path());
        let small = RunCommandTool::from_config(&ExecConfig {
            max_output_bytes: 64,
            ..ExecConfig::default()
        })
        .unwrap();
        mgx_context::with_context(ctx, async {
            let outcome = small
                .invoke(json!({ "command": "yes x | head -n 1000" }))
                .await;
            let v: Value = serde_json::from_str(&outcome.content).unwrap();
            assert_eq!(v["truncated"], true);
            assert!(v["output"].as_str().unwrap().contains("[output truncated]"));
        })
        .await;
    }

    #[tokio::test]
    async fn workdir_outside_workspace_is_refused() {
        let ws = TempDir::new().unwrap();
        let ctx = test_context(ws.path());
        mgx_context::with_context(ctx, async {
            let outcome = tool()
                .invoke(json!({ "command": "ls", "workdir": "../.." }))
                .await;
            assert!(outcome.is_error);
        })
        .await;
    }
}
