//! Execution backends.
//!
//! The monitor loop only needs three capabilities from a backend: launch,
//! liveness, and termination. [`DockerExecutor`](crate::docker) is the
//! deployment backend; [`InProcessExecutor`] runs the agent runtime inside
//! the worker process so development setups and the test suite work
//! without a Docker socket.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use mgx_domain::{Result, Session};
use mgx_providers::ProviderRegistry;
use mgx_runtime::{run_session, RunConfig, RunParams};
use mgx_store::{EventStore, MessageStore};
use mgx_tools::ToolRegistry;

/// Opaque reference to one launched execution.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub id: String,
}

/// Liveness snapshot of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Running,
    Exited { exit_code: Option<i64> },
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Start an execution for the session. Launching over a stale
    /// execution of the same session replaces it.
    async fn launch(&self, session: &Session) -> Result<ExecutionHandle>;

    async fn state(&self, handle: &ExecutionHandle) -> Result<ExecutorState>;

    /// Terminate the execution (TERM, then KILL after the grace window).
    async fn stop(&self, handle: &ExecutionHandle) -> Result<()>;

    /// Remove any remains. Safe to call repeatedly.
    async fn cleanup(&self, handle: &ExecutionHandle) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-process executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct InProcessExecutor {
    events: Arc<dyn EventStore>,
    messages: Arc<dyn MessageStore>,
    providers: Arc<ProviderRegistry>,
    tools: ToolRegistry,
    run_config: RunConfig,
    workspace_root: std::path::PathBuf,
    running: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl InProcessExecutor {
    pub fn new(
        events: Arc<dyn EventStore>,
        messages: Arc<dyn MessageStore>,
        providers: Arc<ProviderRegistry>,
        tools: ToolRegistry,
        run_config: RunConfig,
        workspace_root: std::path::PathBuf,
    ) -> Self {
        Self {
            events,
            messages,
            providers,
            tools,
            run_config,
            workspace_root,
            running: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Executor for InProcessExecutor {
    async fn launch(&self, session: &Session) -> Result<ExecutionHandle> {
        let params = RunParams {
            session_id: session.id.clone(),
            workspace_id: session.workspace_id.clone(),
            workspace_path: self.workspace_root.join(&session.workspace_id),
            framework: session.framework,
            trace_id: None,
        };
        let events = self.events.clone();
        let messages = self.messages.clone();
        let providers = self.providers.clone();
        let tools = self.tools.clone();
        let run_config = self.run_config.clone();
        let session_id = session.id.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) =
                run_session(params, events, messages, providers, tools, run_config).await
            {
                tracing::error!(session_id = %session_id, error = %e, "in-process run failed");
            }
        });

        if let Some(stale) = self
            .running
            .lock()
            .insert(session.id.clone(), handle)
        {
            stale.abort();
        }
        Ok(ExecutionHandle {
            id: session.id.clone(),
        })
    }

    async fn state(&self, handle: &ExecutionHandle) -> Result<ExecutorState> {
        let running = self.running.lock();
        Ok(match running.get(&handle.id) {
            Some(task) if !task.is_finished() => ExecutorState::Running,
            _ => ExecutorState::Exited { exit_code: Some(0) },
        })
    }

    async fn stop(&self, handle: &ExecutionHandle) -> Result<()> {
        if let Some(task) = self.running.lock().get(&handle.id) {
            task.abort();
        }
        Ok(())
    }

    async fn cleanup(&self, handle: &ExecutionHandle) -> Result<()> {
        if let Some(task) = self.running.lock().remove(&handle.id) {
            task.abort();
        }
        Ok(())
    }
}
