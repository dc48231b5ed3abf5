//! The monitor loop — observes executor liveness and store state, never
//! agent output.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use mgx_domain::config::OrchestratorConfig;
use mgx_domain::{epoch_now, Error, Event, EventType, FinishStatus, Result};
use mgx_store::{ControlStore, EventStore, SessionStore, SharedStore};

use crate::executor::{ExecutionHandle, Executor, ExecutorState};

pub struct Orchestrator {
    executor: Arc<dyn Executor>,
    store: SharedStore,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn Executor>, store: SharedStore, config: OrchestratorConfig) -> Self {
        Self {
            executor,
            store,
            config,
        }
    }

    /// Execute one task end to end and return the run's terminal status.
    pub async fn execute(&self, session_id: &str) -> Result<FinishStatus> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| Error::Invariant(format!("unknown session '{session_id}'")))?;

        // A stop signal left over from a previous run must not kill this
        // one before it starts.
        self.store.clear_stop(session_id).await?;
        self.store.set_running(session_id, true).await?;

        let handle = match self.executor.launch(&session).await {
            Ok(handle) => handle,
            Err(e) => {
                self.synthesize_finish(session_id, FinishStatus::Failed, "launch-failed", None)
                    .await?;
                self.store.set_running(session_id, false).await?;
                return Err(e);
            }
        };

        let status = self.monitor(session_id, &handle).await;

        // Idempotent teardown regardless of how the run ended.
        if let Err(e) = self.executor.cleanup(&handle).await {
            tracing::warn!(session_id, error = %e, "executor cleanup failed");
        }
        self.store.set_running(session_id, false).await?;
        self.store.clear_stop(session_id).await?;

        status
    }

    async fn monitor(&self, session_id: &str, handle: &ExecutionHandle) -> Result<FinishStatus> {
        let poll = Duration::from_secs(self.config.poll_interval_sec);
        let deadline = Instant::now() + Duration::from_secs(self.config.task_timeout_sec);
        // One extra poll after an exit, so a finish written just before
        // the exit is observed rather than overwritten.
        let mut saw_exit = false;

        loop {
            // 1. A real finish event ends the watch.
            if let Some(finish) = self.store.finish_event(session_id).await? {
                let status = finish.finish_status().unwrap_or(FinishStatus::Failed);
                tracing::info!(session_id, ?status, "run finished");
                return Ok(status);
            }

            // 2. Explicit stop signal.
            if self.store.stop_requested(session_id).await? {
                tracing::info!(session_id, "stop requested; terminating execution");
                self.executor.stop(handle).await?;
                return self
                    .synthesize_finish(session_id, FinishStatus::Stopped, "stop-requested", None)
                    .await;
            }

            // 3. Executor liveness.
            match self.executor.state(handle).await? {
                ExecutorState::Running => {}
                ExecutorState::Exited { exit_code } => {
                    if saw_exit {
                        tracing::warn!(session_id, ?exit_code, "execution exited without finish");
                        return self
                            .synthesize_finish(
                                session_id,
                                FinishStatus::Failed,
                                "container-exited",
                                exit_code,
                            )
                            .await;
                    }
                    saw_exit = true;
                }
            }

            // 4. Wall clock.
            if Instant::now() >= deadline {
                tracing::warn!(session_id, "task timeout; terminating execution");
                self.executor.stop(handle).await?;
                return self
                    .synthesize_finish(session_id, FinishStatus::Timeout, "task-timeout", None)
                    .await;
            }

            tokio::time::sleep(poll).await;
        }
    }

    /// Append a synthetic finish event — unless a real one landed in the
    /// meantime, in which case the real status wins.
    async fn synthesize_finish(
        &self,
        session_id: &str,
        status: FinishStatus,
        reason: &str,
        exit_code: Option<i64>,
    ) -> Result<FinishStatus> {
        if let Some(existing) = self.store.finish_event(session_id).await? {
            return Ok(existing.finish_status().unwrap_or(status));
        }
        let mut data = json!({ "status": status, "reason": reason });
        if let Some(code) = exit_code {
            data["exit_code"] = json!(code);
        }
        let event = Event::new(session_id, epoch_now(), EventType::Finish, data);
        self.store.append_event(event).await?;
        tracing::info!(session_id, ?status, reason, "synthetic finish recorded");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mgx_domain::{Framework, Session, StoredMessage};
    use mgx_providers::{LlmProvider, ProviderRegistry, ScriptedProvider, ScriptedTurn};
    use mgx_runtime::RunConfig;
    use mgx_store::{MemoryStore, MessageStore, SessionStore};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tokio::task::JoinHandle;

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            poll_interval_sec: 0,
            task_timeout_sec: 30,
            ..OrchestratorConfig::default()
        }
    }

    async fn seeded_session(store: &Arc<MemoryStore>, prompt: &str) -> Session {
        let session = Session::new("app", Framework::Nextjs, "u1");
        store.create_session(session.clone()).await.unwrap();
        store
            .append_message(StoredMessage::user(session.id.clone(), prompt, epoch_now()))
            .await
            .unwrap();
        session
    }

    fn in_process(
        store: &Arc<MemoryStore>,
        turns: Vec<ScriptedTurn>,
        workspace: &std::path::Path,
    ) -> Arc<dyn Executor> {
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(turns));
        Arc::new(crate::executor::InProcessExecutor::new(
            store.clone(),
            store.clone(),
            Arc::new(ProviderRegistry::single("scripted", provider)),
            mgx_tools::builtin_registry(&Default::default()).unwrap(),
            RunConfig {
                retry_attempts: 1,
                retry_base_ms: 1,
                ..RunConfig::default()
            },
            workspace.to_path_buf(),
        ))
    }

    #[tokio::test]
    async fn happy_path_returns_runtime_status() {
        let store = Arc::new(MemoryStore::new());
        let ws = tempfile::TempDir::new().unwrap();
        let session = seeded_session(&store, "hello").await;
        std::fs::create_dir_all(ws.path().join(&session.workspace_id)).unwrap();

        let executor = in_process(
            &store,
            vec![ScriptedTurn::text("hi <next_action>end</next_action>")],
            ws.path(),
        );
        let orchestrator = Orchestrator::new(executor, store.clone(), fast_config());

        let status = orchestrator.execute(&session.id).await.unwrap();
        assert_eq!(status, FinishStatus::Success);

        // is_running was toggled back off.
        let session = store.get_session(&session.id).await.unwrap().unwrap();
        assert!(!session.is_running);
        // Exactly one finish event.
        let events = store.events_snapshot(&session.id);
        assert_eq!(
            events
                .iter()
                .filter(|e| e.event_type == EventType::Finish)
                .count(),
            1
        );
    }

    /// An executor whose task never finishes and never writes events.
    struct HangingExecutor {
        tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    }

    impl HangingExecutor {
        fn new() -> Self {
            Self {
                tasks: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl Executor for HangingExecutor {
        async fn launch(&self, session: &Session) -> Result<ExecutionHandle> {
            let handle = tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            });
            self.tasks.lock().insert(session.id.clone(), handle);
            Ok(ExecutionHandle {
                id: session.id.clone(),
            })
        }

        async fn state(&self, handle: &ExecutionHandle) -> Result<ExecutorState> {
            let tasks = self.tasks.lock();
            Ok(match tasks.get(&handle.id) {
                Some(t) if !t.is_finished() => ExecutorState::Running,
                _ => ExecutorState::Exited { exit_code: None },
            })
        }

        async fn stop(&self, handle: &ExecutionHandle) -> Result<()> {
            if let Some(t) = self.tasks.lock().get(&handle.id) {
                t.abort();
            }
            Ok(())
        }

        async fn cleanup(&self, handle: &ExecutionHandle) -> Result<()> {
            if let Some(t) = self.tasks.lock().remove(&handle.id) {
                t.abort();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_signal_synthesizes_stopped_and_clears() {
        let store = Arc::new(MemoryStore::new());
        let session = seeded_session(&store, "hello").await;
        let orchestrator = Orchestrator::new(
            Arc::new(HangingExecutor::new()),
            store.clone(),
            fast_config(),
        );

        let store_for_stop = store.clone();
        let sid = session.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            mgx_store::ControlStore::request_stop(store_for_stop.as_ref(), &sid)
                .await
                .unwrap();
        });

        let status = orchestrator.execute(&session.id).await.unwrap();
        assert_eq!(status, FinishStatus::Stopped);

        let finish = mgx_store::EventStore::finish_event(store.as_ref(), &session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finish.finish_status(), Some(FinishStatus::Stopped));
        assert_eq!(finish.data["reason"], "stop-requested");

        // The signal is cleared, so a subsequent run is not killed at birth.
        assert!(
            !mgx_store::ControlStore::stop_requested(store.as_ref(), &session.id)
                .await
                .unwrap()
        );
        assert!(!store.get_session(&session.id).await.unwrap().unwrap().is_running);
    }

    #[tokio::test]
    async fn timeout_synthesizes_timeout() {
        let store = Arc::new(MemoryStore::new());
        let session = seeded_session(&store, "hello").await;
        let orchestrator = Orchestrator::new(
            Arc::new(HangingExecutor::new()),
            store.clone(),
            OrchestratorConfig {
                poll_interval_sec: 0,
                task_timeout_sec: 0,
                ..OrchestratorConfig::default()
            },
        );

        let status = orchestrator.execute(&session.id).await.unwrap();
        assert_eq!(status, FinishStatus::Timeout);
        let finish = mgx_store::EventStore::finish_event(store.as_ref(), &session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finish.data["reason"], "task-timeout");
    }

    /// An executor that exits immediately without ever writing a finish.
    struct CrashingExecutor;

    #[async_trait]
    impl Executor for CrashingExecutor {
        async fn launch(&self, session: &Session) -> Result<ExecutionHandle> {
            Ok(ExecutionHandle {
                id: session.id.clone(),
            })
        }
        async fn state(&self, _handle: &ExecutionHandle) -> Result<ExecutorState> {
            Ok(ExecutorState::Exited { exit_code: Some(137) })
        }
        async fn stop(&self, _handle: &ExecutionHandle) -> Result<()> {
            Ok(())
        }
        async fn cleanup(&self, _handle: &ExecutionHandle) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn container_exit_without_finish_synthesizes_failed() {
        let store = Arc::new(MemoryStore::new());
        let session = seeded_session(&store, "hello").await;
        let orchestrator =
            Orchestrator::new(Arc::new(CrashingExecutor), store.clone(), fast_config());

        let status = orchestrator.execute(&session.id).await.unwrap();
        assert_eq!(status, FinishStatus::Failed);
        let finish = mgx_store::EventStore::finish_event(store.as_ref(), &session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finish.data["reason"], "container-exited");
        assert_eq!(finish.data["exit_code"], 137);
    }

    #[tokio::test]
    async fn synthetic_finish_suppressed_by_real_one() {
        let store = Arc::new(MemoryStore::new());
        let session = seeded_session(&store, "hello").await;
        // A real finish already exists.
        mgx_store::EventStore::append_event(
            store.as_ref(),
            Event::new(
                &session.id,
                epoch_now(),
                EventType::Finish,
                json!({ "status": "success" }),
            ),
        )
        .await
        .unwrap();

        let orchestrator =
            Orchestrator::new(Arc::new(CrashingExecutor), store.clone(), fast_config());
        let status = orchestrator.execute(&session.id).await.unwrap();
        assert_eq!(status, FinishStatus::Success);

        let events = store.events_snapshot(&session.id);
        assert_eq!(
            events
                .iter()
                .filter(|e| e.event_type == EventType::Finish)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn unknown_session_is_invariant_error() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator =
            Orchestrator::new(Arc::new(CrashingExecutor), store.clone(), fast_config());
        let err = orchestrator.execute("ghost").await;
        assert!(matches!(err, Err(Error::Invariant(_))));
    }
}
