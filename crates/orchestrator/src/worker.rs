//! Background worker pool over the broker queue.
//!
//! Workers are thin shims: claim a task, hand the session id to the
//! orchestrator, ack on completion. Agent work happens inside the spawned
//! execution, so workers stay cheap and horizontally scalable. Delivery is
//! at-least-once — a worker that dies mid-task lets the lease expire and
//! the task is claimed again.

use std::sync::Arc;
use std::time::Duration;

use mgx_domain::config::BrokerConfig;
use mgx_store::{SharedStore, TaskQueue};

use crate::monitor::Orchestrator;

pub struct WorkerPool {
    store: SharedStore,
    orchestrator: Arc<Orchestrator>,
    config: BrokerConfig,
}

impl WorkerPool {
    pub fn new(store: SharedStore, orchestrator: Arc<Orchestrator>, config: BrokerConfig) -> Self {
        Self {
            store,
            orchestrator,
            config,
        }
    }

    /// Spawn the configured number of workers. The returned handles run
    /// until aborted (process shutdown).
    pub fn spawn(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.workers.max(1))
            .map(|worker_id| {
                let pool = self.clone();
                tokio::spawn(async move {
                    pool.worker_loop(worker_id).await;
                })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: usize) {
        let idle = Duration::from_millis(self.config.poll_ms);
        tracing::info!(worker_id, "worker started");

        loop {
            match self.store.claim_task(self.config.lease_sec).await {
                Ok(Some(task)) => {
                    tracing::info!(
                        worker_id,
                        task_id = %task.id,
                        session_id = %task.session_id,
                        attempt = task.attempts,
                        "task claimed"
                    );
                    match self.orchestrator.execute(&task.session_id).await {
                        Ok(status) => {
                            tracing::info!(worker_id, task_id = %task.id, ?status, "task done");
                            if let Err(e) = self.store.ack_task(&task.id).await {
                                tracing::warn!(task_id = %task.id, error = %e, "ack failed");
                            }
                        }
                        Err(e) => {
                            // Redeliver: another attempt may succeed (e.g.
                            // transient store or Docker failure).
                            tracing::error!(
                                worker_id,
                                task_id = %task.id,
                                error = %e,
                                "task execution failed; returning to queue"
                            );
                            if let Err(e) = self.store.nack_task(&task.id).await {
                                tracing::warn!(task_id = %task.id, error = %e, "nack failed");
                            }
                            tokio::time::sleep(idle).await;
                        }
                    }
                }
                Ok(None) => tokio::time::sleep(idle).await,
                Err(e) => {
                    tracing::warn!(worker_id, error = %e, "queue poll failed");
                    tokio::time::sleep(idle).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgx_domain::config::OrchestratorConfig;
    use mgx_domain::{epoch_now, EventType, Framework, Session, StoredMessage};
    use mgx_providers::{LlmProvider, ProviderRegistry, ScriptedProvider, ScriptedTurn};
    use mgx_runtime::RunConfig;
    use mgx_store::{EventStore, MemoryStore, MessageStore, SessionStore};

    #[tokio::test]
    async fn worker_drains_queue_and_acks() {
        let store = Arc::new(MemoryStore::new());
        let ws = tempfile::TempDir::new().unwrap();

        // Two sessions with one queued task each.
        let mut session_ids = Vec::new();
        for prompt in ["one", "two"] {
            let session = Session::new("app", Framework::Nextjs, "u1");
            std::fs::create_dir_all(ws.path().join(&session.workspace_id)).unwrap();
            store.create_session(session.clone()).await.unwrap();
            store
                .append_message(StoredMessage::user(session.id.clone(), prompt, epoch_now()))
                .await
                .unwrap();
            store.enqueue_task(&session.id).await.unwrap();
            session_ids.push(session.id);
        }

        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(vec![
            ScriptedTurn::text("a <next_action>end</next_action>"),
            ScriptedTurn::text("b <next_action>end</next_action>"),
        ]));
        let executor = Arc::new(crate::executor::InProcessExecutor::new(
            store.clone(),
            store.clone(),
            Arc::new(ProviderRegistry::single("scripted", provider)),
            mgx_tools::builtin_registry(&Default::default()).unwrap(),
            RunConfig {
                retry_attempts: 1,
                retry_base_ms: 1,
                ..RunConfig::default()
            },
            ws.path().to_path_buf(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            executor,
            store.clone(),
            OrchestratorConfig {
                poll_interval_sec: 0,
                ..OrchestratorConfig::default()
            },
        ));

        let pool = Arc::new(WorkerPool::new(
            store.clone(),
            orchestrator,
            BrokerConfig {
                workers: 1,
                poll_ms: 10,
                lease_sec: 60,
            },
        ));
        let handles = pool.spawn();

        // Wait for both runs to finish.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let mut done = 0;
            for sid in &session_ids {
                if store.finish_event(sid).await.unwrap().is_some() {
                    done += 1;
                }
            }
            if done == session_ids.len() {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "workers did not drain the queue"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        for handle in handles {
            handle.abort();
        }

        // Both tasks acked: nothing left to claim.
        assert!(store.claim_task(60).await.unwrap().is_none());
        for sid in &session_ids {
            let events = store.events_snapshot(sid);
            assert_eq!(
                events
                    .iter()
                    .filter(|e| e.event_type == EventType::Finish)
                    .count(),
                1
            );
        }
    }
}
