//! The agent context — runtime binding of `{session, workspace, stores}`
//! with scoped propagation.
//!
//! The current context is a task-local value: it follows child futures
//! within a [`with_context`] scope, and sibling scopes never see each
//! other's value. Threads created outside the runtime (LLM client worker
//! threads, typically) cannot inherit a task-local, so a process-wide
//! fallback cell can be installed for them; the fallback is only consulted
//! when no scoped value is set.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use mgx_domain::{Error, Result};
use mgx_store::{EventStore, MessageStore};

/// Everything a tool or middleware needs to act on behalf of one run.
#[derive(Clone)]
pub struct AgentContext {
    pub session_id: String,
    pub workspace_id: String,
    pub workspace_path: PathBuf,
    pub event_store: Arc<dyn EventStore>,
    pub message_store: Arc<dyn MessageStore>,
    pub trace_id: Option<String>,
    /// Free-form correlation tags.
    pub tags: HashMap<String, String>,
}

impl AgentContext {
    pub fn new(
        session_id: impl Into<String>,
        workspace_id: impl Into<String>,
        workspace_path: impl Into<PathBuf>,
        event_store: Arc<dyn EventStore>,
        message_store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            workspace_id: workspace_id.into(),
            workspace_path: workspace_path.into(),
            event_store,
            message_store,
            trace_id: None,
            tags: HashMap::new(),
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

tokio::task_local! {
    static CURRENT: Arc<AgentContext>;
}

static FALLBACK: Mutex<Option<Arc<AgentContext>>> = Mutex::new(None);

/// Run a future with `ctx` as the current context. The previous value (if
/// any) is restored when the future completes — scopes nest and sibling
/// tasks are isolated.
pub async fn with_context<F>(ctx: Arc<AgentContext>, fut: F) -> F::Output
where
    F: std::future::Future,
{
    CURRENT.scope(ctx, fut).await
}

/// Resolve the current context: the innermost [`with_context`] scope, else
/// the process-wide fallback, else `Error::ContextNotSet`.
pub fn current() -> Result<Arc<AgentContext>> {
    if let Ok(ctx) = CURRENT.try_with(|c| c.clone()) {
        return Ok(ctx);
    }
    FALLBACK.lock().clone().ok_or(Error::ContextNotSet)
}

/// Install the process-wide fallback for threads that cannot inherit the
/// task-local (one agent container runs one session, so a single cell is
/// sufficient there).
pub fn install_fallback(ctx: Arc<AgentContext>) {
    *FALLBACK.lock() = Some(ctx);
}

/// Clear the process-wide fallback.
pub fn clear_fallback() {
    *FALLBACK.lock() = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgx_store::MemoryStore;

    fn ctx(session_id: &str) -> Arc<AgentContext> {
        let store = Arc::new(MemoryStore::new());
        Arc::new(AgentContext::new(
            session_id,
            format!("ws-{session_id}"),
            format!("/tmp/{session_id}"),
            store.clone(),
            store,
        ))
    }

    // Tests that touch the process-wide fallback cell serialize on this.
    static FALLBACK_TEST_GUARD: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn current_fails_outside_any_scope() {
        let _guard = FALLBACK_TEST_GUARD.lock();
        clear_fallback();
        assert!(matches!(current(), Err(Error::ContextNotSet)));
    }

    #[tokio::test]
    async fn with_context_scopes_the_value() {
        let result = with_context(ctx("s1"), async {
            current().unwrap().session_id.clone()
        })
        .await;
        assert_eq!(result, "s1");
    }

    #[tokio::test]
    async fn nested_scopes_restore_outer_value() {
        with_context(ctx("outer"), async {
            assert_eq!(current().unwrap().session_id, "outer");
            with_context(ctx("inner"), async {
                assert_eq!(current().unwrap().session_id, "inner");
            })
            .await;
            assert_eq!(current().unwrap().session_id, "outer");
        })
        .await;
    }

    #[tokio::test]
    async fn sibling_tasks_are_isolated() {
        let a = tokio::spawn(with_context(ctx("a"), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            current().unwrap().session_id.clone()
        }));
        let b = tokio::spawn(with_context(ctx("b"), async {
            current().unwrap().session_id.clone()
        }));
        assert_eq!(a.await.unwrap(), "a");
        assert_eq!(b.await.unwrap(), "b");
    }

    #[tokio::test]
    async fn spawned_task_does_not_inherit_without_scope() {
        let _guard = FALLBACK_TEST_GUARD.lock();
        clear_fallback();
        let handle = with_context(ctx("parent"), async {
            // A bare tokio::spawn starts a fresh task-local scope; child
            // futures must be wrapped in with_context to carry the value.
            tokio::spawn(async { current().is_ok() })
        })
        .await;
        assert!(!handle.await.unwrap());
    }

    #[tokio::test]
    async fn fallback_serves_unparented_threads() {
        let _guard = FALLBACK_TEST_GUARD.lock();
        install_fallback(ctx("proc"));
        let from_thread = std::thread::spawn(|| current().map(|c| c.session_id.clone()))
            .join()
            .unwrap();
        assert_eq!(from_thread.unwrap(), "proc");
        clear_fallback();
    }

    #[tokio::test]
    async fn scoped_value_shadows_fallback() {
        let _guard = FALLBACK_TEST_GUARD.lock();
        install_fallback(ctx("proc"));
        let seen = with_context(ctx("scoped"), async {
            current().unwrap().session_id.clone()
        })
        .await;
        assert_eq!(seen, "scoped");
        clear_fallback();
    }
}
