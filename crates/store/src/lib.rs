//! Durable append-only storage for events, messages, and sessions, plus the
//! stop-signal control surface and the broker's task queue.
//!
//! Two interchangeable implementations share the same contracts: a SQLite
//! store behind a connection pool ([`SqliteStore`]) and an in-memory twin
//! ([`MemoryStore`]) that additionally exposes snapshots for test
//! inspection. Appends are idempotent on duplicate ids and fail only with
//! `Error::Persistence`.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mgx_domain::{Event, Result, Session, StoredMessage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store contracts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event. Idempotent on duplicate event id.
    async fn append_event(&self, event: Event) -> Result<String>;

    /// Events with `ts > since_ts` (all when `None`), canonical order
    /// `(ts, insertion)`, bounded by `limit`.
    async fn events_since(
        &self,
        session_id: &str,
        since_ts: Option<f64>,
        limit: usize,
    ) -> Result<Vec<Event>>;

    /// Fast lookup of the session's sole `finish` event, if present.
    async fn finish_event(&self, session_id: &str) -> Result<Option<Event>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one message. Idempotent on duplicate message id.
    async fn append_message(&self, message: StoredMessage) -> Result<String>;

    /// Messages for a session, ascending by `(ts, insertion)`, bounded by
    /// `limit` (the most recent `limit` messages are returned).
    async fn list_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>>;

    /// The most recent message in the session.
    async fn last_message(&self, session_id: &str) -> Result<Option<StoredMessage>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<()>;
    async fn get_session(&self, id: &str) -> Result<Option<Session>>;
    /// Sessions, newest first, optionally filtered by creator.
    async fn list_sessions(&self, created_by: Option<&str>) -> Result<Vec<Session>>;
    async fn set_running(&self, id: &str, running: bool) -> Result<()>;
}

/// Stop signals recorded by the gateway and observed by the orchestrator's
/// monitor loop.
#[async_trait]
pub trait ControlStore: Send + Sync {
    async fn request_stop(&self, session_id: &str) -> Result<()>;
    async fn stop_requested(&self, session_id: &str) -> Result<bool>;
    async fn clear_stop(&self, session_id: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task queue (broker backing)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One queued execution task. The payload is only the session id — the
/// agent rediscovers the prompt from the message store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTask {
    pub id: String,
    pub session_id: String,
    pub enqueued_at: f64,
    pub attempts: u32,
}

/// At-least-once task queue with lease-based redelivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue_task(&self, session_id: &str) -> Result<String>;

    /// Claim the oldest deliverable task (queued, or claimed with an
    /// expired lease). Returns `None` when the queue is empty.
    async fn claim_task(&self, lease_sec: u64) -> Result<Option<ExecutionTask>>;

    /// Acknowledge completion; the task will not be redelivered.
    async fn ack_task(&self, task_id: &str) -> Result<()>;

    /// Return a claimed task to the queue for immediate redelivery.
    async fn nack_task(&self, task_id: &str) -> Result<()>;
}

/// The full store surface, as wired through the application.
pub trait Store:
    EventStore + MessageStore + SessionStore + ControlStore + TaskQueue + Send + Sync
{
}

impl<T> Store for T where
    T: EventStore + MessageStore + SessionStore + ControlStore + TaskQueue + Send + Sync
{
}

pub type SharedStore = Arc<dyn Store>;

/// Canonical event ordering used by both implementations: `(ts, insertion)`.
/// `f64::total_cmp` gives a total order; the sort is stable so insertion
/// order breaks ties.
pub(crate) fn sort_canonical(events: &mut [Event]) {
    events.sort_by(|a, b| a.ts.total_cmp(&b.ts));
}
