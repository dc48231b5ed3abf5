//! In-memory store — the durable store's test/dev twin.
//!
//! Keeps events and messages in insertion-ordered vectors with id sets for
//! idempotency. Canonical read order falls out of a stable sort by
//! timestamp. Snapshots expose the raw contents for test inspection.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use mgx_domain::{epoch_now, Event, EventType, Result, Session, StoredMessage};

use crate::{
    ControlStore, EventStore, ExecutionTask, MessageStore, SessionStore, TaskQueue, sort_canonical,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Queued,
    Claimed,
    Done,
}

struct TaskEntry {
    task: ExecutionTask,
    state: TaskState,
    lease_until: f64,
}

#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<Vec<Event>>,
    event_ids: RwLock<HashSet<String>>,
    messages: RwLock<Vec<StoredMessage>>,
    message_ids: RwLock<HashSet<String>>,
    sessions: RwLock<HashMap<String, Session>>,
    stops: RwLock<HashSet<String>>,
    tasks: Mutex<Vec<TaskEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events of a session in canonical order (test inspection).
    pub fn events_snapshot(&self, session_id: &str) -> Vec<Event> {
        let mut out: Vec<Event> = self
            .events
            .read()
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        sort_canonical(&mut out);
        out
    }

    /// All messages of a session in ascending order (test inspection).
    pub fn messages_snapshot(&self, session_id: &str) -> Vec<StoredMessage> {
        let mut out: Vec<StoredMessage> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.ts.total_cmp(&b.ts));
        out
    }

    /// Drop expired records; returns (events_removed, messages_removed).
    pub fn purge_expired(&self, now: f64, event_ttl_sec: u64, message_ttl_sec: u64) -> (usize, usize) {
        let event_cutoff = now - event_ttl_sec as f64;
        let message_cutoff = now - message_ttl_sec as f64;

        let mut events = self.events.write();
        let before_events = events.len();
        events.retain(|e| e.ts >= event_cutoff);
        let removed_events = before_events - events.len();
        {
            let keep: HashSet<String> = events.iter().map(|e| e.id.clone()).collect();
            self.event_ids.write().retain(|id| keep.contains(id));
        }

        let mut messages = self.messages.write();
        let before_messages = messages.len();
        messages.retain(|m| m.ts >= message_cutoff);
        let removed_messages = before_messages - messages.len();
        {
            let keep: HashSet<String> = messages.iter().map(|m| m.id.clone()).collect();
            self.message_ids.write().retain(|id| keep.contains(id));
        }

        (removed_events, removed_messages)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append_event(&self, event: Event) -> Result<String> {
        let id = event.id.clone();
        {
            let mut ids = self.event_ids.write();
            if !ids.insert(id.clone()) {
                return Ok(id);
            }
        }
        self.events.write().push(event);
        Ok(id)
    }

    async fn events_since(
        &self,
        session_id: &str,
        since_ts: Option<f64>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let mut out: Vec<Event> = self
            .events
            .read()
            .iter()
            .filter(|e| e.session_id == session_id)
            .filter(|e| since_ts.map_or(true, |ts| e.ts > ts))
            .cloned()
            .collect();
        sort_canonical(&mut out);
        out.truncate(limit);
        Ok(out)
    }

    async fn finish_event(&self, session_id: &str) -> Result<Option<Event>> {
        Ok(self
            .events
            .read()
            .iter()
            .find(|e| e.session_id == session_id && e.event_type == EventType::Finish)
            .cloned())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append_message(&self, message: StoredMessage) -> Result<String> {
        let id = message.id.clone();
        {
            let mut ids = self.message_ids.write();
            if !ids.insert(id.clone()) {
                return Ok(id);
            }
        }
        self.messages.write().push(message);
        Ok(id)
    }

    async fn list_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let mut out = self.messages_snapshot(session_id);
        if out.len() > limit {
            out.drain(..out.len() - limit);
        }
        Ok(out)
    }

    async fn last_message(&self, session_id: &str) -> Result<Option<StoredMessage>> {
        Ok(self.messages_snapshot(session_id).pop())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: Session) -> Result<()> {
        self.sessions.write().insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().get(id).cloned())
    }

    async fn list_sessions(&self, created_by: Option<&str>) -> Result<Vec<Session>> {
        let mut out: Vec<Session> = self
            .sessions
            .read()
            .values()
            .filter(|s| created_by.map_or(true, |u| s.created_by == u))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn set_running(&self, id: &str, running: bool) -> Result<()> {
        if let Some(session) = self.sessions.write().get_mut(id) {
            session.is_running = running;
            session.updated_at = chrono::Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl ControlStore for MemoryStore {
    async fn request_stop(&self, session_id: &str) -> Result<()> {
        self.stops.write().insert(session_id.to_owned());
        Ok(())
    }

    async fn stop_requested(&self, session_id: &str) -> Result<bool> {
        Ok(self.stops.read().contains(session_id))
    }

    async fn clear_stop(&self, session_id: &str) -> Result<()> {
        self.stops.write().remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for MemoryStore {
    async fn enqueue_task(&self, session_id: &str) -> Result<String> {
        let task = ExecutionTask {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_owned(),
            enqueued_at: epoch_now(),
            attempts: 0,
        };
        let id = task.id.clone();
        self.tasks.lock().push(TaskEntry {
            task,
            state: TaskState::Queued,
            lease_until: 0.0,
        });
        Ok(id)
    }

    async fn claim_task(&self, lease_sec: u64) -> Result<Option<ExecutionTask>> {
        let now = epoch_now();
        let mut tasks = self.tasks.lock();
        let claimable = tasks.iter_mut().find(|entry| {
            entry.state == TaskState::Queued
                || (entry.state == TaskState::Claimed && entry.lease_until < now)
        });
        Ok(claimable.map(|entry| {
            entry.state = TaskState::Claimed;
            entry.lease_until = now + lease_sec as f64;
            entry.task.attempts += 1;
            entry.task.clone()
        }))
    }

    async fn ack_task(&self, task_id: &str) -> Result<()> {
        if let Some(entry) = self.tasks.lock().iter_mut().find(|e| e.task.id == task_id) {
            entry.state = TaskState::Done;
        }
        Ok(())
    }

    async fn nack_task(&self, task_id: &str) -> Result<()> {
        if let Some(entry) = self.tasks.lock().iter_mut().find(|e| e.task.id == task_id) {
            if entry.state == TaskState::Claimed {
                entry.state = TaskState::Queued;
                entry.lease_until = 0.0;
            }
        }
        Ok(())
    }
}
