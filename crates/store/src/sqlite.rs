//! SQLite-backed store behind a connection pool.
//!
//! Canonical event order is `(ts, rowid)` — rowid is the insertion
//! sequence, so equal timestamps keep append order. Appends use
//! `INSERT OR IGNORE` for idempotency on duplicate ids.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use mgx_domain::{epoch_now, Error, Event, EventType, Framework, Result, Session, StoredMessage};

use crate::{ControlStore, EventStore, ExecutionTask, MessageStore, SessionStore, TaskQueue};

pub struct SqliteStore {
    pool: SqlitePool,
}

fn persistence(e: sqlx::Error) -> Error {
    Error::Persistence(e.to_string())
}

impl SqliteStore {
    /// Connect and run the idempotent schema migration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(persistence)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        const SCHEMA: &str = r#"
        CREATE TABLE IF NOT EXISTS events (
            id          TEXT PRIMARY KEY,
            session_id  TEXT NOT NULL,
            ts          REAL NOT NULL,
            event_type  TEXT NOT NULL,
            agent_name  TEXT,
            namespace   TEXT NOT NULL DEFAULT '[]',
            data        TEXT NOT NULL,
            message_id  TEXT,
            trace_id    TEXT,
            metadata    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_events_session_ts ON events(session_id, ts);
        CREATE INDEX IF NOT EXISTS idx_events_session_type ON events(session_id, event_type);
        CREATE INDEX IF NOT EXISTS idx_events_ts ON events(ts);

        CREATE TABLE IF NOT EXISTS messages (
            id            TEXT PRIMARY KEY,
            session_id    TEXT NOT NULL,
            parent_id     TEXT,
            role          TEXT NOT NULL,
            agent_name    TEXT,
            content       TEXT NOT NULL,
            content_parts TEXT,
            tool_call_id  TEXT,
            tool_calls    TEXT NOT NULL DEFAULT '[]',
            trace_id      TEXT,
            ts            REAL NOT NULL,
            metadata      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session_ts ON messages(session_id, ts);
        CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(ts);

        CREATE TABLE IF NOT EXISTS sessions (
            id           TEXT PRIMARY KEY,
            name         TEXT NOT NULL,
            framework    TEXT NOT NULL,
            workspace_id TEXT NOT NULL,
            created_by   TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL,
            is_running   INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_creator ON sessions(created_by);

        CREATE TABLE IF NOT EXISTS stop_signals (
            session_id   TEXT PRIMARY KEY,
            requested_at REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id          TEXT PRIMARY KEY,
            session_id  TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'queued',
            enqueued_at REAL NOT NULL,
            lease_until REAL NOT NULL DEFAULT 0,
            attempts    INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, lease_until);
        "#;

        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(())
    }

    /// Delete expired records; returns (events_removed, messages_removed).
    pub async fn purge_expired(
        &self,
        now: f64,
        event_ttl_sec: u64,
        message_ttl_sec: u64,
    ) -> Result<(u64, u64)> {
        let events = sqlx::query("DELETE FROM events WHERE ts < ?")
            .bind(now - event_ttl_sec as f64)
            .execute(&self.pool)
            .await
            .map_err(persistence)?
            .rows_affected();
        let messages = sqlx::query("DELETE FROM messages WHERE ts < ?")
            .bind(now - message_ttl_sec as f64)
            .execute(&self.pool)
            .await
            .map_err(persistence)?
            .rows_affected();
        Ok((events, messages))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Row decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn decode_event(row: &SqliteRow) -> Result<Event> {
    let event_type_raw: String = row.get("event_type");
    let event_type = EventType::parse_wire(&event_type_raw)
        .ok_or_else(|| Error::Persistence(format!("unknown event type '{event_type_raw}'")))?;
    let namespace: String = row.get("namespace");
    let data: String = row.get("data");
    let metadata: Option<String> = row.get("metadata");
    Ok(Event {
        id: row.get("id"),
        session_id: row.get("session_id"),
        ts: row.get("ts"),
        event_type,
        agent_name: row.get("agent_name"),
        namespace: serde_json::from_str(&namespace)?,
        data: serde_json::from_str(&data)?,
        message_id: row.get("message_id"),
        trace_id: row.get("trace_id"),
        metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
    })
}

fn decode_message(row: &SqliteRow) -> Result<StoredMessage> {
    let role: String = row.get("role");
    let content_parts: Option<String> = row.get("content_parts");
    let tool_calls: String = row.get("tool_calls");
    let metadata: Option<String> = row.get("metadata");
    Ok(StoredMessage {
        id: row.get("id"),
        session_id: row.get("session_id"),
        parent_id: row.get("parent_id"),
        role: serde_json::from_str(&format!("\"{role}\""))?,
        agent_name: row.get("agent_name"),
        content: row.get("content"),
        content_parts: content_parts.map(|p| serde_json::from_str(&p)).transpose()?,
        tool_call_id: row.get("tool_call_id"),
        tool_calls: serde_json::from_str(&tool_calls)?,
        trace_id: row.get("trace_id"),
        ts: row.get("ts"),
        metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
    })
}

fn decode_session(row: &SqliteRow) -> Result<Session> {
    let framework_raw: String = row.get("framework");
    let framework = Framework::parse(&framework_raw)
        .ok_or_else(|| Error::Persistence(format!("unknown framework '{framework_raw}'")))?;
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let parse = |s: &str| -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Persistence(format!("bad timestamp '{s}': {e}")))
    };
    Ok(Session {
        id: row.get("id"),
        name: row.get("name"),
        framework,
        workspace_id: row.get("workspace_id"),
        created_by: row.get("created_by"),
        created_at: parse(&created_at)?,
        updated_at: parse(&updated_at)?,
        is_running: row.get::<i64, _>("is_running") != 0,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl EventStore for SqliteStore {
    async fn append_event(&self, event: Event) -> Result<String> {
        sqlx::query(
            "INSERT OR IGNORE INTO events \
             (id, session_id, ts, event_type, agent_name, namespace, data, message_id, trace_id, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(&event.session_id)
        .bind(event.ts)
        .bind(event.event_type.as_wire())
        .bind(&event.agent_name)
        .bind(serde_json::to_string(&event.namespace)?)
        .bind(serde_json::to_string(&event.data)?)
        .bind(&event.message_id)
        .bind(&event.trace_id)
        .bind(
            event
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(event.id)
    }

    async fn events_since(
        &self,
        session_id: &str,
        since_ts: Option<f64>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE session_id = ? AND ts > ? \
             ORDER BY ts, rowid LIMIT ?",
        )
        .bind(session_id)
        .bind(since_ts.unwrap_or(-1.0))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;
        rows.iter().map(decode_event).collect()
    }

    async fn finish_event(&self, session_id: &str) -> Result<Option<Event>> {
        let row = sqlx::query(
            "SELECT * FROM events WHERE session_id = ? AND event_type = 'finish' \
             ORDER BY ts, rowid LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?;
        row.as_ref().map(decode_event).transpose()
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append_message(&self, message: StoredMessage) -> Result<String> {
        let role = serde_json::to_string(&message.role)?;
        sqlx::query(
            "INSERT OR IGNORE INTO messages \
             (id, session_id, parent_id, role, agent_name, content, content_parts, \
              tool_call_id, tool_calls, trace_id, ts, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(&message.parent_id)
        .bind(role.trim_matches('"'))
        .bind(&message.agent_name)
        .bind(&message.content)
        .bind(
            message
                .content_parts
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(&message.tool_call_id)
        .bind(serde_json::to_string(&message.tool_calls)?)
        .bind(&message.trace_id)
        .bind(message.ts)
        .bind(
            message
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(message.id)
    }

    async fn list_messages(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        // Newest `limit` messages, returned ascending.
        let rows = sqlx::query(
            "SELECT * FROM (SELECT * FROM messages WHERE session_id = ? \
             ORDER BY ts DESC, rowid DESC LIMIT ?) ORDER BY ts, rowid",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;
        rows.iter().map(decode_message).collect()
    }

    async fn last_message(&self, session_id: &str) -> Result<Option<StoredMessage>> {
        let row = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ? ORDER BY ts DESC, rowid DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?;
        row.as_ref().map(decode_message).transpose()
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(&self, session: Session) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sessions \
             (id, name, framework, workspace_id, created_by, created_at, updated_at, is_running) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.name)
        .bind(session.framework.as_str())
        .bind(&session.workspace_id)
        .bind(&session.created_by)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .bind(session.is_running as i64)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence)?;
        row.as_ref().map(decode_session).transpose()
    }

    async fn list_sessions(&self, created_by: Option<&str>) -> Result<Vec<Session>> {
        let rows = match created_by {
            Some(user) => {
                sqlx::query("SELECT * FROM sessions WHERE created_by = ? ORDER BY created_at DESC")
                    .bind(user)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM sessions ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(persistence)?;
        rows.iter().map(decode_session).collect()
    }

    async fn set_running(&self, id: &str, running: bool) -> Result<()> {
        sqlx::query("UPDATE sessions SET is_running = ?, updated_at = ? WHERE id = ?")
            .bind(running as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(())
    }
}

#[async_trait]
impl ControlStore for SqliteStore {
    async fn request_stop(&self, session_id: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO stop_signals (session_id, requested_at) VALUES (?, ?)")
            .bind(session_id)
            .bind(epoch_now())
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(())
    }

    async fn stop_requested(&self, session_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM stop_signals WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(row.is_some())
    }

    async fn clear_stop(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM stop_signals WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for SqliteStore {
    async fn enqueue_task(&self, session_id: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO tasks (id, session_id, enqueued_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(session_id)
            .bind(epoch_now())
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(id)
    }

    async fn claim_task(&self, lease_sec: u64) -> Result<Option<ExecutionTask>> {
        let now = epoch_now();
        // Single-statement claim keeps the pop atomic across workers.
        let row = sqlx::query(
            "UPDATE tasks SET status = 'claimed', lease_until = ?, attempts = attempts + 1 \
             WHERE id = (SELECT id FROM tasks \
                         WHERE status = 'queued' OR (status = 'claimed' AND lease_until < ?) \
                         ORDER BY enqueued_at LIMIT 1) \
             RETURNING id, session_id, enqueued_at, attempts",
        )
        .bind(now + lease_sec as f64)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(row.map(|r| ExecutionTask {
            id: r.get("id"),
            session_id: r.get("session_id"),
            enqueued_at: r.get("enqueued_at"),
            attempts: r.get::<i64, _>("attempts") as u32,
        }))
    }

    async fn ack_task(&self, task_id: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = 'done' WHERE id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(())
    }

    async fn nack_task(&self, task_id: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = 'queued', lease_until = 0 WHERE id = ? AND status = 'claimed'")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        Ok(())
    }
}
