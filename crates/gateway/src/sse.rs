//! Stored events → SSE frames.
//!
//! The gateway polls the event store on a fixed interval and forwards
//! batches as SSE frames:
//!
//! ```text
//! event: <event_type>
//! id: <event_id>
//! data: <single-line JSON event envelope>
//! ```
//!
//! The watermark advances to the last-seen event timestamp after each
//! batch, so a reconnect with `since_timestamp` yields exactly the events
//! the client has not seen. A `finish` event closes the stream; a
//! connection that stays idle past the configured timeout closes without
//! one and the client resumes later.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::Event as SseEvent;
use futures_core::Stream;

use mgx_domain::config::SseConfig;
use mgx_domain::{Event, EventType, Result};
use mgx_store::SharedStore;

/// One polled batch: the events, the advanced watermark, and whether a
/// terminal event was included.
pub async fn next_batch(
    store: &SharedStore,
    session_id: &str,
    watermark: Option<f64>,
    batch_size: usize,
) -> Result<(Vec<Event>, Option<f64>, bool)> {
    let events = store
        .events_since(session_id, watermark, batch_size)
        .await?;
    let new_watermark = events.last().map(|e| e.ts).or(watermark);
    let finished = events.iter().any(|e| e.event_type == EventType::Finish);
    Ok((events, new_watermark, finished))
}

/// The single-line JSON carried in the `data:` field — the full event
/// envelope (its `data` member follows the runtime's emission table; `ts`
/// is the client's resume watermark).
pub fn wire_json(event: &Event) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| {
        tracing::error!(error = %e, "event serialization failed");
        String::from("{}")
    })
}

fn frame(event: &Event) -> SseEvent {
    SseEvent::default()
        .event(event.event_type.as_wire())
        .id(event.id.clone())
        .data(wire_json(event))
}

/// Build the polling SSE stream for a session, starting after `since`.
pub fn event_stream(
    store: SharedStore,
    session_id: String,
    since: Option<f64>,
    config: SseConfig,
) -> impl Stream<Item = std::result::Result<SseEvent, Infallible>> {
    let poll = Duration::from_millis(config.poll_ms);
    let idle_limit = Duration::from_secs(config.idle_timeout_sec);

    async_stream::stream! {
        let mut watermark = since;
        let mut idle_since = tokio::time::Instant::now();

        loop {
            match next_batch(&store, &session_id, watermark, config.batch_size).await {
                Ok((events, new_watermark, finished)) => {
                    if !events.is_empty() {
                        idle_since = tokio::time::Instant::now();
                    }
                    watermark = new_watermark;
                    for event in &events {
                        yield Ok(frame(event));
                        if event.event_type == EventType::Finish {
                            break;
                        }
                    }
                    if finished {
                        tracing::debug!(session_id = %session_id, "finish delivered; closing stream");
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "event poll failed");
                }
            }

            if idle_since.elapsed() >= idle_limit {
                tracing::info!(session_id = %session_id, "SSE idle timeout; closing stream");
                return;
            }
            tokio::time::sleep(poll).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use mgx_store::{EventStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn shared(store: Arc<MemoryStore>) -> SharedStore {
        store
    }

    async fn seed(store: &Arc<MemoryStore>, session: &str, ts: f64, et: EventType) -> Event {
        let event = Event::new(session, ts, et, json!({ "n": ts }));
        store.append_event(event.clone()).await.unwrap();
        event
    }

    fn fast_sse() -> SseConfig {
        SseConfig {
            poll_ms: 5,
            batch_size: 100,
            idle_timeout_sec: 1,
        }
    }

    #[test]
    fn wire_json_is_single_line() {
        let event = Event::new(
            "s1",
            1.5,
            EventType::LlmStream,
            json!({ "delta": "multi\nline", "content_type": "text" }),
        );
        let wire = wire_json(&event);
        assert!(!wire.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed["event_type"], "llm_stream");
        assert_eq!(parsed["ts"], 1.5);
        assert_eq!(parsed["data"]["delta"], "multi\nline");
    }

    #[tokio::test]
    async fn batch_respects_watermark_exclusively() {
        let store = Arc::new(MemoryStore::new());
        for ts in [1.0, 2.0, 3.0] {
            seed(&store, "s1", ts, EventType::LlmStream).await;
        }
        let shared = shared(store);

        let (events, watermark, finished) = next_batch(&shared, "s1", Some(1.0), 100)
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.ts > 1.0));
        assert_eq!(watermark, Some(3.0));
        assert!(!finished);
    }

    #[tokio::test]
    async fn batch_preserves_watermark_when_empty() {
        let store = Arc::new(MemoryStore::new());
        let shared = shared(store);
        let (events, watermark, _) = next_batch(&shared, "s1", Some(7.5), 100).await.unwrap();
        assert!(events.is_empty());
        assert_eq!(watermark, Some(7.5));
    }

    #[tokio::test]
    async fn batch_flags_finish() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "s1", 1.0, EventType::AgentStart).await;
        store
            .append_event(Event::new(
                "s1",
                2.0,
                EventType::Finish,
                json!({ "status": "success" }),
            ))
            .await
            .unwrap();
        let shared = shared(store);
        let (_, _, finished) = next_batch(&shared, "s1", None, 100).await.unwrap();
        assert!(finished);
    }

    #[tokio::test]
    async fn stream_closes_after_finish() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "s1", 1.0, EventType::AgentStart).await;
        seed(&store, "s1", 2.0, EventType::NodeStart).await;
        store
            .append_event(Event::new(
                "s1",
                3.0,
                EventType::Finish,
                json!({ "status": "success" }),
            ))
            .await
            .unwrap();

        let stream = event_stream(shared(store), "s1".into(), None, fast_sse());
        let frames: Vec<_> = stream.collect().await;
        // agent_start, node_start, finish — stream ends by itself.
        assert_eq!(frames.len(), 3);
    }

    #[tokio::test]
    async fn stream_picks_up_live_events_then_finish() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "s1", 1.0, EventType::AgentStart).await;

        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer
                .append_event(Event::new("s1", 2.0, EventType::NodeStart, json!({})))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer
                .append_event(Event::new(
                    "s1",
                    3.0,
                    EventType::Finish,
                    json!({ "status": "success" }),
                ))
                .await
                .unwrap();
        });

        let stream = event_stream(shared(store), "s1".into(), None, fast_sse());
        let frames: Vec<_> = stream.collect().await;
        assert_eq!(frames.len(), 3);
    }

    #[tokio::test]
    async fn stream_resumes_after_watermark_without_duplicates() {
        let store = Arc::new(MemoryStore::new());
        for ts in [1.0, 2.0, 3.0] {
            seed(&store, "s1", ts, EventType::LlmStream).await;
        }
        store
            .append_event(Event::new(
                "s1",
                4.0,
                EventType::Finish,
                json!({ "status": "success" }),
            ))
            .await
            .unwrap();

        // Resume from τ = 2.0: exactly the events after it.
        let stream = event_stream(shared(store), "s1".into(), Some(2.0), fast_sse());
        let frames: Vec<_> = stream.collect().await;
        assert_eq!(frames.len(), 2); // ts 3.0 and the finish
    }

    #[tokio::test]
    async fn idle_stream_times_out_without_finish() {
        let store = Arc::new(MemoryStore::new());
        let stream = event_stream(shared(store), "quiet".into(), None, fast_sse());
        let started = tokio::time::Instant::now();
        let frames: Vec<_> = stream.collect().await;
        assert!(frames.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
