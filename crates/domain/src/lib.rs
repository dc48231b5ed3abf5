//! Shared vocabulary for the MGX agent execution core.
//!
//! Every other crate in the workspace depends on this one: the persisted
//! record types ([`Event`], [`StoredMessage`], [`Session`]), the per-run
//! blackboard ([`TeamState`]), the provider-agnostic chat types, the
//! configuration tree, and the error taxonomy.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod session;
pub mod stream;
pub mod team;

pub use chat::{ChatContent, ChatMessage, ChatPart, ChatRole, ToolDefinition};
pub use error::{Error, Result};
pub use event::{Event, EventType, FinishStatus};
pub use message::{ContentPart, Role, StoredMessage, ToolCall};
pub use session::{Framework, Session};
pub use stream::{BoxStream, StreamEvent, Usage};
pub use team::{Decision, DocumentKind, DocumentSlots, Stage, TeamState};

/// Current wall-clock time as fractional seconds since the Unix epoch.
///
/// Events and messages are timestamped with this representation; per-run
/// monotonicity is enforced by the runtime's event writer, not here.
pub fn epoch_now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}
