//! LLM provider adapters.
//!
//! A provider translates between the internal chat types and one wire
//! format. The OpenAI-compatible adapter covers every endpoint that speaks
//! the chat-completions contract; the scripted provider replays canned
//! turns for tests and offline development.

pub mod openai_compat;
pub mod registry;
pub mod scripted;
pub mod sse;
pub mod traits;

pub use openai_compat::OpenAiCompatProvider;
pub use registry::ProviderRegistry;
pub use scripted::{ScriptedProvider, ScriptedToolCall, ScriptedTurn};
pub use traits::{ChatRequest, ChatResponse, LlmProvider};

use mgx_domain::Error;

/// Map a reqwest failure into the domain taxonomy: timeouts stay timeouts,
/// everything else is a model error attributed to the provider.
pub(crate) fn from_reqwest(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{provider}: {e}"))
    } else {
        Error::Model {
            provider: provider.to_owned(),
            message: e.to_string(),
        }
    }
}
