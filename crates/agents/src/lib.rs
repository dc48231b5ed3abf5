//! Role-specialised LLM agents and their pre-model middleware.
//!
//! An agent is `(system prompt, model, tool subset, middleware chain)`.
//! [`Agent::invoke`] runs the iterative model/tool loop and streams
//! [`AgentEvent`]s to its caller; agents are strictly stateless across
//! invocations — all state lives in the team state or the stores.

pub mod agent;
pub mod middleware;
pub mod roles;

pub use agent::{Agent, AgentEvent, AgentOutcome, LlmContentType};
pub use middleware::{ContextCompressor, Middleware};
pub use roles::{team_specs, AgentSpec};
