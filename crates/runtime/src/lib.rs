//! Streaming runtime — drives the graph for one run and translates its
//! stream into persisted events and messages.
//!
//! One run per process/container; the runtime is the sole event producer
//! for its session while it lives, which is what makes the per-session
//! total order hold.

pub mod run;
pub mod writer;

pub use run::{run_session, RunConfig, RunParams};
pub use writer::EventWriter;
