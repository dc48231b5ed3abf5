//! Task orchestration — one isolated execution per user turn.
//!
//! The orchestrator consumes tasks from the broker queue, launches an
//! executor (a Docker container in deployment, an in-process task in
//! dev/test), and monitors the run: finish event, executor liveness, stop
//! signal, and wall clock. It never interprets agent output.

pub mod docker;
pub mod executor;
pub mod monitor;
pub mod spec;
pub mod worker;

pub use docker::DockerExecutor;
pub use executor::{ExecutionHandle, Executor, ExecutorState, InProcessExecutor};
pub use monitor::Orchestrator;
pub use spec::{ContainerSpec, CONTAINER_WORKSPACE};
pub use worker::WorkerPool;
