//! Agent container entrypoint.
//!
//! Runs exactly one session inside an isolated container and exits. All
//! identity comes from the environment the orchestrator injected:
//!
//! - `SESSION_ID`, `WORKSPACE_ID`, `WORKSPACE_PATH`, `FRAMEWORK`
//! - `RUN_MODE` — `database` (default) or `memory`
//! - `MGX_DATABASE_URL` — store connection for database mode
//! - `MGX_CONFIG` — optional path to a TOML config (LLM providers etc.)
//! - `MGX_AGENT_API_KEY` — peer credential (equals the session id)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use mgx_domain::config::{Config, StoreMode};
use mgx_domain::Framework;
use mgx_providers::ProviderRegistry;
use mgx_runtime::{run_session, RunConfig, RunParams};
use mgx_store::{MemoryStore, SqliteStore};

fn env_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let session_id = env_var("SESSION_ID")?;
    let workspace_id = env_var("WORKSPACE_ID")?;
    let workspace_path = PathBuf::from(env_var("WORKSPACE_PATH")?);
    let framework = Framework::parse(&env_var("FRAMEWORK")?)
        .context("FRAMEWORK must be 'nextjs' or 'fastapi-vite'")?;
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "database".into());

    let config_path = std::env::var("MGX_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = Config::load(std::path::Path::new(&config_path))?;

    tracing::info!(
        %session_id,
        %workspace_id,
        framework = %framework,
        %run_mode,
        "agent container starting"
    );

    // ── Stores ───────────────────────────────────────────────────
    let mode = match run_mode.as_str() {
        "memory" => StoreMode::Memory,
        _ => StoreMode::Database,
    };
    let (events, messages): (
        Arc<dyn mgx_store::EventStore>,
        Arc<dyn mgx_store::MessageStore>,
    ) = match mode {
        StoreMode::Memory => {
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        }
        StoreMode::Database => {
            let url = std::env::var("MGX_DATABASE_URL")
                .unwrap_or_else(|_| config.store.database_url.clone());
            let store = Arc::new(
                SqliteStore::connect(&url)
                    .await
                    .context("connecting to the store")?,
            );
            (store.clone(), store)
        }
    };

    // ── Providers and tools ──────────────────────────────────────
    let providers =
        Arc::new(ProviderRegistry::from_config(&config.llm).context("initializing providers")?);
    let tools = mgx_tools::builtin_registry(&config.tools).context("building tool registry")?;

    // Third-party LLM clients may call tools from their own worker
    // threads; give those threads a context to resolve.
    let fallback = Arc::new(mgx_context::AgentContext::new(
        session_id.clone(),
        workspace_id.clone(),
        &workspace_path,
        events.clone(),
        messages.clone(),
    ));
    mgx_context::install_fallback(fallback);

    let params = RunParams {
        session_id: session_id.clone(),
        workspace_id,
        workspace_path,
        framework,
        trace_id: std::env::var("MGX_TRACE_ID").ok(),
    };
    let run_config = RunConfig {
        team: config.team.clone(),
        compaction: config.compaction.clone(),
        retry_attempts: config.llm.max_retries,
        ..RunConfig::default()
    };

    let status = run_session(params, events, messages, providers, tools, run_config)
        .await
        .context("run failed")?;

    mgx_context::clear_fallback();
    tracing::info!(%session_id, ?status, "agent container exiting");
    Ok(())
}
