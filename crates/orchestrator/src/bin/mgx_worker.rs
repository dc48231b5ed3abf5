//! Worker process — polls the broker queue and orchestrates agent
//! executions. Horizontally scalable: run as many of these as needed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mgx_domain::config::{Config, ConfigSeverity, ExecutorKind};
use mgx_orchestrator::{DockerExecutor, Executor, InProcessExecutor, Orchestrator, WorkerPool};
use mgx_providers::ProviderRegistry;
use mgx_runtime::RunConfig;
use mgx_store::SqliteStore;

#[derive(Parser)]
#[command(name = "mgx-worker", about = "MGX background worker")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    for issue in config.validate() {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => anyhow::bail!("config: {issue}"),
        }
    }

    tracing::info!("mgx worker starting");

    // ── Store ────────────────────────────────────────────────────
    let store = Arc::new(
        SqliteStore::connect(&config.store.database_url)
            .await
            .context("connecting to the store")?,
    );
    tracing::info!(url = %config.store.database_url, "store ready");

    // ── Executor ─────────────────────────────────────────────────
    let executor: Arc<dyn Executor> = match config.orchestrator.executor {
        ExecutorKind::Docker => {
            let executor = DockerExecutor::connect(
                config.orchestrator.clone(),
                config.workspace.clone(),
                config.store.database_url.clone(),
            )
            .context("connecting to Docker")?;
            tracing::info!(image = %config.orchestrator.image, "docker executor ready");
            Arc::new(executor)
        }
        ExecutorKind::InProcess => {
            let providers = Arc::new(
                ProviderRegistry::from_config(&config.llm)
                    .context("initializing LLM providers")?,
            );
            let tools = mgx_tools::builtin_registry(&config.tools)
                .context("building tool registry")?;
            let run_config = RunConfig {
                team: config.team.clone(),
                compaction: config.compaction.clone(),
                retry_attempts: config.llm.max_retries,
                ..RunConfig::default()
            };
            tracing::info!("in-process executor ready (dev mode)");
            Arc::new(InProcessExecutor::new(
                store.clone(),
                store.clone(),
                providers,
                tools,
                run_config,
                config.workspace.root.clone(),
            ))
        }
    };

    // ── Orchestrator + worker pool ───────────────────────────────
    let orchestrator = Arc::new(Orchestrator::new(
        executor,
        store.clone(),
        config.orchestrator.clone(),
    ));
    let pool = Arc::new(WorkerPool::new(
        store,
        orchestrator,
        config.broker.clone(),
    ));
    let handles = pool.spawn();
    tracing::info!(workers = handles.len(), "worker pool running");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutdown signal received");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}
