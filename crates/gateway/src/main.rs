use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use mgx_domain::config::{Config, ConfigSeverity, CorsConfig, StoreMode};
use mgx_domain::epoch_now;
use mgx_gateway::api;
use mgx_gateway::auth::AuthVerifier;
use mgx_gateway::state::AppState;
use mgx_store::{MemoryStore, SharedStore, SqliteStore};

#[derive(Parser)]
#[command(name = "mgx-gateway", about = "MGX SSE gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mgx_gateway=debug")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::load(&cli.config)?);
    tracing::info!("mgx gateway starting");

    // ── Config validation ────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error)
    {
        anyhow::bail!("config validation failed");
    }

    // ── Store ────────────────────────────────────────────────────
    let (store, sqlite): (SharedStore, Option<Arc<SqliteStore>>) = match config.store.mode {
        StoreMode::Memory => {
            tracing::warn!("in-memory store selected; state dies with the process");
            (Arc::new(MemoryStore::new()), None)
        }
        StoreMode::Database => {
            let sqlite = Arc::new(
                SqliteStore::connect(&config.store.database_url)
                    .await
                    .context("connecting to the store")?,
            );
            tracing::info!(url = %config.store.database_url, "store ready");
            (sqlite.clone(), Some(sqlite))
        }
    };

    // ── Workspace root ───────────────────────────────────────────
    std::fs::create_dir_all(&config.workspace.root)
        .with_context(|| format!("creating {}", config.workspace.root.display()))?;

    // ── Auth (JWKS fetched once) ─────────────────────────────────
    let auth = Arc::new(
        AuthVerifier::initialize(config.auth.clone())
            .await
            .context("initializing auth")?,
    );

    let state = AppState::new(config.clone(), store, auth);

    // ── TTL sweeper (hourly) ─────────────────────────────────────
    if let Some(sqlite) = sqlite {
        let event_ttl = config.store.event_ttl_sec;
        let message_ttl = config.store.message_ttl_sec;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match sqlite.purge_expired(epoch_now(), event_ttl, message_ttl).await {
                    Ok((0, 0)) => {}
                    Ok((events, messages)) => {
                        tracing::info!(events, messages, "expired records purged")
                    }
                    Err(e) => tracing::warn!(error = %e, "TTL sweep failed"),
                }
            }
        });
        tracing::info!("TTL sweeper started (hourly)");
    }

    // ── Idle lock pruning ────────────────────────────────────────
    {
        let locks = state.session_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                locks.prune_idle();
            }
        });
    }

    // ── Router ───────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);
    let app = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.server.max_concurrent_requests,
        ))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "mgx gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may end in `:*` to match any port on that host; a literal `"*"`
/// allows all origins (not recommended outside development).
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();
    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            // The remainder after the prefix must be digits only, so
            // "http://localhost:3000.evil.com" cannot slip through.
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
