//! lk-daemon entry point.
//!
//! Thin: sets up tracing, loads config, opens the lot store, wires
//! middleware, and serves until Ctrl-C. A final persist runs on shutdown.
//! Handlers live in `routes.rs`; shared state in `state.rs`.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use lk_config::{load_layered_yaml, report_unused_keys, ConfigConsumer, UnusedKeyPolicy};
use lk_daemon::{routes, state};
use lk_store::{LotStore, StoreOptions};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

/// Comma-separated YAML paths, merged left to right.
const ENV_CONFIG_PATHS: &str = "LK_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths: Vec<String> = std::env::var(ENV_CONFIG_PATHS)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    let loaded = load_layered_yaml(&paths).context("load config")?;
    let unused = report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config keys not read by the daemon");
    }
    let mut config = loaded.ledger_config()?;
    config.apply_env_overrides()?;
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");

    // store.persist_after_mutation is honoured by the handlers, off the runtime
    let (store, load) = LotStore::open(StoreOptions {
        data_dir: config.store.data_dir.clone(),
        thresholds: config.reconcile.clone(),
        persist_after_mutation: false,
    });
    info!(ledgers = ?load.ledgers, history = ?load.history, repaired = load.repaired.len(), "store opened");
    if config.store.data_dir.is_none() {
        warn!("no store.data_dir configured; ledgers live in memory only");
    }

    let addr = config.daemon.addr;
    let persist_every = config.store.persist_interval_secs;
    let shared = Arc::new(state::AppState::new(Arc::new(store), config));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    if persist_every > 0 && shared.store.options().data_dir.is_some() {
        state::spawn_persist_loop(Arc::clone(&shared), Duration::from_secs(persist_every));
    }

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("lk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    if shared.store.options().data_dir.is_some() {
        state::persist_tick(&shared).await;
    }
    info!("lk-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl_c handler failed; shutting down");
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
