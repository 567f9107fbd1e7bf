//! HTTP surface of the core daemon.
//!
//! Thin axum layer over the typed operations: every handler resolves a
//! requester from headers, takes one snapshot read, and renders the
//! response shape the upstream routers rely on. Errors map to
//! `{error: {code, message, details?}}` with conventional status codes.

pub mod auth;
pub mod dto;
pub mod handlers;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::config::CoreConfig;
use crate::filter::FilterCache;
use crate::index::SharedIndex;

/// Request counters reported by `/core/stats`.
#[derive(Debug)]
pub struct ServerStats {
    start_time: Instant,
    queries_served: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        ServerStats {
            start_time: Instant::now(),
            queries_served: AtomicU64::new(0),
        }
    }

    pub fn record_query(&self) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queries_served(&self) -> u64 {
        self.queries_served.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<SharedIndex>,
    pub filters: Arc<FilterCache>,
    pub stats: Arc<ServerStats>,
    pub trusted_headers: bool,
    pub poll_ms: u64,
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/core/health", get(handlers::health))
        .route("/core/stats", get(handlers::stats))
        .route("/core/search", get(handlers::search))
        .route("/core/entries/{id}", get(handlers::get_entry))
        .route("/core/batchGet", post(handlers::batch_get))
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(
    config: &CoreConfig,
    index: Arc<SharedIndex>,
    filters: Arc<FilterCache>,
) -> Result<()> {
    let state = AppState {
        index,
        filters,
        stats: Arc::new(ServerStats::new()),
        trusted_headers: config.trusted_headers,
        poll_ms: config.poll_ms,
    };

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind core server at {bind_addr}"))?;
    info!("core listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("core server failed")
}
