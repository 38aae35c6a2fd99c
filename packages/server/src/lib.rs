//! KBase HTTP API Server
//!
//! REST layer in front of `CollectionGraphService`: resolves the caller from
//! the request, runs exactly one service operation and relays its result.
//!
//! # Architecture
//!
//! - `collection_endpoints`: routes and handlers
//! - `http_error`: service error to HTTP response mapping
//! - `config`: environment-driven configuration
//!
//! Requests are traced through `tower-http`'s `TraceLayer`; domain events are
//! logged by a background subscriber.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use kbase_core::db::{EventEnvelope, GraphStore};
use kbase_core::services::{
    CollectionGraphService, IdAllocator, IndexQueue, SearchIndexer, UuidAllocator,
};
use kbase_core::ServiceConfig;
use tokio::sync::broadcast;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

mod collection_endpoints;
pub mod config;
mod http_error;

pub use collection_endpoints::USER_HEADER;
pub use config::{ConfigError, ServerConfig};
pub use http_error::HttpError;

/// Application state shared across all endpoints
#[derive(Clone)]
pub struct AppState {
    pub service: CollectionGraphService,
    /// Ids for requests that omit them
    pub ids: Arc<dyn IdAllocator>,
}

impl AppState {
    pub fn new(service: CollectionGraphService) -> Self {
        Self {
            service,
            ids: Arc::new(UuidAllocator),
        }
    }
}

/// Indexer used when no search backend is attached; records requests in the log
pub struct LogIndexer;

#[async_trait]
impl SearchIndexer for LogIndexer {
    async fn index(&self, node_id: &str, name: &str) -> anyhow::Result<()> {
        tracing::debug!("Index request for {} ('{}')", node_id, name);
        Ok(())
    }
}

/// Wire the service with search indexing and event logging
///
/// Must be called from within a tokio runtime.
pub fn build_state(store: Arc<dyn GraphStore>, config: ServiceConfig) -> AppState {
    let indexer = IndexQueue::spawn(Arc::new(LogIndexer), config.index_queue_capacity);
    let (event_tx, mut event_rx) = broadcast::channel::<EventEnvelope>(256);

    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(envelope) => {
                    tracing::debug!(
                        "Domain event {}: {:?}",
                        envelope.event.event_type(),
                        envelope.event
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event logger lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let service = CollectionGraphService::new(store)
        .with_config(config)
        .with_indexer(indexer)
        .with_events(event_tx, Some("http".to_string()));

    AppState::new(service)
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(collection_endpoints::routes(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Bind `addr` and serve until the process exits
///
/// # Errors
///
/// Returns error if server fails to bind or start.
pub async fn start_server(state: AppState, addr: &str) -> anyhow::Result<()> {
    let app = create_router(state);

    tracing::info!("KBase server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
