//! KBase HTTP Server Binary
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings (port 3001, default DB path)
//! cargo run --bin kbase-server
//!
//! # Custom port, in-memory graph
//! KBASE_SERVER_PORT=3002 cargo run --bin kbase-server --no-default-features
//! ```
//!
//! # Environment Variables
//!
//! - `KBASE_SERVER_PORT`, `KBASE_BIND_ADDR`, `KBASE_ROOT_NAME`, `KBASE_DB_PATH`
//!   (see `kbase_server::config`)
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "tower_http=debug")

use std::sync::Arc;

use kbase_core::db::GraphStore;
use kbase_server::{build_state, start_server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!("KBase server, port {}", config.port);

    let store = open_store(&config).await?;
    let state = build_state(store, config.service.clone());

    start_server(state, &config.addr()).await
}

#[cfg(feature = "surrealdb")]
async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn GraphStore>> {
    use kbase_core::db::SurrealGraphStore;

    if let Some(parent) = config.db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tracing::info!("Database: {}", config.db_path.display());

    Ok(Arc::new(SurrealGraphStore::new(config.db_path.clone()).await?))
}

#[cfg(not(feature = "surrealdb"))]
async fn open_store(_config: &ServerConfig) -> anyhow::Result<Arc<dyn GraphStore>> {
    use kbase_core::db::InMemoryGraphStore;

    tracing::warn!("Using in-memory graph store, data is lost on exit");
    Ok(Arc::new(InMemoryGraphStore::new()))
}
