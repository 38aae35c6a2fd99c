//! Best-effort Search Indexing
//!
//! The collection graph service notifies a [`SearchIndexer`] when a node is
//! created or renamed. Notifications go through an [`IndexQueue`]: a bounded
//! channel drained by a background task, so indexing never blocks or fails a
//! graph operation.
//!
//! - `notify` never waits; a full or closed queue drops the request with a log
//! - Indexer errors are logged and dropped
//! - Requests are delivered in submission order

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// External full-text indexer
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn index(&self, node_id: &str, name: &str) -> anyhow::Result<()>;
}

/// A pending indexing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    pub node_id: String,
    pub name: String,
}

/// Cloneable handle to the background indexing task
///
/// The task exits once every handle has been dropped and the queue drained.
#[derive(Clone)]
pub struct IndexQueue {
    tx: mpsc::Sender<IndexRequest>,
}

impl IndexQueue {
    /// Spawn the background task feeding `indexer`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(indexer: Arc<dyn SearchIndexer>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<IndexRequest>(capacity.max(1));

        tokio::spawn(async move {
            tracing::debug!("IndexQueue started");
            while let Some(request) = rx.recv().await {
                if let Err(e) = indexer.index(&request.node_id, &request.name).await {
                    tracing::warn!(
                        "Search indexing failed for node {}: {:#}",
                        request.node_id,
                        e
                    );
                }
            }
            tracing::debug!("IndexQueue shut down");
        });

        Self { tx }
    }

    /// Queue a node for indexing without waiting
    pub fn notify(&self, node_id: &str, name: &str) {
        let request = IndexRequest {
            node_id: node_id.to_string(),
            name: name.to_string(),
        };
        match self.tx.try_send(request) {
            Ok(_) => {
                tracing::debug!("Queued search indexing for node {}", node_id);
            }
            Err(mpsc::error::TrySendError::Full(request)) => {
                tracing::warn!(
                    "IndexQueue full, dropping indexing request for node {}",
                    request.node_id
                );
            }
            Err(mpsc::error::TrySendError::Closed(request)) => {
                tracing::warn!(
                    "IndexQueue has shut down, indexing request for node {} ignored",
                    request.node_id
                );
            }
        }
    }
}
