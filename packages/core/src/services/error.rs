//! Service Layer Error Types
//!
//! Error taxonomy for collection graph operations. Every error means the
//! owning transaction produced no effect.

use crate::db::StoreError;
use crate::models::ValidationError;
use thiserror::Error;

/// Collection graph operation errors
#[derive(Error, Debug)]
pub enum CollectionServiceError {
    /// A referenced node does not resolve for this user
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// No containment edge between the given endpoints
    #[error("Edge not found: {start} -> {end}")]
    EdgeNotFound { start: String, end: String },

    /// Identifier reuse with a differing payload
    #[error("Conflict on '{id}': {reason}")]
    Conflict { id: String, reason: String },

    /// Caller-supplied input was rejected before touching the store
    #[error("Invalid input: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Transaction or transport failure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl CollectionServiceError {
    /// Create a node not found error
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    /// Create an edge not found error
    pub fn edge_not_found(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self::EdgeNotFound {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NodeNotFound { .. } | Self::EdgeNotFound { .. })
    }
}
