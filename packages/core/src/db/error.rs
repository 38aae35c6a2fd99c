//! Graph Store Error Types
//!
//! This module defines error types for graph store operations: connection and
//! schema setup, commit-time constraint violations, and transport failures.

use std::path::PathBuf;
use thiserror::Error;

/// Graph store operation errors
///
/// Every variant means the transaction produced no effect. Service-layer code
/// surfaces these to callers as "store unavailable".
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to connect to graph store at {path}: {context}")]
    ConnectionFailed { path: PathBuf, context: String },

    /// Failed to define tables or indexes
    #[error("Failed to initialize graph store schema: {0}")]
    InitializationFailed(String),

    /// A node or edge with this identifier already exists
    #[error("Duplicate {kind} identifier: {id}")]
    DuplicateId { kind: &'static str, id: String },

    /// A write referenced a record that does not exist
    #[error("Missing {kind} record: {id}")]
    MissingRecord { kind: &'static str, id: String },

    /// The transaction could not be started or committed
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },

    /// A write was attempted through a read-only transaction
    #[error("Transaction is read-only")]
    ReadOnly,

    /// A read could not be executed or decoded
    #[error("Query failed: {context}")]
    QueryFailed { context: String },

    /// SurrealDB driver error
    #[cfg(feature = "surrealdb")]
    #[error("SurrealDB operation failed: {0}")]
    Surreal(#[from] surrealdb::Error),
}

impl StoreError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, context: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            path,
            context: context.into(),
        }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    pub fn duplicate_node(id: impl Into<String>) -> Self {
        Self::DuplicateId {
            kind: "node",
            id: id.into(),
        }
    }

    pub fn duplicate_edge(id: impl Into<String>) -> Self {
        Self::DuplicateId {
            kind: "edge",
            id: id.into(),
        }
    }

    pub fn missing_node(id: impl Into<String>) -> Self {
        Self::MissingRecord {
            kind: "node",
            id: id.into(),
        }
    }

    /// Create a transaction failed error
    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }

    /// Create a query failed error
    pub fn query_failed(context: impl Into<String>) -> Self {
        Self::QueryFailed {
            context: context.into(),
        }
    }
}
