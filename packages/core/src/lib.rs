//! KBase Core Business Logic Layer
//!
//! This crate provides the collection graph of the KBase personal knowledge
//! base: a per-user graph of collections and nodes stored in a transactional
//! graph store.
//!
//! # Architecture
//!
//! - **One Entity Type**: Roots, collections and leaves are `AbstractNode`s
//!   distinguished by capability labels
//! - **Containment DAG**: A node may belong to several collections
//! - **One Transaction per Operation**: Each service call commits or has no
//!   effect at all
//! - **Pluggable Storage**: In-memory backend by default, embedded SurrealDB
//!   behind the `surrealdb` feature
//!
//! # Modules
//!
//! - [`models`] - Nodes, edges, labels and validation
//! - [`db`] - Graph store traits, backends and domain events
//! - [`services`] - `CollectionGraphService` and its collaborators
//! - [`config`] - Service configuration

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::ServiceConfig;
pub use models::*;
pub use services::*;
