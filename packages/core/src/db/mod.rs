//! Graph persistence layer
//!
//! - `GraphStore` / `GraphTransaction` - backend-agnostic transactional API
//! - `InMemoryGraphStore` - process-local backend (tests, dev server)
//! - `SurrealGraphStore` - embedded RocksDB backend (`surrealdb` feature)
//! - `DomainEvent` - post-commit notifications

mod error;
pub mod events;
mod graph_store;
mod memory_store;
#[cfg(feature = "surrealdb")]
mod surreal_store;

pub use error::StoreError;
pub use events::{DomainEvent, EventEnvelope};
pub use graph_store::{
    EdgeFilter, EdgeSelector, GraphStore, GraphTransaction, Mutation, NodeFilter, NodePatch,
};
pub use memory_store::InMemoryGraphStore;
#[cfg(feature = "surrealdb")]
pub use surreal_store::SurrealGraphStore;
