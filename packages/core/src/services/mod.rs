//! Business Services
//!
//! - `CollectionGraphService` - the collection graph operations
//! - `IdAllocator` - identifiers for paths where the caller supplies none
//! - `IndexQueue` / `SearchIndexer` - best-effort search indexing
//!
//! Services coordinate between the graph store and callers, implementing
//! business rules as single transactions.

pub mod collection_service;
pub mod error;
pub mod id_allocator;
pub mod search_indexer;

pub use collection_service::{CollectionAttrs, CollectionDetail, CollectionGraphService};
pub use error::CollectionServiceError;
pub use id_allocator::{IdAllocator, SequentialIdAllocator, UuidAllocator};
pub use search_indexer::{IndexQueue, IndexRequest, SearchIndexer};
