//! Identifier allocation for paths where the caller omits an id

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Produces collision-resistant identifiers
pub trait IdAllocator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidAllocator;

impl IdAllocator for UuidAllocator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// `prefix-1`, `prefix-2`, ... unique within one allocator instance
///
/// Deterministic; used by tests and fixtures that assert on generated ids.
#[derive(Debug)]
pub struct SequentialIdAllocator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}
