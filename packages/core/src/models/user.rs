use serde::{Deserialize, Serialize};

/// Authenticated caller
///
/// Identity resolution happens upstream; the service only needs the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: String,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
