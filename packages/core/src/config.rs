//! Service configuration

use crate::models::DEFAULT_ROOT_COLLECTION_NAME;
use serde::{Deserialize, Serialize};

/// Tunables for `CollectionGraphService`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Display name of newly created root collections
    pub root_collection_name: String,

    /// Bound of the search-index queue; requests beyond it are dropped
    pub index_queue_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_collection_name: DEFAULT_ROOT_COLLECTION_NAME.to_string(),
            index_queue_capacity: 256,
        }
    }
}
