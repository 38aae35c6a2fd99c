//! Edge Data Structures
//!
//! Two edge types live in the graph:
//!
//! - **Containment** (`AbstractEdge`): `start` is the contained node, `end` the
//!   container. Several containment edges may share a `start`, so containment
//!   forms a DAG rather than a tree.
//! - **Author** (`AUTHOR`): `start` is the user id, `end` the authored node.
//!   Created once with the node and never touched afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Edge type tag as stored in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    #[serde(rename = "AbstractEdge")]
    Containment,
    #[serde(rename = "AUTHOR")]
    Author,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Containment => "AbstractEdge",
            EdgeType::Author => "AUTHOR",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub start: String,
    pub end: String,
}

impl GraphEdge {
    /// Containment edge `child -> container`
    pub fn containment(
        id: impl Into<String>,
        child_id: impl Into<String>,
        container_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            edge_type: EdgeType::Containment,
            start: child_id.into(),
            end: container_id.into(),
        }
    }

    /// Ownership edge `user -> node`
    pub fn author(
        id: impl Into<String>,
        user_id: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            edge_type: EdgeType::Author,
            start: user_id.into(),
            end: node_id.into(),
        }
    }

    pub fn is_containment(&self) -> bool {
        self.edge_type == EdgeType::Containment
    }

    /// Same endpoints, regardless of id
    pub fn connects(&self, start: &str, end: &str) -> bool {
        self.start == start && self.end == end
    }

    pub fn projection(&self) -> EdgeProjection {
        EdgeProjection {
            start: self.start.clone(),
            end: self.end.clone(),
            id: self.id.clone(),
        }
    }
}

/// Edge shape returned to API callers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeProjection {
    pub start: String,
    pub end: String,
    pub id: String,
}
