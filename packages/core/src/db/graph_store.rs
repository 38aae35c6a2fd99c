//! GraphStore Trait - Graph Persistence Abstraction
//!
//! This module defines the `GraphStore` and `GraphTransaction` traits the
//! collection graph service is written against. Backends (in-memory, SurrealDB)
//! implement them without the service knowing which one it talks to.
//!
//! # Transaction Model
//!
//! - `GraphStore::begin` opens a transaction and takes the store's writer lock
//! - Reads observe the committed state as of `begin`
//! - Writes are buffered as [`Mutation`]s and applied atomically by `commit`
//! - Dropping a transaction without committing discards its writes
//!
//! Because the writer lock is held from `begin` until commit or drop,
//! transactions are serializable. A transaction does NOT see its own buffered
//! writes; callers read everything they need first, then write.
//!
//! # Commit-Time Constraints
//!
//! - Node ids are unique
//! - Edge ids are unique
//! - Edge endpoints must exist
//!
//! A violation fails the whole commit and nothing is applied.
//!
//! # Examples
//!
//! ```rust
//! use kbase_core::db::{EdgeFilter, GraphStore, InMemoryGraphStore};
//! use kbase_core::models::{AbstractNode, GraphEdge};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), kbase_core::db::StoreError> {
//! let store = InMemoryGraphStore::new();
//!
//! let mut tx = store.begin().await?;
//! tx.create_node(AbstractNode::new_root("root", "My Knowledge Base")).await?;
//! tx.create_node(AbstractNode::new_leaf("n1", "Note")).await?;
//! tx.create_edge(GraphEdge::containment("e1", "n1", "root")).await?;
//! tx.commit().await?;
//!
//! let mut tx = store.begin().await?;
//! let children = tx.match_edges(&EdgeFilter::containment().ending_at("root")).await?;
//! assert_eq!(children.len(), 1);
//! # Ok(())
//! # }
//! ```

use crate::db::StoreError;
use crate::models::{AbstractNode, EdgeType, GraphEdge, NodeLabel, NodeType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Pattern for node lookups; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub id: Option<String>,
    pub label: Option<NodeLabel>,
    /// Only nodes with an `AUTHOR` edge from this user id
    pub author: Option<String>,
}

impl NodeFilter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: NodeLabel) -> Self {
        self.label = Some(label);
        self
    }

    pub fn authored_by(mut self, user_id: impl Into<String>) -> Self {
        self.author = Some(user_id.into());
        self
    }

    /// Match the node's own attributes; `author` needs edge data and is
    /// evaluated by the backend.
    pub fn matches_attributes(&self, node: &AbstractNode) -> bool {
        self.id.as_deref().map_or(true, |id| node.id == id)
            && self.label.map_or(true, |label| node.labels.has(label))
    }
}

/// Pattern for edge lookups; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeFilter {
    pub edge_type: Option<EdgeType>,
    pub id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl EdgeFilter {
    pub fn containment() -> Self {
        Self {
            edge_type: Some(EdgeType::Containment),
            ..Default::default()
        }
    }

    pub fn author() -> Self {
        Self {
            edge_type: Some(EdgeType::Author),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn starting_at(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn ending_at(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn matches(&self, edge: &GraphEdge) -> bool {
        self.edge_type.map_or(true, |t| edge.edge_type == t)
            && self.id.as_deref().map_or(true, |id| edge.id == id)
            && self.start.as_deref().map_or(true, |s| edge.start == s)
            && self.end.as_deref().map_or(true, |e| edge.end == e)
    }
}

/// Which edges a delete targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeSelector {
    Id(String),
    Endpoints {
        edge_type: EdgeType,
        start: String,
        end: String,
    },
}

impl EdgeSelector {
    pub fn containment(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self::Endpoints {
            edge_type: EdgeType::Containment,
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn matches(&self, edge: &GraphEdge) -> bool {
        match self {
            EdgeSelector::Id(id) => edge.id == *id,
            EdgeSelector::Endpoints {
                edge_type,
                start,
                end,
            } => edge.edge_type == *edge_type && edge.connects(start, end),
        }
    }
}

/// Sparse update of node attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub name: Option<String>,
    pub node_type: Option<NodeType>,
    pub modified: Option<DateTime<Utc>>,
}

impl NodePatch {
    pub fn apply(&self, node: &mut AbstractNode) {
        if let Some(name) = &self.name {
            node.name = name.clone();
        }
        if let Some(node_type) = self.node_type {
            node.node_type = node_type;
        }
        if let Some(modified) = self.modified {
            node.modified = modified;
        }
    }
}

/// A buffered write, applied in order at commit
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateNode(AbstractNode),
    CreateEdge(GraphEdge),
    UpdateLabels {
        id: String,
        add: Vec<NodeLabel>,
        remove: Vec<NodeLabel>,
    },
    UpdateNode {
        id: String,
        patch: NodePatch,
    },
    DeleteEdge(EdgeSelector),
}

/// Transactional storage of labeled nodes and typed edges
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Open a read-write transaction
    ///
    /// Waits for any transaction currently holding the writer lock.
    async fn begin(&self) -> Result<Box<dyn GraphTransaction>, StoreError>;

    /// Open a read-only transaction
    ///
    /// Does not wait for the writer lock, so reads run alongside a writer.
    /// Each query sees the latest committed state. Writes fail with
    /// [`StoreError::ReadOnly`] and commit is a no-op.
    async fn read(&self) -> Result<Box<dyn GraphTransaction>, StoreError>;
}

/// One unit of work against a [`GraphStore`]
#[async_trait]
pub trait GraphTransaction: Send {
    /// Buffer a node creation; returns the node id
    async fn create_node(&mut self, node: AbstractNode) -> Result<String, StoreError>;

    /// Buffer an edge creation; returns the edge id
    async fn create_edge(&mut self, edge: GraphEdge) -> Result<String, StoreError>;

    /// Nodes matching `filter`, ordered by id
    async fn match_nodes(&mut self, filter: &NodeFilter) -> Result<Vec<AbstractNode>, StoreError>;

    /// Edges matching `filter`, ordered by id
    async fn match_edges(&mut self, filter: &EdgeFilter) -> Result<Vec<GraphEdge>, StoreError>;

    async fn update_node_labels(
        &mut self,
        id: &str,
        add: &[NodeLabel],
        remove: &[NodeLabel],
    ) -> Result<(), StoreError>;

    async fn update_node(&mut self, id: &str, patch: NodePatch) -> Result<(), StoreError>;

    /// Buffer an edge deletion; deleting nothing is not an error
    async fn delete_edge(&mut self, selector: EdgeSelector) -> Result<(), StoreError>;

    /// Apply every buffered write atomically
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_filter_matches() {
        let edge = GraphEdge::containment("e1", "n1", "c1");

        assert!(EdgeFilter::default().matches(&edge));
        assert!(EdgeFilter::containment().ending_at("c1").matches(&edge));
        assert!(EdgeFilter::containment()
            .starting_at("n1")
            .with_id("e1")
            .matches(&edge));
        assert!(!EdgeFilter::author().matches(&edge));
        assert!(!EdgeFilter::containment().ending_at("n1").matches(&edge));
    }

    #[test]
    fn test_edge_selector_by_endpoints_ignores_id() {
        let edge = GraphEdge::containment("whatever", "n1", "c1");
        assert!(EdgeSelector::containment("n1", "c1").matches(&edge));
        assert!(!EdgeSelector::Id("other".to_string()).matches(&edge));

        let author = GraphEdge::author("a1", "n1", "c1");
        assert!(!EdgeSelector::containment("n1", "c1").matches(&author));
    }

    #[test]
    fn test_node_filter_attributes() {
        let node = AbstractNode::new_collection("c1", "Collection");
        assert!(NodeFilter::by_id("c1").matches_attributes(&node));
        assert!(NodeFilter::default()
            .with_label(NodeLabel::Collection)
            .matches_attributes(&node));
        assert!(!NodeFilter::default()
            .with_label(NodeLabel::RootCollection)
            .matches_attributes(&node));
    }

    #[test]
    fn test_node_patch_is_sparse() {
        let mut node = AbstractNode::new_collection("c1", "Old");
        let created = node.created;

        NodePatch {
            node_type: Some(NodeType::Node),
            ..Default::default()
        }
        .apply(&mut node);

        assert_eq!(node.name, "Old");
        assert_eq!(node.node_type, NodeType::Node);
        assert_eq!(node.created, created);
    }
}
