//! Node Data Structures
//!
//! This module defines `AbstractNode`, the single entity type of the collection
//! graph, together with its capability labels.
//!
//! # Architecture
//!
//! - **One Entity Type**: Roots, collections and leaves are all `AbstractNode`s
//! - **Label-Set Polymorphism**: Capabilities (`Node`, `Collection`,
//!   `RootCollection`) are tags that can be gained or lost, never subtypes
//! - **Dispatch on Membership**: Callers ask `has(NodeLabel::Collection)`,
//!   not "is this a CollectionNode"
//!
//! # Examples
//!
//! ```rust
//! use kbase_core::models::{AbstractNode, NodeLabel, NodeType};
//!
//! let collection = AbstractNode::new_collection("c-1", "Reading list");
//! assert!(collection.labels.has(NodeLabel::Collection));
//! assert_eq!(collection.node_type, NodeType::Collection);
//! assert!(!collection.is_root());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Display name given to every freshly created root collection
pub const DEFAULT_ROOT_COLLECTION_NAME: &str = "My Knowledge Base";

/// Validation errors for caller-supplied node attributes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),
}

/// Capability tag carried by a node
///
/// `Node` is present on every entity. `Collection` is present while the entity
/// may contain children. `RootCollection` marks the unique per-user root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Node,
    Collection,
    RootCollection,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Node => "Node",
            NodeLabel::Collection => "Collection",
            NodeLabel::RootCollection => "RootCollection",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of capability labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeSet<NodeLabel>);

impl LabelSet {
    /// Labels of a leaf node
    pub fn leaf() -> Self {
        Self::from_labels([NodeLabel::Node])
    }

    /// Labels of a regular collection
    pub fn collection() -> Self {
        Self::from_labels([NodeLabel::Node, NodeLabel::Collection])
    }

    /// Labels of the per-user root collection
    pub fn root() -> Self {
        Self::from_labels([
            NodeLabel::Node,
            NodeLabel::Collection,
            NodeLabel::RootCollection,
        ])
    }

    pub fn from_labels(labels: impl IntoIterator<Item = NodeLabel>) -> Self {
        Self(labels.into_iter().collect())
    }

    pub fn has(&self, label: NodeLabel) -> bool {
        self.0.contains(&label)
    }

    pub fn insert(&mut self, label: NodeLabel) -> bool {
        self.0.insert(label)
    }

    pub fn remove(&mut self, label: NodeLabel) -> bool {
        self.0.remove(&label)
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeLabel> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stored node type, kept consistent with the label set
///
/// `Collection` is in the label set iff the type is `Root` or `Collection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Root,
    Collection,
    Node,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Root => "root",
            NodeType::Collection => "collection",
            NodeType::Node => "node",
        }
    }

    /// Whether nodes of this type carry the `Collection` capability
    pub fn is_container(&self) -> bool {
        matches!(self, NodeType::Root | NodeType::Collection)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of graph state.
///
/// # Fields
///
/// - `id`: Globally unique identifier (caller- or allocator-supplied)
/// - `name`: Display name
/// - `node_type`: `root`, `collection` or `node` (serialized as `type`)
/// - `is_root_collection`: True only for the per-user root
/// - `created` / `modified`: Timestamps
/// - `labels`: Capability tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbstractNode {
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub node_type: NodeType,

    #[serde(default)]
    pub is_root_collection: bool,

    pub created: DateTime<Utc>,

    pub modified: DateTime<Utc>,

    pub labels: LabelSet,
}

impl AbstractNode {
    /// Create the per-user root collection
    pub fn new_root(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_shape(id, name, NodeType::Root, LabelSet::root())
    }

    /// Create a regular collection
    pub fn new_collection(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_shape(id, name, NodeType::Collection, LabelSet::collection())
    }

    /// Create a leaf node
    pub fn new_leaf(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_shape(id, name, NodeType::Node, LabelSet::leaf())
    }

    fn with_shape(
        id: impl Into<String>,
        name: impl Into<String>,
        node_type: NodeType,
        labels: LabelSet,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            is_root_collection: node_type == NodeType::Root,
            node_type,
            created: now,
            modified: now,
            labels,
        }
    }

    pub fn is_root(&self) -> bool {
        self.is_root_collection || self.labels.has(NodeLabel::RootCollection)
    }

    pub fn is_collection(&self) -> bool {
        self.labels.has(NodeLabel::Collection)
    }

    /// Check that the label set and the stored type agree
    pub fn is_consistent(&self) -> bool {
        self.labels.has(NodeLabel::Node)
            && self.is_collection() == self.node_type.is_container()
            && self.is_root_collection == self.labels.has(NodeLabel::RootCollection)
    }

    pub fn projection(&self) -> NodeProjection {
        NodeProjection {
            id: self.id.clone(),
            name: self.name.clone(),
            node_type: self.node_type,
            is_root_collection: self.is_root_collection,
        }
    }
}

/// Node shape returned to API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeProjection {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_root_collection: bool,
}

/// Validate a caller-supplied identifier
pub fn validate_id(field: &str, id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    if id.trim() != id || id.chars().any(char::is_control) {
        return Err(ValidationError::InvalidId(format!(
            "{} '{}' contains whitespace or control characters",
            field, id
        )));
    }
    Ok(())
}

/// Validate and normalize a display name
///
/// Names are trimmed and must not be empty afterwards.
pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidName(
            "name cannot be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
