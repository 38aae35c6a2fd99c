//! Data Models
//!
//! This module contains the data structures of the collection graph:
//!
//! - `AbstractNode` - The single entity type, polymorphic through its label set
//! - `GraphEdge` - Containment (`AbstractEdge`) and ownership (`AUTHOR`) edges
//! - `User` - The already-authenticated caller descriptor
//! - Projections returned to API callers

mod edge;
mod node;
mod user;

pub use edge::{EdgeProjection, EdgeType, GraphEdge};
pub use node::{
    validate_id, validate_name, AbstractNode, LabelSet, NodeLabel, NodeProjection, NodeType,
    ValidationError, DEFAULT_ROOT_COLLECTION_NAME,
};
pub use user::User;
