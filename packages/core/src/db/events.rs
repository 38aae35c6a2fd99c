//! Domain Events for the Collection Graph
//!
//! Events are emitted by `CollectionGraphService` over a tokio broadcast
//! channel, strictly after the owning transaction has committed. Subscribers
//! never observe an event for a rolled-back change.

use crate::models::{EdgeProjection, NodeProjection};
use serde::{Deserialize, Serialize};

/// Domain events emitted after a successful commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A root or collection node was created
    NodeCreated { node: NodeProjection },

    /// A node's display name changed
    NodeRenamed { node: NodeProjection },

    /// A collection lost its `Collection` capability
    NodeDemoted { id: String },

    /// A containment edge was created
    EdgeCreated { edge: EdgeProjection },

    /// A containment edge was deleted
    EdgeDeleted { edge: EdgeProjection },
}

impl DomainEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::NodeCreated { .. } => "node:created",
            DomainEvent::NodeRenamed { .. } => "node:renamed",
            DomainEvent::NodeDemoted { .. } => "node:demoted",
            DomainEvent::EdgeCreated { .. } => "edge:created",
            DomainEvent::EdgeDeleted { .. } => "edge:deleted",
        }
    }
}

/// Event plus the client that caused it
///
/// `source_client_id` lets a subscriber drop its own echoes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: DomainEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_client_id: Option<String>,
}
