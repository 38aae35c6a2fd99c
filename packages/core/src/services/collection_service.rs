//! Collection Graph Service
//!
//! Enforces the structural rules of the collection graph against a
//! [`GraphStore`]:
//!
//! - exactly one root collection per user, never removed
//! - containment is a DAG: a node may sit in several collections at once
//! - removing a collection redirects its children to its own parents and
//!   demotes it to a plain node
//! - caller-supplied ids make retries safe
//!
//! Every public operation runs as one transaction. The service keeps no graph
//! state between calls; events and search-index notifications are sent only
//! after the transaction has committed.
//!
//! # Idempotency
//!
//! | Re-submission | Result |
//! |---|---|
//! | Same edge id, same endpoints | no-op, returns the existing edge |
//! | Same edge id, other endpoints | `Conflict` |
//! | New edge id for an already-contained pair | `Conflict` |
//! | `create` with same id, parent and name | returns the existing node |
//! | `create` with same id, other payload | `Conflict` |
//! | `remove` on an already demoted node | no-op, returns `true` |
//!
//! # Validation
//!
//! | Request | Result |
//! |---|---|
//! | Node contained in itself | `ValidationFailed` |
//! | Container lacks the `Collection` label | `NodeNotFound` |
//! | Edge would close a containment cycle | `Conflict` |

use crate::config::ServiceConfig;
use crate::db::{
    DomainEvent, EdgeFilter, EdgeSelector, EventEnvelope, GraphStore, GraphTransaction,
    NodeFilter, NodePatch,
};
use crate::models::{
    validate_id, validate_name, AbstractNode, EdgeProjection, GraphEdge, NodeLabel,
    NodeProjection, NodeType, User, ValidationError,
};
use crate::services::error::CollectionServiceError;
use crate::services::id_allocator::{IdAllocator, UuidAllocator};
use crate::services::search_indexer::IndexQueue;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;

type Result<T> = std::result::Result<T, CollectionServiceError>;

/// Caller-supplied attributes of a new collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionAttrs {
    pub name: String,
}

impl CollectionAttrs {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A collection together with its direct members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDetail {
    pub collection: NodeProjection,
    pub nodes: Vec<NodeProjection>,
    pub edges: Vec<EdgeProjection>,
}

/// Result of reconciling a requested containment edge with the store
enum EdgeWrite {
    Existing(GraphEdge),
    Created(GraphEdge),
}

impl EdgeWrite {
    fn edge(&self) -> &GraphEdge {
        match self {
            EdgeWrite::Existing(edge) | EdgeWrite::Created(edge) => edge,
        }
    }
}

/// Work to publish once a transaction has committed
#[derive(Default)]
struct Effects {
    events: Vec<DomainEvent>,
    index: Vec<(String, String)>,
}

impl Effects {
    fn node_created(&mut self, node: &AbstractNode) {
        self.events.push(DomainEvent::NodeCreated {
            node: node.projection(),
        });
        self.index.push((node.id.clone(), node.name.clone()));
    }

    fn edge_created(&mut self, edge: &GraphEdge) {
        self.events.push(DomainEvent::EdgeCreated {
            edge: edge.projection(),
        });
    }

    fn edge_deleted(&mut self, edge: &GraphEdge) {
        self.events.push(DomainEvent::EdgeDeleted {
            edge: edge.projection(),
        });
    }
}

/// Graph-rewrite operations over collections and their members
///
/// Cheap to clone; clones share the store, allocator, index queue and event
/// channel.
///
/// # Examples
///
/// ```rust
/// use kbase_core::db::InMemoryGraphStore;
/// use kbase_core::models::User;
/// use kbase_core::services::{CollectionAttrs, CollectionGraphService};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), kbase_core::services::CollectionServiceError> {
/// let service = CollectionGraphService::new(Arc::new(InMemoryGraphStore::new()));
/// let user = User::new("user-1");
///
/// let root = service.create_root_collection(&user).await?;
/// let reading = service
///     .create(&user, "reading", &root.id, CollectionAttrs::named("Reading"))
///     .await?;
/// assert_eq!(reading.name, "Reading");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CollectionGraphService {
    store: Arc<dyn GraphStore>,
    ids: Arc<dyn IdAllocator>,
    config: ServiceConfig,
    /// Optional search-index queue notified on create and rename
    indexer: Option<IndexQueue>,
    /// Optional event sender for broadcasting domain events
    event_tx: Option<broadcast::Sender<EventEnvelope>>,
    /// Optional client identifier for event source tracking
    client_id: Option<String>,
}

impl CollectionGraphService {
    /// Create a service with UUID identifiers, default config, no indexer
    /// and no event emission
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            ids: Arc::new(UuidAllocator),
            config: ServiceConfig::default(),
            indexer: None,
            event_tx: None,
            client_id: None,
        }
    }

    pub fn with_id_allocator(mut self, ids: Arc<dyn IdAllocator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_indexer(mut self, indexer: IndexQueue) -> Self {
        self.indexer = Some(indexer);
        self
    }

    /// Enable event emission
    ///
    /// # Arguments
    ///
    /// * `event_tx` - Broadcast sender for domain events
    /// * `client_id` - Optional client ID for event source tracking
    pub fn with_events(
        mut self,
        event_tx: broadcast::Sender<EventEnvelope>,
        client_id: Option<String>,
    ) -> Self {
        self.event_tx = Some(event_tx);
        self.client_id = client_id;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Send events and index notifications for a committed transaction
    fn publish(&self, effects: Effects) {
        if let Some(tx) = &self.event_tx {
            for event in effects.events {
                let _ = tx.send(EventEnvelope {
                    event,
                    source_client_id: self.client_id.clone(),
                });
            }
        }
        if let Some(indexer) = &self.indexer {
            for (node_id, name) in effects.index {
                indexer.notify(&node_id, &name);
            }
        }
    }

    /// Node `id` if it exists and `user` authored it
    async fn find_owned(
        tx: &mut Box<dyn GraphTransaction>,
        user: &User,
        id: &str,
    ) -> Result<Option<AbstractNode>> {
        let nodes = tx
            .match_nodes(&NodeFilter::by_id(id).authored_by(&user.id))
            .await?;
        Ok(nodes.into_iter().next())
    }

    async fn require_owned(
        tx: &mut Box<dyn GraphTransaction>,
        user: &User,
        id: &str,
    ) -> Result<AbstractNode> {
        Self::find_owned(tx, user, id)
            .await?
            .ok_or_else(|| CollectionServiceError::node_not_found(id))
    }

    /// Like `require_owned`, but the node must still be able to hold children
    async fn require_container(
        tx: &mut Box<dyn GraphTransaction>,
        user: &User,
        id: &str,
    ) -> Result<AbstractNode> {
        let node = Self::require_owned(tx, user, id).await?;
        if !node.is_collection() {
            tracing::debug!("{} is not a collection", id);
            return Err(CollectionServiceError::node_not_found(id));
        }
        Ok(node)
    }

    /// Fail if `start` already contains `end`, directly or transitively
    async fn reject_cycle(
        tx: &mut Box<dyn GraphTransaction>,
        start: &str,
        end: &str,
    ) -> Result<()> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut frontier = vec![end.to_string()];
        while let Some(current) = frontier.pop() {
            if current == start {
                return Err(CollectionServiceError::conflict(
                    start,
                    format!("{} already contains {}", start, end),
                ));
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            let parents = tx
                .match_edges(&EdgeFilter::containment().starting_at(&current))
                .await?;
            frontier.extend(parents.into_iter().map(|e| e.end));
        }
        Ok(())
    }

    async fn find_root(
        tx: &mut Box<dyn GraphTransaction>,
        user: &User,
    ) -> Result<Option<AbstractNode>> {
        let roots = tx
            .match_nodes(
                &NodeFilter::default()
                    .with_label(NodeLabel::RootCollection)
                    .authored_by(&user.id),
            )
            .await?;
        Ok(roots.into_iter().next())
    }

    /// Reconcile a requested containment edge `start -> end` named `edge_id`
    ///
    /// Edges in `replaced` are being deleted in the same transaction, so
    /// their ids and endpoint pairs count as free.
    async fn ensure_edge(
        tx: &mut Box<dyn GraphTransaction>,
        edge_id: &str,
        start: &str,
        end: &str,
        replaced: &[GraphEdge],
    ) -> Result<EdgeWrite> {
        let is_replaced = |edge: &GraphEdge| replaced.iter().any(|r| r.id == edge.id);

        let same_id = tx
            .match_edges(&EdgeFilter::default().with_id(edge_id))
            .await?;
        if let Some(existing) = same_id.into_iter().find(|e| !is_replaced(e)) {
            if existing.is_containment() && existing.connects(start, end) {
                return Ok(EdgeWrite::Existing(existing));
            }
            return Err(CollectionServiceError::conflict(
                edge_id,
                format!(
                    "edge id already connects {} -> {}",
                    existing.start, existing.end
                ),
            ));
        }

        let same_pair = tx
            .match_edges(&EdgeFilter::containment().starting_at(start).ending_at(end))
            .await?;
        if let Some(existing) = same_pair.into_iter().find(|e| !is_replaced(e)) {
            return Err(CollectionServiceError::conflict(
                edge_id,
                format!(
                    "{} is already contained in {} via edge {}",
                    start, end, existing.id
                ),
            ));
        }

        let edge = GraphEdge::containment(edge_id, start, end);
        tx.create_edge(edge.clone()).await?;
        Ok(EdgeWrite::Created(edge))
    }

    /// Create the user's root collection, or return the existing one
    pub async fn create_root_collection(&self, user: &User) -> Result<NodeProjection> {
        validate_id("userId", &user.id)?;

        let mut tx = self.store.begin().await?;
        if let Some(root) = Self::find_root(&mut tx, user).await? {
            tracing::debug!("Root collection {} already exists for {}", root.id, user.id);
            return Ok(root.projection());
        }

        let root = AbstractNode::new_root(self.ids.generate(), &self.config.root_collection_name);
        tx.create_node(root.clone()).await?;
        tx.create_edge(GraphEdge::author(self.ids.generate(), &user.id, &root.id))
            .await?;
        tx.commit().await?;

        tracing::info!("Created root collection {} for {}", root.id, user.id);

        let mut effects = Effects::default();
        effects.node_created(&root);
        self.publish(effects);

        Ok(root.projection())
    }

    /// Create collection `id` inside `parent_id`
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if the parent does not resolve for this user
    /// - `Conflict` if `id` is taken by a node with a different payload
    pub async fn create(
        &self,
        user: &User,
        id: &str,
        parent_id: &str,
        attrs: CollectionAttrs,
    ) -> Result<NodeProjection> {
        validate_id("userId", &user.id)?;
        validate_id("id", id)?;
        validate_id("parentId", parent_id)?;
        let name = validate_name(&attrs.name)?;
        if id == parent_id {
            return Err(ValidationError::InvalidId(format!(
                "collection '{}' cannot contain itself",
                id
            ))
            .into());
        }

        let mut tx = self.store.begin().await?;
        Self::require_container(&mut tx, user, parent_id).await?;

        let taken = tx.match_nodes(&NodeFilter::by_id(id)).await?;
        if let Some(existing) = taken.into_iter().next() {
            return self.resume_create(tx, user, existing, parent_id, &name).await;
        }

        let node = AbstractNode::new_collection(id, name);
        let edge = GraphEdge::containment(self.ids.generate(), id, parent_id);
        tx.create_node(node.clone()).await?;
        tx.create_edge(GraphEdge::author(self.ids.generate(), &user.id, id))
            .await?;
        tx.create_edge(edge.clone()).await?;
        tx.commit().await?;

        tracing::debug!("Created collection {} in {}", id, parent_id);

        let mut effects = Effects::default();
        effects.node_created(&node);
        effects.edge_created(&edge);
        self.publish(effects);

        Ok(node.projection())
    }

    /// Retry path of `create`: the id already exists
    async fn resume_create(
        &self,
        mut tx: Box<dyn GraphTransaction>,
        user: &User,
        existing: AbstractNode,
        parent_id: &str,
        name: &str,
    ) -> Result<NodeProjection> {
        let id = existing.id.clone();
        if Self::find_owned(&mut tx, user, &id).await?.is_none() {
            return Err(CollectionServiceError::conflict(
                &id,
                "identifier belongs to another node",
            ));
        }
        if existing.node_type != NodeType::Collection || existing.name != name {
            return Err(CollectionServiceError::conflict(
                &id,
                format!(
                    "existing {} '{}' differs from requested collection '{}'",
                    existing.node_type, existing.name, name
                ),
            ));
        }

        let parents = tx
            .match_edges(&EdgeFilter::containment().starting_at(&id))
            .await?;
        if parents.iter().any(|e| e.end == parent_id) {
            tracing::debug!("Collection {} already exists, create is a no-op", id);
            return Ok(existing.projection());
        }
        if !parents.is_empty() {
            return Err(CollectionServiceError::conflict(
                &id,
                format!("collection is contained in {}", parents[0].end),
            ));
        }

        Self::reject_cycle(&mut tx, &id, parent_id).await?;
        let edge = GraphEdge::containment(self.ids.generate(), &id, parent_id);
        tx.create_edge(edge.clone()).await?;
        tx.commit().await?;

        tracing::info!("Repaired missing parent edge {} -> {}", id, parent_id);

        let mut effects = Effects::default();
        effects.edge_created(&edge);
        self.publish(effects);

        Ok(existing.projection())
    }

    /// Add containment edge `source_id -> target_id` named `edge_id`
    pub async fn connect(
        &self,
        user: &User,
        source_id: &str,
        target_id: &str,
        edge_id: &str,
    ) -> Result<EdgeProjection> {
        self.link(user, source_id, target_id, edge_id).await
    }

    /// Make `node_id` a member of `collection_id` as well
    ///
    /// Existing memberships of `node_id` are untouched.
    pub async fn add_node(
        &self,
        user: &User,
        collection_id: &str,
        node_id: &str,
        edge_id: &str,
    ) -> Result<EdgeProjection> {
        self.link(user, node_id, collection_id, edge_id).await
    }

    async fn link(
        &self,
        user: &User,
        start: &str,
        end: &str,
        edge_id: &str,
    ) -> Result<EdgeProjection> {
        validate_id("userId", &user.id)?;
        validate_id("start", start)?;
        validate_id("end", end)?;
        validate_id("edgeId", edge_id)?;
        if start == end {
            return Err(ValidationError::InvalidId(format!(
                "node '{}' cannot contain itself",
                start
            ))
            .into());
        }

        let mut tx = self.store.begin().await?;
        Self::require_owned(&mut tx, user, start).await?;
        Self::require_container(&mut tx, user, end).await?;
        Self::reject_cycle(&mut tx, start, end).await?;

        match Self::ensure_edge(&mut tx, edge_id, start, end, &[]).await? {
            EdgeWrite::Existing(edge) => {
                tracing::debug!("Edge {} already exists, link is a no-op", edge.id);
                Ok(edge.projection())
            }
            EdgeWrite::Created(edge) => {
                tx.commit().await?;
                tracing::debug!("Linked {} -> {} ({})", start, end, edge_id);

                let mut effects = Effects::default();
                effects.edge_created(&edge);
                self.publish(effects);

                Ok(edge.projection())
            }
        }
    }

    /// Remove a collection, moving its children up to its parents
    ///
    /// The collection keeps its identity, name and own parent edges but loses
    /// the `Collection` label. Each child edge is redirected to every parent;
    /// the first redirect keeps the child edge's id. A collection without
    /// parents hands its children to the user's root. Removing the root
    /// changes nothing and still returns `true`.
    pub async fn remove(&self, user: &User, collection_id: &str) -> Result<bool> {
        validate_id("userId", &user.id)?;
        validate_id("collectionId", collection_id)?;

        let mut tx = self.store.begin().await?;
        let target = Self::require_owned(&mut tx, user, collection_id).await?;

        if target.is_root() {
            tracing::debug!("Ignoring removal of root collection {}", collection_id);
            return Ok(true);
        }
        if !target.is_collection() {
            tracing::debug!("{} is already a plain node, remove is a no-op", collection_id);
            return Ok(true);
        }

        let parents = tx
            .match_edges(&EdgeFilter::containment().starting_at(collection_id))
            .await?;
        let children = tx
            .match_edges(&EdgeFilter::containment().ending_at(collection_id))
            .await?;

        let destinations: Vec<String> = if parents.is_empty() {
            let root = Self::find_root(&mut tx, user).await?.ok_or_else(|| {
                CollectionServiceError::conflict(
                    collection_id,
                    "collection has no parent and the user has no root collection",
                )
            })?;
            vec![root.id]
        } else {
            parents.iter().map(|e| e.end.clone()).collect()
        };

        let mut contained: HashSet<(String, String)> = HashSet::new();
        for destination in &destinations {
            let members = tx
                .match_edges(&EdgeFilter::containment().ending_at(destination))
                .await?;
            contained.extend(members.into_iter().map(|e| (e.start, e.end)));
        }

        let mut effects = Effects::default();
        let mut redirected = 0usize;

        for child in &children {
            tx.delete_edge(EdgeSelector::Id(child.id.clone())).await?;
            effects.edge_deleted(child);

            let mut reuse_id = true;
            for destination in &destinations {
                if child.start == *destination {
                    continue;
                }
                if !contained.insert((child.start.clone(), destination.clone())) {
                    continue;
                }

                let id = if reuse_id {
                    reuse_id = false;
                    child.id.clone()
                } else {
                    self.ids.generate()
                };
                let edge = GraphEdge::containment(id, &child.start, destination);
                tx.create_edge(edge.clone()).await?;
                effects.edge_created(&edge);
                redirected += 1;
            }
        }

        tx.update_node_labels(collection_id, &[], &[NodeLabel::Collection])
            .await?;
        tx.update_node(
            collection_id,
            NodePatch {
                node_type: Some(NodeType::Node),
                modified: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            "Removed collection {}: {} child edges became {} edges across {} parents",
            collection_id,
            children.len(),
            redirected,
            destinations.len()
        );

        effects.events.push(DomainEvent::NodeDemoted {
            id: collection_id.to_string(),
        });
        self.publish(effects);

        Ok(true)
    }

    /// Delete the membership edge `node_id -> collection_id`
    ///
    /// Returns `false` if both nodes exist but are not connected.
    pub async fn remove_node(
        &self,
        user: &User,
        collection_id: &str,
        node_id: &str,
    ) -> Result<bool> {
        validate_id("userId", &user.id)?;
        validate_id("collectionId", collection_id)?;
        validate_id("nodeId", node_id)?;

        let mut tx = self.store.begin().await?;
        Self::require_owned(&mut tx, user, collection_id).await?;
        Self::require_owned(&mut tx, user, node_id).await?;

        let edges = tx
            .match_edges(
                &EdgeFilter::containment()
                    .starting_at(node_id)
                    .ending_at(collection_id),
            )
            .await?;
        if edges.is_empty() {
            tracing::debug!("{} is not a member of {}", node_id, collection_id);
            return Ok(false);
        }

        tx.delete_edge(EdgeSelector::containment(node_id, collection_id))
            .await?;
        tx.commit().await?;

        tracing::debug!("Removed {} from {}", node_id, collection_id);

        let mut effects = Effects::default();
        for edge in &edges {
            effects.edge_deleted(edge);
        }
        self.publish(effects);

        Ok(true)
    }

    /// Move `node_id` from `source_collection_id` to `target_collection_id`
    ///
    /// Deletes the old membership edge and creates `edge_id` in one commit.
    ///
    /// # Errors
    ///
    /// - `EdgeNotFound` if `node_id` is not in the source collection, unless
    ///   `edge_id` already connects it to the target (a retried move)
    /// - `Conflict` if the node is already in the target via another edge
    pub async fn move_node(
        &self,
        user: &User,
        source_collection_id: &str,
        node_id: &str,
        target_collection_id: &str,
        edge_id: &str,
    ) -> Result<EdgeProjection> {
        validate_id("userId", &user.id)?;
        validate_id("sourceCollectionId", source_collection_id)?;
        validate_id("nodeId", node_id)?;
        validate_id("targetCollectionId", target_collection_id)?;
        validate_id("edgeId", edge_id)?;
        if node_id == target_collection_id {
            return Err(ValidationError::InvalidId(format!(
                "node '{}' cannot contain itself",
                node_id
            ))
            .into());
        }

        let mut tx = self.store.begin().await?;
        Self::require_owned(&mut tx, user, source_collection_id).await?;
        Self::require_owned(&mut tx, user, node_id).await?;
        Self::require_container(&mut tx, user, target_collection_id).await?;

        let old = tx
            .match_edges(
                &EdgeFilter::containment()
                    .starting_at(node_id)
                    .ending_at(source_collection_id),
            )
            .await?;

        if old.is_empty() {
            let retried = tx
                .match_edges(&EdgeFilter::containment().with_id(edge_id))
                .await?;
            return match retried.into_iter().next() {
                Some(edge) if edge.connects(node_id, target_collection_id) => {
                    tracing::debug!("Edge {} already in place, move is a no-op", edge_id);
                    Ok(edge.projection())
                }
                _ => Err(CollectionServiceError::edge_not_found(
                    node_id,
                    source_collection_id,
                )),
            };
        }

        Self::reject_cycle(&mut tx, node_id, target_collection_id).await?;
        tx.delete_edge(EdgeSelector::containment(node_id, source_collection_id))
            .await?;
        let write =
            Self::ensure_edge(&mut tx, edge_id, node_id, target_collection_id, &old).await?;
        tx.commit().await?;

        tracing::debug!(
            "Moved {} from {} to {}",
            node_id,
            source_collection_id,
            target_collection_id
        );

        let mut effects = Effects::default();
        for edge in &old {
            effects.edge_deleted(edge);
        }
        if let EdgeWrite::Created(edge) = &write {
            effects.edge_created(edge);
        }
        self.publish(effects);

        Ok(write.edge().projection())
    }

    /// A collection and its direct members
    pub async fn get_collection(
        &self,
        user: &User,
        collection_id: &str,
    ) -> Result<CollectionDetail> {
        validate_id("userId", &user.id)?;
        validate_id("collectionId", collection_id)?;

        let mut tx = self.store.read().await?;
        let collection = Self::require_owned(&mut tx, user, collection_id).await?;
        let edges = tx
            .match_edges(&EdgeFilter::containment().ending_at(collection_id))
            .await?;

        let member_ids: HashSet<&str> = edges.iter().map(|e| e.start.as_str()).collect();
        let nodes = tx
            .match_nodes(&NodeFilter::default().authored_by(&user.id))
            .await?
            .into_iter()
            .filter(|n| member_ids.contains(n.id.as_str()))
            .map(|n| n.projection())
            .collect();

        Ok(CollectionDetail {
            collection: collection.projection(),
            nodes,
            edges: edges.iter().map(GraphEdge::projection).collect(),
        })
    }

    /// Every collection the user owns, root first then by name
    pub async fn list_collections(&self, user: &User) -> Result<Vec<NodeProjection>> {
        validate_id("userId", &user.id)?;

        let mut tx = self.store.read().await?;
        let mut collections = tx
            .match_nodes(
                &NodeFilter::default()
                    .with_label(NodeLabel::Collection)
                    .authored_by(&user.id),
            )
            .await?;

        collections.sort_by(|a, b| {
            b.is_root()
                .cmp(&a.is_root())
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(collections.iter().map(AbstractNode::projection).collect())
    }

    /// Change a node's display name
    pub async fn rename(&self, user: &User, node_id: &str, name: &str) -> Result<NodeProjection> {
        validate_id("userId", &user.id)?;
        validate_id("nodeId", node_id)?;
        let name = validate_name(name)?;

        let mut tx = self.store.begin().await?;
        let mut node = Self::require_owned(&mut tx, user, node_id).await?;
        if node.name == name {
            return Ok(node.projection());
        }

        let patch = NodePatch {
            name: Some(name),
            modified: Some(Utc::now()),
            ..Default::default()
        };
        tx.update_node(node_id, patch.clone()).await?;
        tx.commit().await?;
        patch.apply(&mut node);

        tracing::debug!("Renamed {} to '{}'", node_id, node.name);

        let mut effects = Effects::default();
        effects.events.push(DomainEvent::NodeRenamed {
            node: node.projection(),
        });
        effects.index.push((node.id.clone(), node.name.clone()));
        self.publish(effects);

        Ok(node.projection())
    }
}
