//! InMemoryGraphStore - GraphStore Implementation Backed by Process Memory
//!
//! The default backend: used by tests, benchmarks and the server when no
//! database path is configured. State lives behind a `tokio::sync::RwLock`.
//! A read-write transaction owns the writer mutex guard for its whole
//! lifetime, which makes writers strictly serial. Reads take the state lock
//! only for the duration of one query, and commit takes it exclusively while
//! applying the batch.
//!
//! Commit applies buffered mutations one by one while recording an undo
//! journal. If any mutation violates a constraint, the journal is replayed in
//! reverse and the state is exactly what it was at `begin`.

use crate::db::graph_store::{
    EdgeFilter, EdgeSelector, GraphStore, GraphTransaction, Mutation, NodeFilter, NodePatch,
};
use crate::db::StoreError;
use crate::models::{AbstractNode, EdgeType, GraphEdge, NodeLabel};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<String, AbstractNode>,
    edges: HashMap<String, GraphEdge>,
}

/// Previous value of a record touched during commit
enum Undo {
    Node(String, Option<AbstractNode>),
    Edge(String, Option<GraphEdge>),
}

impl GraphState {
    fn apply_all(&mut self, mutations: Vec<Mutation>) -> Result<(), StoreError> {
        let mut journal = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            if let Err(e) = self.apply(mutation, &mut journal) {
                self.rollback(journal);
                return Err(e);
            }
        }
        Ok(())
    }

    fn apply(&mut self, mutation: Mutation, journal: &mut Vec<Undo>) -> Result<(), StoreError> {
        match mutation {
            Mutation::CreateNode(node) => {
                if self.nodes.contains_key(&node.id) {
                    return Err(StoreError::duplicate_node(node.id));
                }
                journal.push(Undo::Node(node.id.clone(), None));
                self.nodes.insert(node.id.clone(), node);
            }
            Mutation::CreateEdge(edge) => {
                if self.edges.contains_key(&edge.id) {
                    return Err(StoreError::duplicate_edge(edge.id));
                }
                // Author edges start at a user, which is not a graph node
                if edge.edge_type == EdgeType::Containment && !self.nodes.contains_key(&edge.start)
                {
                    return Err(StoreError::missing_node(edge.start));
                }
                if !self.nodes.contains_key(&edge.end) {
                    return Err(StoreError::missing_node(edge.end));
                }
                journal.push(Undo::Edge(edge.id.clone(), None));
                self.edges.insert(edge.id.clone(), edge);
            }
            Mutation::UpdateLabels { id, add, remove } => {
                let node = self.node_for_update(&id, journal)?;
                for label in remove {
                    node.labels.remove(label);
                }
                for label in add {
                    node.labels.insert(label);
                }
            }
            Mutation::UpdateNode { id, patch } => {
                let node = self.node_for_update(&id, journal)?;
                patch.apply(node);
            }
            Mutation::DeleteEdge(selector) => {
                let doomed: Vec<String> = self
                    .edges
                    .values()
                    .filter(|edge| selector.matches(edge))
                    .map(|edge| edge.id.clone())
                    .collect();
                for id in doomed {
                    let previous = self.edges.remove(&id);
                    journal.push(Undo::Edge(id, previous));
                }
            }
        }
        Ok(())
    }

    fn node_for_update(
        &mut self,
        id: &str,
        journal: &mut Vec<Undo>,
    ) -> Result<&mut AbstractNode, StoreError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::missing_node(id))?;
        journal.push(Undo::Node(id.to_string(), Some(node.clone())));
        Ok(node)
    }

    fn rollback(&mut self, journal: Vec<Undo>) {
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::Node(id, Some(node)) => {
                    self.nodes.insert(id, node);
                }
                Undo::Node(id, None) => {
                    self.nodes.remove(&id);
                }
                Undo::Edge(id, Some(edge)) => {
                    self.edges.insert(id, edge);
                }
                Undo::Edge(id, None) => {
                    self.edges.remove(&id);
                }
            }
        }
    }

    fn authored_by(&self, user_id: &str) -> HashSet<&str> {
        self.edges
            .values()
            .filter(|edge| edge.edge_type == EdgeType::Author && edge.start == user_id)
            .map(|edge| edge.end.as_str())
            .collect()
    }
}

/// In-process graph store
///
/// Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    state: Arc<RwLock<GraphState>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn begin(&self) -> Result<Box<dyn GraphTransaction>, StoreError> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            state: self.state.clone(),
            writer: Some(guard),
            pending: Vec::new(),
        }))
    }

    async fn read(&self) -> Result<Box<dyn GraphTransaction>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            state: self.state.clone(),
            writer: None,
            pending: Vec::new(),
        }))
    }
}

struct InMemoryTransaction {
    state: Arc<RwLock<GraphState>>,
    /// `None` for read-only transactions
    writer: Option<OwnedMutexGuard<()>>,
    pending: Vec<Mutation>,
}

impl InMemoryTransaction {
    fn buffer(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        if self.writer.is_none() {
            return Err(StoreError::ReadOnly);
        }
        self.pending.push(mutation);
        Ok(())
    }
}

#[async_trait]
impl GraphTransaction for InMemoryTransaction {
    async fn create_node(&mut self, node: AbstractNode) -> Result<String, StoreError> {
        let id = node.id.clone();
        self.buffer(Mutation::CreateNode(node))?;
        Ok(id)
    }

    async fn create_edge(&mut self, edge: GraphEdge) -> Result<String, StoreError> {
        let id = edge.id.clone();
        self.buffer(Mutation::CreateEdge(edge))?;
        Ok(id)
    }

    async fn match_nodes(&mut self, filter: &NodeFilter) -> Result<Vec<AbstractNode>, StoreError> {
        let state = self.state.read().await;
        let authored = filter
            .author
            .as_deref()
            .map(|user_id| state.authored_by(user_id));

        let mut nodes: Vec<AbstractNode> = state
            .nodes
            .values()
            .filter(|node| filter.matches_attributes(node))
            .filter(|node| {
                authored
                    .as_ref()
                    .map_or(true, |ids| ids.contains(node.id.as_str()))
            })
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn match_edges(&mut self, filter: &EdgeFilter) -> Result<Vec<GraphEdge>, StoreError> {
        let mut edges: Vec<GraphEdge> = self
            .state
            .read()
            .await
            .edges
            .values()
            .filter(|edge| filter.matches(edge))
            .cloned()
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(edges)
    }

    async fn update_node_labels(
        &mut self,
        id: &str,
        add: &[NodeLabel],
        remove: &[NodeLabel],
    ) -> Result<(), StoreError> {
        self.buffer(Mutation::UpdateLabels {
            id: id.to_string(),
            add: add.to_vec(),
            remove: remove.to_vec(),
        })
    }

    async fn update_node(&mut self, id: &str, patch: NodePatch) -> Result<(), StoreError> {
        self.buffer(Mutation::UpdateNode {
            id: id.to_string(),
            patch,
        })
    }

    async fn delete_edge(&mut self, selector: EdgeSelector) -> Result<(), StoreError> {
        self.buffer(Mutation::DeleteEdge(selector))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction {
            state,
            writer,
            pending,
        } = *self;
        if pending.is_empty() {
            return Ok(());
        }
        tracing::trace!(mutations = pending.len(), "Committing in-memory transaction");
        let result = state.write().await.apply_all(pending);
        drop(writer);
        result
    }
}
