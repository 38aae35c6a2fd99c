//! SurrealGraphStore - GraphStore Implementation for SurrealDB Backend
//!
//! Embedded RocksDB-backed SurrealDB storage for the collection graph.
//!
//! # Schema
//!
//! - `graph_node` - SCHEMALESS, one record per node, record id = node uid
//! - `graph_edge` - SCHEMALESS, one record per edge (containment and author),
//!   record id = edge uid
//!
//! Both tables carry a UNIQUE index on `uid`, so a duplicate id fails the
//! enclosing transaction.
//!
//! # Transactions
//!
//! The Rust SDK has no interactive transactions. Reads run directly against
//! the database while the store's writer lock is held; buffered writes are
//! sent as a single `BEGIN TRANSACTION ... COMMIT TRANSACTION` batch, which
//! SurrealDB applies all-or-nothing. Edge endpoint existence is not enforced
//! by the database; callers check endpoints inside the same transaction.
//! Read-only transactions from [`GraphStore::read`] skip the writer lock.
//!
//! # Examples
//!
//! ```rust,no_run
//! use kbase_core::db::{GraphStore, SurrealGraphStore};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SurrealGraphStore::new(PathBuf::from("./data/graph.db")).await?;
//!     let tx = store.begin().await?;
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

use crate::db::graph_store::{
    EdgeFilter, EdgeSelector, GraphStore, GraphTransaction, Mutation, NodeFilter, NodePatch,
};
use crate::db::StoreError;
use crate::models::{AbstractNode, EdgeType, GraphEdge, LabelSet, NodeLabel, NodeType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use surrealdb::engine::local::{Db, RocksDb};
use surrealdb::Surreal;
use tokio::sync::{Mutex, OwnedMutexGuard};

const NODE_FIELDS: &str = "uid, name, node_type, is_root_collection, labels, created, modified";
const EDGE_FIELDS: &str = "uid, edge_type, start_id, end_id";

/// Internal struct matching the `graph_node` table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRecord {
    uid: String,
    name: String,
    node_type: String,
    is_root_collection: bool,
    labels: Vec<String>,
    created: String,
    modified: String,
}

impl From<&AbstractNode> for NodeRecord {
    fn from(node: &AbstractNode) -> Self {
        NodeRecord {
            uid: node.id.clone(),
            name: node.name.clone(),
            node_type: node.node_type.as_str().to_string(),
            is_root_collection: node.is_root_collection,
            labels: node.labels.iter().map(|l| l.as_str().to_string()).collect(),
            created: node.created.to_rfc3339(),
            modified: node.modified.to_rfc3339(),
        }
    }
}

impl TryFrom<NodeRecord> for AbstractNode {
    type Error = StoreError;

    fn try_from(record: NodeRecord) -> Result<Self, Self::Error> {
        let labels = record
            .labels
            .iter()
            .map(|l| parse_label(l.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AbstractNode {
            node_type: parse_node_type(&record.node_type)?,
            created: parse_timestamp(&record.created)?,
            modified: parse_timestamp(&record.modified)?,
            id: record.uid,
            name: record.name,
            is_root_collection: record.is_root_collection,
            labels: LabelSet::from_labels(labels),
        })
    }
}

/// Internal struct matching the `graph_edge` table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeRecord {
    uid: String,
    edge_type: String,
    start_id: String,
    end_id: String,
}

impl From<&GraphEdge> for EdgeRecord {
    fn from(edge: &GraphEdge) -> Self {
        EdgeRecord {
            uid: edge.id.clone(),
            edge_type: edge.edge_type.as_str().to_string(),
            start_id: edge.start.clone(),
            end_id: edge.end.clone(),
        }
    }
}

impl TryFrom<EdgeRecord> for GraphEdge {
    type Error = StoreError;

    fn try_from(record: EdgeRecord) -> Result<Self, Self::Error> {
        Ok(GraphEdge {
            edge_type: parse_edge_type(&record.edge_type)?,
            id: record.uid,
            start: record.start_id,
            end: record.end_id,
        })
    }
}

fn parse_label(raw: &str) -> Result<NodeLabel, StoreError> {
    match raw {
        "Node" => Ok(NodeLabel::Node),
        "Collection" => Ok(NodeLabel::Collection),
        "RootCollection" => Ok(NodeLabel::RootCollection),
        other => Err(StoreError::query_failed(format!("unknown label '{}'", other))),
    }
}

fn parse_node_type(raw: &str) -> Result<NodeType, StoreError> {
    match raw {
        "root" => Ok(NodeType::Root),
        "collection" => Ok(NodeType::Collection),
        "node" => Ok(NodeType::Node),
        other => Err(StoreError::query_failed(format!(
            "unknown node type '{}'",
            other
        ))),
    }
}

fn parse_edge_type(raw: &str) -> Result<EdgeType, StoreError> {
    match raw {
        "AbstractEdge" => Ok(EdgeType::Containment),
        "AUTHOR" => Ok(EdgeType::Author),
        other => Err(StoreError::query_failed(format!(
            "unknown edge type '{}'",
            other
        ))),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::query_failed(format!("invalid timestamp '{}': {}", raw, e)))
}

fn to_param(value: impl Serialize) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::query_failed(e.to_string()))
}

/// A SurrealQL statement list with positional `$pN` parameters
#[derive(Default)]
struct StatementBatch {
    statements: Vec<String>,
    params: Vec<(String, Value)>,
}

impl StatementBatch {
    fn param(&mut self, value: Value) -> String {
        let name = format!("p{}", self.params.len());
        self.params.push((name.clone(), value));
        format!("${}", name)
    }

    fn push(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        let statement = match mutation {
            Mutation::CreateNode(node) => {
                let id = self.param(Value::String(node.id.clone()));
                let content = self.param(to_param(NodeRecord::from(&node))?);
                format!("CREATE type::thing('graph_node', {}) CONTENT {};", id, content)
            }
            Mutation::CreateEdge(edge) => {
                let id = self.param(Value::String(edge.id.clone()));
                let content = self.param(to_param(EdgeRecord::from(&edge))?);
                format!("CREATE type::thing('graph_edge', {}) CONTENT {};", id, content)
            }
            Mutation::UpdateLabels { id, add, remove } => {
                let add: Vec<&str> = add.iter().map(NodeLabel::as_str).collect();
                let remove: Vec<&str> = remove.iter().map(NodeLabel::as_str).collect();
                let add = self.param(to_param(add)?);
                let remove = self.param(to_param(remove)?);
                let uid = self.param(Value::String(id));
                format!(
                    "UPDATE graph_node SET labels = array::sort(array::union(array::complement(labels, {}), {})) WHERE uid = {};",
                    remove, add, uid
                )
            }
            Mutation::UpdateNode { id, patch } => match self.patch_assignments(patch) {
                Some(assignments) => {
                    let uid = self.param(Value::String(id));
                    format!("UPDATE graph_node SET {} WHERE uid = {};", assignments, uid)
                }
                None => return Ok(()),
            },
            Mutation::DeleteEdge(EdgeSelector::Id(id)) => {
                let uid = self.param(Value::String(id));
                format!("DELETE graph_edge WHERE uid = {};", uid)
            }
            Mutation::DeleteEdge(EdgeSelector::Endpoints {
                edge_type,
                start,
                end,
            }) => {
                let edge_type = self.param(Value::String(edge_type.as_str().to_string()));
                let start = self.param(Value::String(start));
                let end = self.param(Value::String(end));
                format!(
                    "DELETE graph_edge WHERE edge_type = {} AND start_id = {} AND end_id = {};",
                    edge_type, start, end
                )
            }
        };
        self.statements.push(statement);
        Ok(())
    }

    fn patch_assignments(&mut self, patch: NodePatch) -> Option<String> {
        let mut assignments = Vec::new();
        if let Some(name) = patch.name {
            assignments.push(format!("name = {}", self.param(Value::String(name))));
        }
        if let Some(node_type) = patch.node_type {
            let value = Value::String(node_type.as_str().to_string());
            assignments.push(format!("node_type = {}", self.param(value)));
        }
        if let Some(modified) = patch.modified {
            let value = Value::String(modified.to_rfc3339());
            assignments.push(format!("modified = {}", self.param(value)));
        }
        if assignments.is_empty() {
            None
        } else {
            Some(assignments.join(", "))
        }
    }

    fn into_transaction(self) -> (String, Vec<(String, Value)>) {
        let sql = format!(
            "BEGIN TRANSACTION;\n{}\nCOMMIT TRANSACTION;",
            self.statements.join("\n")
        );
        (sql, self.params)
    }
}

/// SurrealGraphStore implements GraphStore for the SurrealDB embedded backend
pub struct SurrealGraphStore {
    db: Arc<Surreal<Db>>,
    writer: Arc<Mutex<()>>,
}

impl SurrealGraphStore {
    /// Open (or create) an embedded RocksDB database at `db_path`
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - RocksDB initialization fails
    /// - Namespace selection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        let db = Surreal::new::<RocksDb>(db_path.clone())
            .await
            .map_err(|e| StoreError::connection_failed(db_path.clone(), e.to_string()))?;

        db.use_ns("kbase")
            .use_db("graph")
            .await
            .map_err(|e| StoreError::connection_failed(db_path, e.to_string()))?;

        Self::initialize_schema(&db).await?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    async fn initialize_schema(db: &Surreal<Db>) -> Result<(), StoreError> {
        db.query(
            "
            DEFINE TABLE IF NOT EXISTS graph_node SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS graph_node_uid ON TABLE graph_node COLUMNS uid UNIQUE;
            DEFINE TABLE IF NOT EXISTS graph_edge SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS graph_edge_uid ON TABLE graph_edge COLUMNS uid UNIQUE;
            DEFINE INDEX IF NOT EXISTS graph_edge_end ON TABLE graph_edge COLUMNS edge_type, end_id;
            DEFINE INDEX IF NOT EXISTS graph_edge_start ON TABLE graph_edge COLUMNS edge_type, start_id;
            ",
        )
        .await
        .and_then(|response| response.check())
        .map_err(|e| StoreError::initialization_failed(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl GraphStore for SurrealGraphStore {
    async fn begin(&self) -> Result<Box<dyn GraphTransaction>, StoreError> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(SurrealTransaction {
            db: self.db.clone(),
            writer: Some(guard),
            pending: Vec::new(),
        }))
    }

    async fn read(&self) -> Result<Box<dyn GraphTransaction>, StoreError> {
        Ok(Box::new(SurrealTransaction {
            db: self.db.clone(),
            writer: None,
            pending: Vec::new(),
        }))
    }
}

struct SurrealTransaction {
    db: Arc<Surreal<Db>>,
    /// `None` for read-only transactions
    writer: Option<OwnedMutexGuard<()>>,
    pending: Vec<Mutation>,
}

impl SurrealTransaction {
    fn buffer(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        if self.writer.is_none() {
            return Err(StoreError::ReadOnly);
        }
        self.pending.push(mutation);
        Ok(())
    }

    async fn select<T>(&self, sql: String, params: Vec<(String, Value)>) -> Result<Vec<T>, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut query = self.db.query(sql);
        for param in params {
            query = query.bind(param);
        }
        let mut response = query.await?.check()?;
        Ok(response.take(0)?)
    }
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

#[async_trait]
impl GraphTransaction for SurrealTransaction {
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
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        if let Some(id) = &filter.id {
            clauses.push("uid = $uid".to_string());
            params.push(("uid".to_string(), Value::String(id.clone())));
        }
        if let Some(label) = filter.label {
            clauses.push("labels CONTAINS $label".to_string());
            params.push(("label".to_string(), Value::String(label.as_str().to_string())));
        }
        if let Some(author) = &filter.author {
            clauses.push(
                "uid INSIDE (SELECT VALUE end_id FROM graph_edge WHERE edge_type = 'AUTHOR' AND start_id = $author)"
                    .to_string(),
            );
            params.push(("author".to_string(), Value::String(author.clone())));
        }

        let sql = format!(
            "SELECT {} FROM graph_node{} ORDER BY uid;",
            NODE_FIELDS,
            where_clause(&clauses)
        );
        let records: Vec<NodeRecord> = self.select(sql, params).await?;
        records.into_iter().map(AbstractNode::try_from).collect()
    }

    async fn match_edges(&mut self, filter: &EdgeFilter) -> Result<Vec<GraphEdge>, StoreError> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        let fields = [
            ("edge_type", filter.edge_type.map(|t| t.as_str().to_string())),
            ("uid", filter.id.clone()),
            ("start_id", filter.start.clone()),
            ("end_id", filter.end.clone()),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                clauses.push(format!("{} = ${}", field, field));
                params.push((field.to_string(), Value::String(value)));
            }
        }

        let sql = format!(
            "SELECT {} FROM graph_edge{} ORDER BY uid;",
            EDGE_FIELDS,
            where_clause(&clauses)
        );
        let records: Vec<EdgeRecord> = self.select(sql, params).await?;
        records.into_iter().map(GraphEdge::try_from).collect()
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
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut batch = StatementBatch::default();
        for mutation in self.pending {
            batch.push(mutation)?;
        }
        let (sql, params) = batch.into_transaction();

        let mut query = self.db.query(sql);
        for param in params {
            query = query.bind(param);
        }
        query
            .await
            .and_then(|response| response.check())
            .map_err(|e| StoreError::transaction_failed(e.to_string()))?;

        Ok(())
    }
}
