//! Collection Graph Service Tests
//!
//! Integration tests for the seven graph operations against the in-memory
//! store. Each test loads a small fixture graph, runs one or more operations
//! and compares the resulting graph state.
//!
//! ## Fixture Graph
//!
//! ```text
//! TEST__node1 ──┐
//!               ├──> TEST__collection ──> TEST__rootCollection
//! TEST__node2 ──┘
//! ```
//!
//! ## Test Coverage
//! - Root creation and root removal
//! - Collection creation and retries
//! - connect / addNode / removeNode / moveNode edge bookkeeping
//! - Cascading removal, including multi-parent fan-out
//! - Cycle and leaf-container rejection
//! - Ownership scoping, events and search indexing
//! - Failed commits surfacing as `StoreUnavailable`

#[cfg(test)]
mod collection_graph_tests {
    use async_trait::async_trait;
    use kbase_core::db::{
        DomainEvent, EdgeFilter, EdgeSelector, EventEnvelope, GraphStore, GraphTransaction,
        InMemoryGraphStore, NodeFilter, NodePatch, StoreError,
    };
    use kbase_core::models::{AbstractNode, GraphEdge, LabelSet, NodeLabel, NodeType, User};
    use kbase_core::services::{
        CollectionAttrs, CollectionGraphService, CollectionServiceError, IndexQueue,
        SearchIndexer, SequentialIdAllocator,
    };
    use std::sync::Arc;
    use tokio::sync::{broadcast, mpsc};
    use tokio::time::{timeout, Duration};
    use tokio_test::{assert_err, assert_ok};

    const ROOT: &str = "TEST__rootCollection";
    const COLLECTION: &str = "TEST__collection";
    const NODE1: &str = "TEST__node1";
    const NODE2: &str = "TEST__node2";

    /// Containment graph visible to one user, sorted by id
    #[derive(Debug, Clone, PartialEq)]
    struct GraphState {
        nodes: Vec<AbstractNode>,
        edges: Vec<GraphEdge>,
    }

    impl GraphState {
        fn node(&self, id: &str) -> &AbstractNode {
            self.nodes
                .iter()
                .find(|n| n.id == id)
                .unwrap_or_else(|| panic!("node {} missing", id))
        }

        fn pairs(&self) -> Vec<(&str, &str)> {
            let mut pairs: Vec<(&str, &str)> = self
                .edges
                .iter()
                .map(|e| (e.start.as_str(), e.end.as_str()))
                .collect();
            pairs.sort();
            pairs
        }

        fn edge_between(&self, start: &str, end: &str) -> Option<&GraphEdge> {
            self.edges.iter().find(|e| e.connects(start, end))
        }
    }

    fn user() -> User {
        User::new("user-1")
    }

    fn setup() -> (Arc<InMemoryGraphStore>, CollectionGraphService) {
        let store = Arc::new(InMemoryGraphStore::new());
        let service = CollectionGraphService::new(store.clone())
            .with_id_allocator(Arc::new(SequentialIdAllocator::new("gen")));
        (store, service)
    }

    /// Insert nodes (with author edges for `user`) and containment edges
    async fn load_fixtures(
        store: &InMemoryGraphStore,
        user: &User,
        nodes: Vec<AbstractNode>,
        edges: Vec<GraphEdge>,
    ) {
        let mut tx = store.begin().await.unwrap();
        for node in nodes {
            let author = GraphEdge::author(format!("author-{}", node.id), &user.id, &node.id);
            tx.create_node(node).await.unwrap();
            tx.create_edge(author).await.unwrap();
        }
        for edge in edges {
            tx.create_edge(edge).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    async fn graph_state(store: &InMemoryGraphStore, user: &User) -> GraphState {
        let mut tx = store.begin().await.unwrap();
        let nodes = tx
            .match_nodes(&NodeFilter::default().authored_by(&user.id))
            .await
            .unwrap();
        let edges = tx
            .match_edges(&EdgeFilter::containment())
            .await
            .unwrap()
            .into_iter()
            .filter(|e| nodes.iter().any(|n| n.id == e.start))
            .collect();
        GraphState { nodes, edges }
    }

    /// root <- collection <- {node1, node2}
    async fn load_cascade_fixture(store: &InMemoryGraphStore) {
        load_fixtures(
            store,
            &user(),
            vec![
                AbstractNode::new_root(ROOT, "My Knowledge Base"),
                AbstractNode::new_collection(COLLECTION, "Collection"),
                AbstractNode::new_leaf(NODE1, "Node 1"),
                AbstractNode::new_leaf(NODE2, "Node 2"),
            ],
            vec![
                GraphEdge::containment("TEST__collection_root", COLLECTION, ROOT),
                GraphEdge::containment("TEST__node1_collection", NODE1, COLLECTION),
                GraphEdge::containment("TEST__node2_collection", NODE2, COLLECTION),
            ],
        )
        .await;
    }

    async fn root_count(store: &InMemoryGraphStore, user: &User) -> usize {
        let mut tx = store.begin().await.unwrap();
        tx.match_nodes(
            &NodeFilter::default()
                .with_label(NodeLabel::RootCollection)
                .authored_by(&user.id),
        )
        .await
        .unwrap()
        .len()
    }

    #[tokio::test]
    async fn test_create_root_collection() {
        let (store, service) = setup();

        let root = assert_ok!(service.create_root_collection(&user()).await);

        assert_eq!(root.node_type, NodeType::Root);
        assert!(root.is_root_collection);
        assert_eq!(root.name, "My Knowledge Base");

        let state = graph_state(&store, &user()).await;
        assert_eq!(state.nodes.len(), 1);
        assert_eq!(state.nodes[0].labels, LabelSet::root());
        assert!(state.edges.is_empty());

        let mut tx = store.begin().await.unwrap();
        let authors = tx
            .match_edges(&EdgeFilter::author().ending_at(&root.id))
            .await
            .unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].start, "user-1");
    }

    #[tokio::test]
    async fn test_create_root_collection_twice_returns_existing() {
        let (store, service) = setup();

        let first = service.create_root_collection(&user()).await.unwrap();
        let second = service.create_root_collection(&user()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(root_count(&store, &user()).await, 1);
    }

    #[tokio::test]
    async fn test_create_collection_wowzers() {
        let (store, service) = setup();
        load_fixtures(
            &store,
            &user(),
            vec![AbstractNode::new_root(ROOT, "My Knowledge Base")],
            vec![],
        )
        .await;

        let created = service
            .create(&user(), "wowzers-id", ROOT, CollectionAttrs::named("wowzers"))
            .await
            .unwrap();

        assert_eq!(created.id, "wowzers-id");
        assert_eq!(created.name, "wowzers");
        assert_eq!(created.node_type, NodeType::Collection);
        assert!(!created.is_root_collection);

        let state = graph_state(&store, &user()).await;
        assert_eq!(state.nodes.len(), 2);
        assert_eq!(state.node("wowzers-id").labels, LabelSet::collection());
        assert_eq!(state.pairs(), vec![("wowzers-id", ROOT)]);
    }

    #[tokio::test]
    async fn test_create_with_unknown_parent_fails_without_effect() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        let before = graph_state(&store, &user()).await;

        let err = service
            .create(&user(), "new", "missing-parent", CollectionAttrs::named("New"))
            .await
            .unwrap_err();

        assert!(matches!(err, CollectionServiceError::NodeNotFound { ref id } if id == "missing-parent"));
        assert_eq!(graph_state(&store, &user()).await, before);
    }

    #[tokio::test]
    async fn test_create_retry_is_idempotent() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;

        let first = service
            .create(&user(), "c2", ROOT, CollectionAttrs::named("Second"))
            .await
            .unwrap();
        let after_first = graph_state(&store, &user()).await;

        let retry = service
            .create(&user(), "c2", ROOT, CollectionAttrs::named("Second"))
            .await
            .unwrap();

        assert_eq!(first, retry);
        assert_eq!(graph_state(&store, &user()).await, after_first);
    }

    #[tokio::test]
    async fn test_create_retry_with_other_payload_conflicts() {
        let (_store, service) = setup();
        let root = service.create_root_collection(&user()).await.unwrap();
        service
            .create(&user(), "c2", &root.id, CollectionAttrs::named("Second"))
            .await
            .unwrap();

        let err = service
            .create(&user(), "c2", &root.id, CollectionAttrs::named("Different"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionServiceError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_create_retry_repairs_missing_parent_edge() {
        let (store, service) = setup();
        load_fixtures(
            &store,
            &user(),
            vec![
                AbstractNode::new_root(ROOT, "My Knowledge Base"),
                AbstractNode::new_collection("orphan", "Orphan"),
            ],
            vec![],
        )
        .await;

        service
            .create(&user(), "orphan", ROOT, CollectionAttrs::named("Orphan"))
            .await
            .unwrap();

        let state = graph_state(&store, &user()).await;
        assert_eq!(state.pairs(), vec![("orphan", ROOT)]);
    }

    #[tokio::test]
    async fn test_connect_adds_exactly_one_edge() {
        let (store, service) = setup();
        load_fixtures(
            &store,
            &user(),
            vec![
                AbstractNode::new_collection("source", "Source collection"),
                AbstractNode::new_collection("target", "Target collection"),
            ],
            vec![],
        )
        .await;
        let before = graph_state(&store, &user()).await;

        let edge = service
            .connect(&user(), "source", "target", "edge-1")
            .await
            .unwrap();

        assert_eq!(edge.start, "source");
        assert_eq!(edge.end, "target");
        assert_eq!(edge.id, "edge-1");

        let after = graph_state(&store, &user()).await;
        assert_eq!(after.nodes, before.nodes);
        assert_eq!(after.edges, vec![GraphEdge::containment("edge-1", "source", "target")]);
    }

    #[tokio::test]
    async fn test_connect_missing_endpoint_is_not_found() {
        let (_store, service) = setup();
        let root = service.create_root_collection(&user()).await.unwrap();

        let err = assert_err!(service.connect(&user(), "ghost", &root.id, "e1").await);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_connect_retry_and_conflicts() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;

        let first = service.connect(&user(), NODE1, ROOT, "e-1").await.unwrap();
        let retry = service.connect(&user(), NODE1, ROOT, "e-1").await.unwrap();
        assert_eq!(first, retry);

        let state = graph_state(&store, &user()).await;
        assert_eq!(state.edges.iter().filter(|e| e.id == "e-1").count(), 1);

        // same id, different endpoints
        let err = service.connect(&user(), NODE2, ROOT, "e-1").await.unwrap_err();
        assert!(matches!(err, CollectionServiceError::Conflict { .. }));

        // same endpoints, different id
        let err = service.connect(&user(), NODE1, ROOT, "e-2").await.unwrap_err();
        assert!(matches!(err, CollectionServiceError::Conflict { .. }));

        assert_eq!(graph_state(&store, &user()).await, state);
    }

    #[tokio::test]
    async fn test_remove_root_is_noop() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        let before = graph_state(&store, &user()).await;

        assert!(service.remove(&user(), ROOT).await.unwrap());

        assert_eq!(graph_state(&store, &user()).await, before);
        assert_eq!(root_count(&store, &user()).await, 1);
    }

    #[tokio::test]
    async fn test_remove_converts_collection_to_node() {
        let (store, service) = setup();
        load_fixtures(
            &store,
            &user(),
            vec![
                AbstractNode::new_root(ROOT, "My Knowledge Base"),
                AbstractNode::new_collection(COLLECTION, "Collection"),
            ],
            vec![GraphEdge::containment("TEST__collection_root", COLLECTION, ROOT)],
        )
        .await;

        assert!(service.remove(&user(), COLLECTION).await.unwrap());

        let state = graph_state(&store, &user()).await;
        let demoted = state.node(COLLECTION);
        assert_eq!(demoted.labels, LabelSet::leaf());
        assert_eq!(demoted.node_type, NodeType::Node);
        assert_eq!(demoted.name, "Collection");
        assert!(demoted.is_consistent());
        assert_eq!(
            state.edges,
            vec![GraphEdge::containment("TEST__collection_root", COLLECTION, ROOT)]
        );
    }

    #[tokio::test]
    async fn test_remove_attaches_children_to_parent() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        let before = graph_state(&store, &user()).await;

        assert!(service.remove(&user(), COLLECTION).await.unwrap());

        let after = graph_state(&store, &user()).await;
        assert_eq!(after.nodes.len(), before.nodes.len());
        assert!(!after.node(COLLECTION).labels.has(NodeLabel::Collection));
        assert_eq!(
            after.pairs(),
            vec![(COLLECTION, ROOT), (NODE1, ROOT), (NODE2, ROOT)]
        );

        // redirected edges keep their ids, the collection's own edge is untouched
        assert_eq!(after.edge_between(NODE1, ROOT).unwrap().id, "TEST__node1_collection");
        assert_eq!(after.edge_between(NODE2, ROOT).unwrap().id, "TEST__node2_collection");
        assert_eq!(
            after.edge_between(COLLECTION, ROOT),
            before.edge_between(COLLECTION, ROOT)
        );
    }

    #[tokio::test]
    async fn test_remove_twice_is_noop() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;

        service.remove(&user(), COLLECTION).await.unwrap();
        let after_first = graph_state(&store, &user()).await;

        assert!(service.remove(&user(), COLLECTION).await.unwrap());
        assert_eq!(graph_state(&store, &user()).await, after_first);
    }

    #[tokio::test]
    async fn test_remove_fans_out_to_every_parent() {
        let (store, service) = setup();
        load_fixtures(
            &store,
            &user(),
            vec![
                AbstractNode::new_root(ROOT, "My Knowledge Base"),
                AbstractNode::new_collection("parent-b", "Parent B"),
                AbstractNode::new_collection(COLLECTION, "Collection"),
                AbstractNode::new_leaf(NODE1, "Node 1"),
            ],
            vec![
                GraphEdge::containment("e-b-root", "parent-b", ROOT),
                GraphEdge::containment("e-c-1", COLLECTION, ROOT),
                GraphEdge::containment("e-c-2", COLLECTION, "parent-b"),
                GraphEdge::containment("e-n1", NODE1, COLLECTION),
            ],
        )
        .await;

        service.remove(&user(), COLLECTION).await.unwrap();

        let state = graph_state(&store, &user()).await;
        // first parent by edge id keeps the child edge id
        assert_eq!(state.edge_between(NODE1, ROOT).unwrap().id, "e-n1");
        assert_eq!(state.edge_between(NODE1, "parent-b").unwrap().id, "gen-1");
        assert!(state.edges.iter().all(|e| e.end != COLLECTION));
        assert!(state.edge_between(COLLECTION, ROOT).is_some());
        assert!(state.edge_between(COLLECTION, "parent-b").is_some());
    }

    #[tokio::test]
    async fn test_remove_skips_redirects_that_would_duplicate() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        service
            .add_node(&user(), ROOT, NODE1, "node1_root")
            .await
            .unwrap();

        service.remove(&user(), COLLECTION).await.unwrap();

        let state = graph_state(&store, &user()).await;
        let node1_to_root: Vec<_> = state.edges.iter().filter(|e| e.connects(NODE1, ROOT)).collect();
        assert_eq!(node1_to_root.len(), 1);
        assert_eq!(node1_to_root[0].id, "node1_root");
        assert!(state.edge_between(NODE2, ROOT).is_some());
    }

    #[tokio::test]
    async fn test_remove_parentless_collection_redirects_to_root() {
        let (store, service) = setup();
        load_fixtures(
            &store,
            &user(),
            vec![
                AbstractNode::new_root(ROOT, "My Knowledge Base"),
                AbstractNode::new_collection(COLLECTION, "Detached"),
                AbstractNode::new_leaf(NODE1, "Node 1"),
            ],
            vec![GraphEdge::containment("e-n1", NODE1, COLLECTION)],
        )
        .await;

        service.remove(&user(), COLLECTION).await.unwrap();

        let state = graph_state(&store, &user()).await;
        assert_eq!(state.pairs(), vec![(NODE1, ROOT)]);
    }

    #[tokio::test]
    async fn test_add_node_establishes_multi_membership() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        service
            .create(&user(), "other", ROOT, CollectionAttrs::named("Other"))
            .await
            .unwrap();

        let edge = service
            .add_node(&user(), "other", NODE1, "TEST__node_collection")
            .await
            .unwrap();
        assert_eq!(edge.start, NODE1);
        assert_eq!(edge.end, "other");
        assert_eq!(edge.id, "TEST__node_collection");

        let state = graph_state(&store, &user()).await;
        assert!(state.edge_between(NODE1, COLLECTION).is_some());
        assert!(state.edge_between(NODE1, "other").is_some());
        assert_eq!(state.node(NODE1).labels, LabelSet::leaf());
    }

    #[tokio::test]
    async fn test_remove_node_then_add_node_round_trip() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        let before = graph_state(&store, &user()).await;

        assert!(service.remove_node(&user(), COLLECTION, NODE1).await.unwrap());
        let removed = graph_state(&store, &user()).await;
        assert!(removed.edge_between(NODE1, COLLECTION).is_none());

        service
            .add_node(&user(), COLLECTION, NODE1, "restored")
            .await
            .unwrap();

        let after = graph_state(&store, &user()).await;
        assert_eq!(after.pairs(), before.pairs());
        assert_eq!(after.edge_between(NODE1, COLLECTION).unwrap().id, "restored");
    }

    #[tokio::test]
    async fn test_remove_node_without_edge_returns_false() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        let before = graph_state(&store, &user()).await;

        assert!(!service.remove_node(&user(), ROOT, NODE1).await.unwrap());
        assert_eq!(graph_state(&store, &user()).await, before);

        let err = service
            .remove_node(&user(), COLLECTION, "ghost")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_move_node_from_root_to_collection() {
        let (store, service) = setup();
        load_fixtures(
            &store,
            &user(),
            vec![
                AbstractNode::new_root(ROOT, "My Knowledge Base"),
                AbstractNode::new_collection(COLLECTION, "Collection"),
                AbstractNode::new_leaf(NODE1, "Node"),
            ],
            vec![
                GraphEdge::containment("TEST__collection_root", COLLECTION, ROOT),
                GraphEdge::containment("TEST__node_root", NODE1, ROOT),
            ],
        )
        .await;
        let before = graph_state(&store, &user()).await;

        let edge = service
            .move_node(&user(), ROOT, NODE1, COLLECTION, "moved")
            .await
            .unwrap();

        assert_eq!(edge.start, NODE1);
        assert_eq!(edge.end, COLLECTION);
        assert_eq!(edge.id, "moved");

        let after = graph_state(&store, &user()).await;
        assert_eq!(after.edges.len(), before.edges.len());
        assert!(after.edge_between(NODE1, ROOT).is_none());
        assert_eq!(after.edge_between(COLLECTION, ROOT), before.edge_between(COLLECTION, ROOT));
    }

    #[tokio::test]
    async fn test_move_node_retry_is_noop() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;

        service
            .move_node(&user(), COLLECTION, NODE1, ROOT, "moved")
            .await
            .unwrap();
        let after_first = graph_state(&store, &user()).await;

        let retry = service
            .move_node(&user(), COLLECTION, NODE1, ROOT, "moved")
            .await
            .unwrap();
        assert_eq!(retry.id, "moved");
        assert_eq!(graph_state(&store, &user()).await, after_first);
    }

    #[tokio::test]
    async fn test_move_node_without_source_edge() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;

        let err = service
            .move_node(&user(), ROOT, NODE1, COLLECTION, "moved")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollectionServiceError::EdgeNotFound { ref start, ref end } if start == NODE1 && end == ROOT
        ));
    }

    #[tokio::test]
    async fn test_move_node_into_existing_membership_conflicts() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        service.add_node(&user(), ROOT, NODE1, "n1-root").await.unwrap();
        let before = graph_state(&store, &user()).await;

        let err = service
            .move_node(&user(), COLLECTION, NODE1, ROOT, "another")
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionServiceError::Conflict { .. }));
        assert_eq!(graph_state(&store, &user()).await, before);
    }

    #[tokio::test]
    async fn test_other_users_nodes_are_not_found() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        let intruder = User::new("user-2");
        service.create_root_collection(&intruder).await.unwrap();

        assert!(service.remove(&intruder, COLLECTION).await.unwrap_err().is_not_found());
        assert!(service
            .add_node(&intruder, COLLECTION, NODE1, "e")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(service
            .get_collection(&intruder, COLLECTION)
            .await
            .unwrap_err()
            .is_not_found());

        let listed = service.list_collections(&intruder).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_root_collection);
    }

    #[tokio::test]
    async fn test_get_collection_returns_members() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;

        let detail = service.get_collection(&user(), COLLECTION).await.unwrap();

        assert_eq!(detail.collection.id, COLLECTION);
        let mut member_ids: Vec<&str> = detail.nodes.iter().map(|n| n.id.as_str()).collect();
        member_ids.sort();
        assert_eq!(member_ids, vec![NODE1, NODE2]);
        assert_eq!(detail.edges.len(), 2);
        assert!(detail.edges.iter().all(|e| e.end == COLLECTION));
    }

    #[tokio::test]
    async fn test_single_root_survives_operation_sequence() {
        let (store, service) = setup();
        let user = user();
        let root = service.create_root_collection(&user).await.unwrap();

        service
            .create(&user, "a", &root.id, CollectionAttrs::named("A"))
            .await
            .unwrap();
        service
            .create(&user, "b", "a", CollectionAttrs::named("B"))
            .await
            .unwrap();
        service.connect(&user, "b", &root.id, "b-root").await.unwrap();
        service.remove(&user, "a").await.unwrap();
        service.remove(&user, &root.id).await.unwrap();
        service.create_root_collection(&user).await.unwrap();
        service
            .create(&user, "c", &root.id, CollectionAttrs::named("C"))
            .await
            .unwrap();
        service
            .move_node(&user, &root.id, "b", "c", "b-c")
            .await
            .unwrap();

        assert_eq!(root_count(&store, &user).await, 1);
        let state = graph_state(&store, &user).await;
        assert!(state.nodes.iter().all(AbstractNode::is_consistent));
        // every non-root node keeps at least one container
        for node in state.nodes.iter().filter(|n| !n.is_root()) {
            assert!(
                state.edges.iter().any(|e| e.start == node.id),
                "{} has no container",
                node.id
            );
        }
    }

    #[tokio::test]
    async fn test_concurrent_operations_on_one_collection() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        for i in 0..8 {
            load_fixtures(
                &store,
                &user(),
                vec![AbstractNode::new_leaf(format!("leaf-{}", i), "Leaf")],
                vec![GraphEdge::containment(format!("leaf-{}-root", i), format!("leaf-{}", i), ROOT)],
            )
            .await;
        }

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .add_node(&user(), COLLECTION, &format!("leaf-{}", i), &format!("leaf-{}-c", i))
                    .await
            }));
        }
        let remover = {
            let service = service.clone();
            tokio::spawn(async move { service.remove(&user(), COLLECTION).await })
        };

        for handle in handles {
            // adds that lose the race find a plain node
            if let Err(err) = handle.await.unwrap() {
                assert!(err.is_not_found(), "unexpected error: {}", err);
            }
        }
        remover.await.unwrap().unwrap();

        let state = graph_state(&store, &user()).await;
        assert_eq!(state.node(COLLECTION).node_type, NodeType::Node);
        assert!(state.edges.iter().all(|e| e.end != COLLECTION));
        let mut pairs = state.pairs();
        let total = pairs.len();
        pairs.dedup();
        assert_eq!(pairs.len(), total);
        for i in 0..8 {
            assert!(state.edge_between(&format!("leaf-{}", i), ROOT).is_some());
        }
    }

    /// root <- a <- b
    async fn load_chain_fixture(store: &InMemoryGraphStore) {
        load_fixtures(
            store,
            &user(),
            vec![
                AbstractNode::new_root(ROOT, "My Knowledge Base"),
                AbstractNode::new_collection("a", "A"),
                AbstractNode::new_collection("b", "B"),
            ],
            vec![
                GraphEdge::containment("a-root", "a", ROOT),
                GraphEdge::containment("b-a", "b", "a"),
            ],
        )
        .await;
    }

    #[tokio::test]
    async fn test_connect_rejects_containment_cycle() {
        let (store, service) = setup();
        load_chain_fixture(&store).await;
        let before = graph_state(&store, &user()).await;

        let err = service.connect(&user(), "a", "b", "cyc").await.unwrap_err();
        assert!(matches!(err, CollectionServiceError::Conflict { .. }));

        // transitive: root sits above b through a
        let err = service.add_node(&user(), "b", ROOT, "deep").await.unwrap_err();
        assert!(matches!(err, CollectionServiceError::Conflict { .. }));

        assert_eq!(graph_state(&store, &user()).await, before);

        // a stays reachable after b is cascaded away
        service.remove(&user(), "b").await.unwrap();
        let state = graph_state(&store, &user()).await;
        assert_eq!(state.pairs(), vec![("a", ROOT), ("b", "a")]);
    }

    #[tokio::test]
    async fn test_move_node_rejects_containment_cycle() {
        let (store, service) = setup();
        load_chain_fixture(&store).await;
        let before = graph_state(&store, &user()).await;

        let err = service
            .move_node(&user(), ROOT, "a", "b", "a-b")
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionServiceError::Conflict { .. }));
        assert_eq!(graph_state(&store, &user()).await, before);
    }

    #[tokio::test]
    async fn test_plain_nodes_cannot_gain_children() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        service.remove(&user(), COLLECTION).await.unwrap();
        let before = graph_state(&store, &user()).await;

        let err = service
            .create(&user(), "x", COLLECTION, CollectionAttrs::named("X"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = service
            .add_node(&user(), COLLECTION, NODE1, "e9")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = service.connect(&user(), NODE2, NODE1, "leafy").await.unwrap_err();
        assert!(err.is_not_found());

        let err = service
            .move_node(&user(), ROOT, NODE1, NODE2, "moved")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(graph_state(&store, &user()).await, before);
    }

    /// Delegates everything to an in-memory store but fails every commit
    struct FailingCommitStore {
        inner: Arc<InMemoryGraphStore>,
    }

    struct FailingCommitTransaction {
        inner: Box<dyn GraphTransaction>,
    }

    #[async_trait]
    impl GraphStore for FailingCommitStore {
        async fn begin(&self) -> Result<Box<dyn GraphTransaction>, StoreError> {
            let inner = self.inner.begin().await?;
            Ok(Box::new(FailingCommitTransaction { inner }))
        }

        async fn read(&self) -> Result<Box<dyn GraphTransaction>, StoreError> {
            self.inner.read().await
        }
    }

    #[async_trait]
    impl GraphTransaction for FailingCommitTransaction {
        async fn create_node(&mut self, node: AbstractNode) -> Result<String, StoreError> {
            self.inner.create_node(node).await
        }

        async fn create_edge(&mut self, edge: GraphEdge) -> Result<String, StoreError> {
            self.inner.create_edge(edge).await
        }

        async fn match_nodes(
            &mut self,
            filter: &NodeFilter,
        ) -> Result<Vec<AbstractNode>, StoreError> {
            self.inner.match_nodes(filter).await
        }

        async fn match_edges(&mut self, filter: &EdgeFilter) -> Result<Vec<GraphEdge>, StoreError> {
            self.inner.match_edges(filter).await
        }

        async fn update_node_labels(
            &mut self,
            id: &str,
            add: &[NodeLabel],
            remove: &[NodeLabel],
        ) -> Result<(), StoreError> {
            self.inner.update_node_labels(id, add, remove).await
        }

        async fn update_node(&mut self, id: &str, patch: NodePatch) -> Result<(), StoreError> {
            self.inner.update_node(id, patch).await
        }

        async fn delete_edge(&mut self, selector: EdgeSelector) -> Result<(), StoreError> {
            self.inner.delete_edge(selector).await
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            Err(StoreError::transaction_failed("disk full"))
        }
    }

    #[tokio::test]
    async fn test_failed_commit_is_store_unavailable_without_effects() {
        let store = Arc::new(InMemoryGraphStore::new());
        load_cascade_fixture(&store).await;
        load_fixtures(
            &store,
            &user(),
            vec![AbstractNode::new_collection("other", "Other")],
            vec![GraphEdge::containment("other-root", "other", ROOT)],
        )
        .await;
        let before = graph_state(&store, &user()).await;

        let (event_tx, mut rx) = broadcast::channel::<EventEnvelope>(32);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let queue = IndexQueue::spawn(
            Arc::new(RecordingIndexer {
                seen: seen_tx,
                fail: false,
            }),
            16,
        );
        let service = CollectionGraphService::new(Arc::new(FailingCommitStore {
            inner: store.clone(),
        }))
        .with_id_allocator(Arc::new(SequentialIdAllocator::new("gen")))
        .with_events(event_tx, None)
        .with_indexer(queue);

        let err = service.remove(&user(), COLLECTION).await.unwrap_err();
        assert!(matches!(err, CollectionServiceError::StoreUnavailable(_)));

        let err = service
            .move_node(&user(), COLLECTION, NODE1, "other", "moved")
            .await
            .unwrap_err();
        assert!(matches!(err, CollectionServiceError::StoreUnavailable(_)));

        let err = service.rename(&user(), COLLECTION, "Renamed").await.unwrap_err();
        assert!(matches!(err, CollectionServiceError::StoreUnavailable(_)));

        assert_eq!(graph_state(&store, &user()).await, before);
        assert!(rx.try_recv().is_err());
        assert!(timeout(Duration::from_millis(50), seen_rx.recv()).await.is_err());

        // reads still work
        let detail = service.get_collection(&user(), COLLECTION).await.unwrap();
        assert_eq!(detail.nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_events_emitted_after_commit() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        let (event_tx, mut rx) = broadcast::channel::<EventEnvelope>(32);
        let service = service.with_events(event_tx, Some("web".to_string()));

        service
            .create(&user(), "c2", ROOT, CollectionAttrs::named("Second"))
            .await
            .unwrap();

        let first = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("event should be emitted")
            .unwrap();
        assert!(matches!(first.event, DomainEvent::NodeCreated { ref node } if node.id == "c2"));
        assert_eq!(first.source_client_id.as_deref(), Some("web"));

        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, DomainEvent::EdgeCreated { ref edge } if edge.start == "c2"));

        // failed operations emit nothing
        let _ = service.remove(&user(), "ghost").await;
        assert!(rx.try_recv().is_err());

        service.remove(&user(), COLLECTION).await.unwrap();
        let mut types = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            types.push(envelope.event.event_type().to_string());
        }
        assert_eq!(types.last().map(String::as_str), Some("node:demoted"));
        assert_eq!(types.iter().filter(|t| *t == "edge:deleted").count(), 2);
    }

    struct RecordingIndexer {
        seen: mpsc::UnboundedSender<(String, String)>,
        fail: bool,
    }

    #[async_trait]
    impl SearchIndexer for RecordingIndexer {
        async fn index(&self, node_id: &str, name: &str) -> anyhow::Result<()> {
            let _ = self.seen.send((node_id.to_string(), name.to_string()));
            if self.fail {
                anyhow::bail!("search cluster unreachable");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_and_rename_are_indexed() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let queue = IndexQueue::spawn(
            Arc::new(RecordingIndexer {
                seen: seen_tx,
                fail: false,
            }),
            16,
        );
        let service = service.with_indexer(queue);

        service
            .create(&user(), "c2", ROOT, CollectionAttrs::named("Second"))
            .await
            .unwrap();
        service.rename(&user(), "c2", "Renamed").await.unwrap();

        assert_eq!(
            seen_rx.recv().await.unwrap(),
            ("c2".to_string(), "Second".to_string())
        );
        assert_eq!(
            seen_rx.recv().await.unwrap(),
            ("c2".to_string(), "Renamed".to_string())
        );
    }

    #[tokio::test]
    async fn test_indexer_failure_does_not_fail_operation() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let queue = IndexQueue::spawn(
            Arc::new(RecordingIndexer {
                seen: seen_tx,
                fail: true,
            }),
            16,
        );
        let service = service.with_indexer(queue);

        let created = service
            .create(&user(), "c2", ROOT, CollectionAttrs::named("Second"))
            .await;
        assert_ok!(created);
        assert_eq!(seen_rx.recv().await.unwrap().0, "c2");

        let state = graph_state(&store, &user()).await;
        assert!(state.nodes.iter().any(|n| n.id == "c2"));
    }

    #[tokio::test]
    async fn test_rename_validates_name() {
        let (store, service) = setup();
        load_cascade_fixture(&store).await;

        let err = service.rename(&user(), COLLECTION, "  ").await.unwrap_err();
        assert!(matches!(err, CollectionServiceError::ValidationFailed(_)));
        assert_eq!(
            graph_state(&store, &user()).await.node(COLLECTION).name,
            "Collection"
        );
    }
}
