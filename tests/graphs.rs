mod common;

use std::sync::Arc;

use common::*;
use codeloom::graphs::{EdgePredicate, GraphBuilder, GraphCompileError};
use codeloom::runtimes::runtime_config::RunConfig;
use codeloom::runtimes::{RunManager, RunOutcome};
use codeloom::state::VersionedState;
use codeloom::types::NodeKind;

fn custom(name: &str) -> NodeKind {
    NodeKind::Custom(name.to_string())
}

#[test]
fn empty_graph_fails_to_compile() {
    let err = GraphBuilder::new().compile().err().unwrap();
    assert!(matches!(err, GraphCompileError::MissingEntry));
}

#[test]
fn edge_to_unregistered_node_fails_to_compile() {
    let err = GraphBuilder::new()
        .add_edge(NodeKind::Start, custom("ghost"))
        .compile()
        .err()
        .unwrap();
    assert!(matches!(err, GraphCompileError::UnknownNode { .. }));
}

#[test]
fn edge_out_of_end_fails_to_compile() {
    let err = GraphBuilder::new()
        .add_node(custom("a"), NoopNode)
        .add_edge(NodeKind::Start, custom("a"))
        .add_edge(NodeKind::End, custom("a"))
        .compile()
        .err()
        .unwrap();
    assert!(matches!(err, GraphCompileError::EdgeFromEnd));
}

#[test]
fn start_and_end_are_never_registered_as_nodes() {
    let app = GraphBuilder::new()
        .add_node(NodeKind::Start, NoopNode)
        .add_node(NodeKind::End, NoopNode)
        .add_node(custom("real"), NoopNode)
        .add_edge(NodeKind::Start, custom("real"))
        .compile()
        .unwrap();
    assert_eq!(app.nodes().len(), 1);
    assert!(app.nodes().contains_key(&custom("real")));
}

#[test]
fn resolve_next_follows_first_matching_edge() {
    let always: EdgePredicate = Arc::new(|_| true);
    let never: EdgePredicate = Arc::new(|_| false);
    let app = GraphBuilder::new()
        .add_node(custom("a"), NoopNode)
        .add_node(custom("b"), NoopNode)
        .add_node(custom("c"), NoopNode)
        .add_edge(NodeKind::Start, custom("a"))
        .add_conditional_edge(custom("a"), custom("b"), never)
        .add_conditional_edge(custom("a"), custom("c"), always)
        .compile()
        .unwrap();

    let snapshot = VersionedState::default().snapshot();
    assert_eq!(app.resolve_next(&custom("a"), &snapshot), Some(custom("c")));
}

#[test]
fn conditional_edges_resolve_in_registration_order() {
    // Both predicates match; the first-declared edge must win.
    let always_b: EdgePredicate = Arc::new(|_| true);
    let always_c: EdgePredicate = Arc::new(|_| true);
    let app = GraphBuilder::new()
        .add_node(custom("a"), NoopNode)
        .add_node(custom("b"), NoopNode)
        .add_node(custom("c"), NoopNode)
        .add_edge(NodeKind::Start, custom("a"))
        .add_conditional_edge(custom("a"), custom("b"), always_b)
        .add_conditional_edge(custom("a"), custom("c"), always_c)
        .compile()
        .unwrap();

    let snapshot = VersionedState::default().snapshot();
    assert_eq!(app.resolve_next(&custom("a"), &snapshot), Some(custom("b")));
}

#[test]
fn no_matching_edge_means_no_next_node() {
    let never: EdgePredicate = Arc::new(|_| false);
    let app = GraphBuilder::new()
        .add_node(custom("a"), NoopNode)
        .add_node(custom("b"), NoopNode)
        .add_edge(NodeKind::Start, custom("a"))
        .add_conditional_edge(custom("a"), custom("b"), never)
        .compile()
        .unwrap();

    let snapshot = VersionedState::default().snapshot();
    assert_eq!(app.resolve_next(&custom("a"), &snapshot), None);
}

#[tokio::test]
async fn run_with_no_matching_edge_terminates_completed() {
    // Property: a node with no matching outgoing edge terminates the run
    // normally; it never hangs.
    let app = GraphBuilder::new()
        .add_node(custom("only"), SayNode("did the thing"))
        .add_edge(NodeKind::Start, custom("only"))
        .with_engine_config(test_engine())
        .compile()
        .unwrap();

    let mut manager = RunManager::new(app).await;
    let run_id = manager
        .create_run(
            RunConfig::default(),
            VersionedState::new_with_user_message("go"),
        )
        .await
        .unwrap();
    let outcome = manager.run_until_settled(&run_id).await.unwrap();
    match outcome {
        RunOutcome::Completed(state) => {
            assert_eq!(state.messages.len(), 2);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}
