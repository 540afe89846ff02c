mod common;

use common::*;
use codeloom::accounting::TokenDataPoint;
use codeloom::channels::Channel;
use codeloom::graphs::GraphBuilder;
use codeloom::message::Message;
use codeloom::node::NodePartial;
use codeloom::plan::{TaskPlan, TaskStatus};
use codeloom::state::VersionedState;
use codeloom::types::NodeKind;
use codeloom::utils::collections::{new_counter_map, new_extra_map};

fn test_app() -> codeloom::app::App {
    GraphBuilder::new()
        .add_node(NodeKind::Custom("n".into()), NoopNode)
        .add_edge(NodeKind::Start, NodeKind::Custom("n".into()))
        .compile()
        .unwrap()
}

#[test]
fn messages_append_and_version_bumps_only_on_change() {
    let app = test_app();
    let mut state = VersionedState::new_with_user_message("hi");
    assert_eq!(state.messages.version(), 1);

    let partial = NodePartial::new().with_messages(vec![Message::assistant("yo")]);
    let outcome = app
        .apply_update(&mut state, &NodeKind::Custom("n".into()), &partial)
        .unwrap();
    assert_eq!(outcome.updated_channels, vec!["messages"]);
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages.version(), 2);

    // An empty update changes nothing and bumps nothing.
    let outcome = app
        .apply_update(
            &mut state,
            &NodeKind::Custom("n".into()),
            &NodePartial::default(),
        )
        .unwrap();
    assert!(outcome.updated_channels.is_empty());
    assert_eq!(state.messages.version(), 2);
}

#[test]
fn plan_channel_is_last_write_wins() {
    let app = test_app();
    let mut state = VersionedState::default();

    let first = TaskPlan::from_descriptions("v1", ["a", "b"]);
    let second = TaskPlan::from_descriptions("v2", ["c"]);

    app.apply_update(
        &mut state,
        &NodeKind::Custom("n".into()),
        &NodePartial::new().with_plan(first),
    )
    .unwrap();
    app.apply_update(
        &mut state,
        &NodeKind::Custom("n".into()),
        &NodePartial::new().with_plan(second.clone()),
    )
    .unwrap();

    assert_eq!(state.plan.snapshot(), second);
    assert_eq!(state.plan.version(), 3);
}

#[test]
fn ledger_is_append_only() {
    let app = test_app();
    let mut state = VersionedState::default();

    for i in 0..3 {
        let partial = NodePartial::new().with_tokens(vec![TokenDataPoint::now(
            "m",
            i,
            i,
            format!("node-{i}"),
        )]);
        app.apply_update(&mut state, &NodeKind::Custom("n".into()), &partial)
            .unwrap();
    }
    assert_eq!(state.ledger.len(), 3);
    assert_eq!(state.ledger.get()[0].node, "node-0");
    assert_eq!(state.ledger.get()[2].node, "node-2");
}

#[test]
fn counters_merge_monotonically() {
    let app = test_app();
    let mut state = VersionedState::default();

    let mut up = new_counter_map();
    up.insert("revisions".to_string(), 3);
    app.apply_update(
        &mut state,
        &NodeKind::Custom("n".into()),
        &NodePartial::new().with_counters(up),
    )
    .unwrap();

    // A stale, lower value must not move the counter backwards.
    let mut stale = new_counter_map();
    stale.insert("revisions".to_string(), 1);
    let outcome = app
        .apply_update(
            &mut state,
            &NodeKind::Custom("n".into()),
            &NodePartial::new().with_counters(stale),
        )
        .unwrap();

    assert_eq!(state.counters.get().get("revisions"), Some(&3));
    assert!(outcome.updated_channels.is_empty());
}

#[test]
fn extra_merges_shallow_with_last_write_wins_per_key() {
    let app = test_app();
    let mut state = VersionedState::default();

    let mut first = new_extra_map();
    first.insert("keep".to_string(), serde_json::json!("old"));
    first.insert("replace".to_string(), serde_json::json!(1));
    app.apply_update(
        &mut state,
        &NodeKind::Custom("n".into()),
        &NodePartial::new().with_extra(first),
    )
    .unwrap();

    let mut second = new_extra_map();
    second.insert("replace".to_string(), serde_json::json!(2));
    app.apply_update(
        &mut state,
        &NodeKind::Custom("n".into()),
        &NodePartial::new().with_extra(second),
    )
    .unwrap();

    assert_eq!(state.extra.get().get("keep"), Some(&serde_json::json!("old")));
    assert_eq!(
        state.extra.get().get("replace"),
        Some(&serde_json::json!(2))
    );
}

#[test]
fn snapshot_is_independent_of_later_mutation() {
    let mut state = VersionedState::new_with_user_message("hello");
    let snapshot = state.snapshot();

    state.add_message("assistant", "later");
    state.add_extra("k", serde_json::json!("v"));

    assert_eq!(snapshot.messages.len(), 1);
    assert!(snapshot.extra.is_empty());
    assert_eq!(state.messages.len(), 2);
}

#[test]
fn plan_transitions_stay_monotonic_through_state() {
    let mut plan = TaskPlan::from_descriptions("t", ["one", "two"]);
    plan.start(0).unwrap();
    plan.complete(0, Some("did it".into())).unwrap();

    let state = VersionedState::builder().with_plan(plan).build();
    let snapshot = state.snapshot();
    assert_eq!(snapshot.plan.task(0).unwrap().status, TaskStatus::Completed);
    assert_eq!(
        snapshot.plan.task(0).unwrap().summary.as_deref(),
        Some("did it")
    );
    assert_eq!(snapshot.plan.next_pending().unwrap().id, 1);
}
