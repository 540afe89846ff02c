mod common;

use std::sync::Arc;

use common::*;
use codeloom::graphs::{EdgePredicate, GraphBuilder};
use codeloom::interrupts::{Decision, InterruptCapabilities};
use codeloom::runtimes::runtime_config::RunConfig;
use codeloom::runtimes::{
    InMemoryCheckpointer, RunManager, RunOutcome, RunStatus, RunnerError, StepResult,
};
use codeloom::state::VersionedState;
use codeloom::types::NodeKind;

fn custom(name: &str) -> NodeKind {
    NodeKind::Custom(name.to_string())
}

fn linear_app(engine: codeloom::runtimes::runtime_config::EngineConfig) -> codeloom::app::App {
    GraphBuilder::new()
        .add_node(custom("a"), SayNode("from a"))
        .add_node(custom("b"), SayNode("from b"))
        .add_edge(NodeKind::Start, custom("a"))
        .add_edge(custom("a"), custom("b"))
        .add_edge(custom("b"), NodeKind::End)
        .with_engine_config(engine)
        .compile()
        .unwrap()
}

#[tokio::test]
async fn linear_run_completes_with_ordered_messages() {
    let mut manager = RunManager::new(linear_app(test_engine())).await;
    let run_id = manager
        .create_run(
            RunConfig::default(),
            VersionedState::new_with_user_message("go"),
        )
        .await
        .unwrap();

    let outcome = manager.run_until_settled(&run_id).await.unwrap();
    let RunOutcome::Completed(state) = outcome else {
        panic!("expected completion");
    };
    let contents: Vec<&str> = state
        .messages
        .get()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["go", "from a", "from b"]);
    assert_eq!(
        manager.view(&run_id).unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn self_loop_hits_recursion_limit_within_one_visit() {
    let engine = test_engine().with_recursion_limit(10);
    let app = GraphBuilder::new()
        .add_node(custom("loop"), NoopNode)
        .add_edge(NodeKind::Start, custom("loop"))
        .add_edge(custom("loop"), custom("loop"))
        .with_engine_config(engine)
        .compile()
        .unwrap();

    let mut manager = RunManager::new(app).await;
    let run_id = manager
        .create_run(
            RunConfig::default(),
            VersionedState::new_with_user_message("spin"),
        )
        .await
        .unwrap();

    let err = manager.run_until_settled(&run_id).await.err().unwrap();
    assert!(matches!(
        err,
        RunnerError::RecursionLimitExceeded { limit: 10 }
    ));
    let run = manager.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Errored);
    // The guard fires on the visit after the ceiling, never later.
    assert_eq!(run.visits, 11);
}

#[tokio::test]
async fn per_run_recursion_limit_overrides_engine_default() {
    let app = GraphBuilder::new()
        .add_node(custom("loop"), NoopNode)
        .add_edge(NodeKind::Start, custom("loop"))
        .add_edge(custom("loop"), custom("loop"))
        .with_engine_config(test_engine())
        .compile()
        .unwrap();

    let mut manager = RunManager::new(app).await;
    let config = RunConfig {
        recursion_limit: Some(3),
        ..RunConfig::default()
    };
    let run_id = manager
        .create_run(config, VersionedState::new_with_user_message("spin"))
        .await
        .unwrap();

    let err = manager.run_until_settled(&run_id).await.err().unwrap();
    assert!(matches!(
        err,
        RunnerError::RecursionLimitExceeded { limit: 3 }
    ));
}

#[tokio::test]
async fn node_failure_marks_run_errored_and_keeps_checkpoint() {
    let checkpointer: Arc<InMemoryCheckpointer> = Arc::new(InMemoryCheckpointer::new());
    let app = GraphBuilder::new()
        .add_node(custom("ok"), SayNode("fine"))
        .add_node(custom("boom"), FailingNode)
        .add_edge(NodeKind::Start, custom("ok"))
        .add_edge(custom("ok"), custom("boom"))
        .with_engine_config(test_engine())
        .compile()
        .unwrap();

    let mut manager = RunManager::with_checkpointer(app, checkpointer.clone(), true);
    let run_id = manager
        .create_run(
            RunConfig::default(),
            VersionedState::new_with_user_message("go"),
        )
        .await
        .unwrap();

    let err = manager.run_until_settled(&run_id).await.err().unwrap();
    assert!(matches!(err, RunnerError::Node { .. }));
    assert_eq!(manager.get_run(&run_id).unwrap().status, RunStatus::Errored);

    // History is append-only and the failure is recorded in state.
    use codeloom::runtimes::Checkpointer;
    let history = checkpointer.history(&run_id).await.unwrap();
    assert!(history.len() >= 2);
    let latest = history.last().unwrap();
    assert_eq!(latest.status, RunStatus::Errored);
    use codeloom::channels::Channel;
    assert_eq!(latest.state.errors.len(), 1);
}

#[tokio::test]
async fn resuming_a_running_run_is_rejected_without_mutation() {
    let mut manager = RunManager::new(linear_app(test_engine())).await;
    let run_id = manager
        .create_run(
            RunConfig::default(),
            VersionedState::new_with_user_message("go"),
        )
        .await
        .unwrap();

    let before = manager.view(&run_id).unwrap();
    let err = manager
        .resume(&run_id, "int_nope", Decision::Accept)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RunnerError::NotPaused { .. }));

    let after = manager.view(&run_id).unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(
        after.snapshot.messages.len(),
        before.snapshot.messages.len()
    );
}

#[tokio::test]
async fn resume_with_wrong_interrupt_id_is_rejected() {
    let app = GraphBuilder::new()
        .add_node(
            custom("gate"),
            ApprovalNode {
                capabilities: InterruptCapabilities::accept_or_ignore(),
            },
        )
        .add_edge(NodeKind::Start, custom("gate"))
        .add_edge(custom("gate"), NodeKind::End)
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
    let RunOutcome::Paused(interrupt) = manager.run_until_settled(&run_id).await.unwrap() else {
        panic!("expected pause");
    };

    let err = manager
        .resume(&run_id, "int_other", Decision::Accept)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RunnerError::UnknownInterrupt { .. }));

    // The real interrupt still resumes fine afterwards.
    let outcome = manager
        .resume(&run_id, &interrupt.id, Decision::Accept)
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
}

#[tokio::test]
async fn cancellation_applies_between_node_executions() {
    let mut manager = RunManager::new(linear_app(test_engine())).await;
    let run_id = manager
        .create_run(
            RunConfig::default(),
            VersionedState::new_with_user_message("go"),
        )
        .await
        .unwrap();

    // Execute one node, then cancel before the next.
    let step = manager.run_step(&run_id).await.unwrap();
    assert!(matches!(step, StepResult::Advanced(_)));
    manager.cancel(&run_id).await.unwrap();

    let outcome = manager.run_until_settled(&run_id).await.unwrap();
    let RunOutcome::Cancelled(state) = outcome else {
        panic!("expected cancellation");
    };
    // Only the first node's update was merged; nothing half-applied.
    let contents: Vec<&str> = state
        .messages
        .get()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["go", "from a"]);
}

#[tokio::test]
async fn paused_run_restores_from_checkpoint_in_new_manager() {
    let checkpointer: Arc<InMemoryCheckpointer> = Arc::new(InMemoryCheckpointer::new());
    let build = || {
        GraphBuilder::new()
            .add_node(
                custom("gate"),
                ApprovalNode {
                    capabilities: InterruptCapabilities::accept_or_ignore(),
                },
            )
            .add_node(custom("after"), SayNode("resumed"))
            .add_edge(NodeKind::Start, custom("gate"))
            .add_edge(custom("gate"), custom("after"))
            .add_edge(custom("after"), NodeKind::End)
            .with_engine_config(test_engine())
            .compile()
            .unwrap()
    };

    let mut first = RunManager::with_checkpointer(build(), checkpointer.clone(), true);
    let run_id = first
        .create_run(
            RunConfig::default(),
            VersionedState::new_with_user_message("go"),
        )
        .await
        .unwrap();
    let RunOutcome::Paused(interrupt) = first.run_until_settled(&run_id).await.unwrap() else {
        panic!("expected pause");
    };
    drop(first);

    // Simulated restart: fresh manager over the same store.
    let mut second = RunManager::with_checkpointer(build(), checkpointer, true);
    let status = second
        .restore_run(&run_id, RunConfig::default())
        .await
        .unwrap();
    assert_eq!(status, RunStatus::Paused);
    let view = second.view(&run_id).unwrap();
    assert_eq!(
        view.pending_interrupt.as_ref().map(|i| i.id.as_str()),
        Some(interrupt.id.as_str())
    );

    let outcome = second
        .resume(&run_id, &interrupt.id, Decision::Accept)
        .await
        .unwrap();
    let RunOutcome::Completed(state) = outcome else {
        panic!("expected completion");
    };
    assert!(state
        .messages
        .get()
        .iter()
        .any(|m| m.content == "resumed"));
}

#[tokio::test]
async fn step_stream_is_finite_and_ordered() {
    let mut manager = RunManager::new(linear_app(test_engine())).await;
    let run_id = manager
        .create_run(
            RunConfig::default(),
            VersionedState::new_with_user_message("go"),
        )
        .await
        .unwrap();

    let stream = manager.step_stream(&run_id).unwrap();
    manager.run_until_settled(&run_id).await.unwrap();

    let reports: Vec<_> = stream.into_iter().collect();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].node, custom("a"));
    assert_eq!(reports[1].node, custom("b"));
    assert!(reports[1].completed);
    assert!(!reports[0].completed);
}
