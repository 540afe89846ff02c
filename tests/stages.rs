mod common;

use std::sync::Arc;

use common::*;
use serde_json::json;
use tempfile::tempdir;

use codeloom::channels::Channel;
use codeloom::interrupts::Decision;
use codeloom::message::Message;
use codeloom::plan::{TaskPlan, TaskStatus};
use codeloom::runtimes::runtime_config::{EngineConfig, RunConfig, RunMode};
use codeloom::runtimes::{RunManager, RunOutcome, RunStatus};
use codeloom::stages::{manager_graph, planner_graph, programmer_graph, StageServices};
use codeloom::state::VersionedState;
use codeloom::tools::ToolRegistry;
use codeloom::tracker::TrackerRef;

fn sandbox_engine(root: &std::path::Path) -> EngineConfig {
    let mut engine = test_engine();
    engine.sandbox_root = root.to_path_buf();
    engine
}

fn services(client: ScriptedClient, tracker: RecordingTracker, engine: EngineConfig) -> StageServices {
    StageServices::new(
        Arc::new(client),
        ToolRegistry::standard(),
        Arc::new(tracker),
        engine,
    )
}

fn tracked_sandboxed_config() -> RunConfig {
    RunConfig {
        mode: RunMode::Sandboxed,
        tracker: Some(TrackerRef {
            endpoint: "http://tracker.test".into(),
            tracker_id: "issue-7".into(),
        }),
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn manager_classifies_and_records_usage() {
    let client = ScriptedClient::new(vec![ScriptedClient::text("plan")]);
    let tracker = RecordingTracker::default();
    let app = manager_graph(services(client, tracker, test_engine())).unwrap();

    let mut manager = RunManager::new(app).await;
    let run_id = manager
        .create_run(
            RunConfig::default(),
            VersionedState::new_with_user_message("add a retry helper"),
        )
        .await
        .unwrap();
    let RunOutcome::Completed(state) = manager.run_until_settled(&run_id).await.unwrap() else {
        panic!("expected completion");
    };

    assert_eq!(
        state.extra.get().get("route"),
        Some(&serde_json::json!("planner"))
    );
    assert_eq!(state.ledger.len(), 1);
    assert_eq!(state.ledger.get()[0].node, "classify-request");
}

#[tokio::test]
async fn planner_produces_plan_and_syncs_ledger() {
    let client = ScriptedClient::new(vec![ScriptedClient::text(
        "- reproduce the bug\n- fix the race\n- run the suite",
    )]);
    let tracker = RecordingTracker::default();
    let app = planner_graph(services(client, tracker.clone(), test_engine())).unwrap();

    let mut manager = RunManager::new(app).await;
    let run_id = manager
        .create_run(
            tracked_sandboxed_config(),
            VersionedState::new_with_user_message("fix the flaky watcher test"),
        )
        .await
        .unwrap();
    let RunOutcome::Completed(state) = manager.run_until_settled(&run_id).await.unwrap() else {
        panic!("expected completion");
    };

    let plan = state.plan.snapshot();
    assert_eq!(plan.tasks.len(), 3);
    assert!(plan.tasks.iter().all(|t| t.status == TaskStatus::Pending));
    assert_eq!(plan.tasks[1].description, "fix the race");

    assert_eq!(state.ledger.len(), 1);
    assert_eq!(state.counters.get().get("plan_revisions"), Some(&1));

    let pushes = tracker.pushes.lock().unwrap();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0], ("issue-7".to_string(), 1));
}

#[tokio::test]
async fn programmer_pauses_for_shell_approval_then_works_through_the_plan() {
    let sandbox = tempdir().unwrap();
    let client = ScriptedClient::new(vec![
        ScriptedClient::tool_call(
            "Running the test suite first.",
            "shell",
            json!({"command": "echo tests passed"}),
        ),
        ScriptedClient::text("Task one complete."),
        ScriptedClient::text("Task two complete."),
    ]);
    let tracker = RecordingTracker::default();
    let app =
        programmer_graph(services(client, tracker.clone(), sandbox_engine(sandbox.path())))
            .unwrap();

    let plan = TaskPlan::from_descriptions("fix the build", ["run the tests", "commit the fix"]);
    let initial = VersionedState::builder()
        .with_user_message("fix the build")
        .with_plan(plan)
        .build();

    let mut manager = RunManager::new(app).await;
    let run_id = manager
        .create_run(tracked_sandboxed_config(), initial)
        .await
        .unwrap();

    // The first tool call is shell, which is allow-listed: the run pauses
    // with a structured approval request.
    let RunOutcome::Paused(interrupt) = manager.run_until_settled(&run_id).await.unwrap() else {
        panic!("expected approval pause");
    };
    assert_eq!(interrupt.action_request.action, "Approve Shell Command");
    assert_eq!(
        interrupt.action_request.args,
        json!({"command": "echo tests passed"})
    );
    assert!(interrupt.capabilities.allow_accept);
    assert!(interrupt.capabilities.allow_ignore);
    assert!(!interrupt.capabilities.allow_edit);
    assert_eq!(manager.view(&run_id).unwrap().status, RunStatus::Paused);

    // Accept: the command executes, its result lands in the conversation,
    // task 1 completes, and the run advances through task 2 to the end.
    let RunOutcome::Completed(state) = manager
        .resume(&run_id, &interrupt.id, Decision::Accept)
        .await
        .unwrap()
    else {
        panic!("expected completion after approval");
    };

    let shell_result = state
        .messages
        .get()
        .iter()
        .find(|m| m.has_role(Message::TOOL))
        .expect("shell result message");
    assert!(shell_result.content.contains("exit code: 0"));
    assert!(shell_result.content.contains("tests passed"));

    let plan = state.plan.snapshot();
    assert!(plan.all_done());
    assert_eq!(plan.task(0).unwrap().status, TaskStatus::Completed);
    assert_eq!(
        plan.task(0).unwrap().summary.as_deref(),
        Some("Task one complete.")
    );
    assert_eq!(plan.task(1).unwrap().status, TaskStatus::Completed);

    // Three model turns happened across the pause/resume cycle; the ledger
    // holds exactly three entries: append-only, no lost updates.
    assert_eq!(state.ledger.len(), 3);

    // Usage synced after each model turn.
    let pushes = tracker.pushes.lock().unwrap();
    assert_eq!(pushes.len(), 3);
    assert_eq!(pushes.last().unwrap().1, 3);
}

#[tokio::test]
async fn ignored_shell_command_is_skipped_with_a_placeholder_result() {
    let sandbox = tempdir().unwrap();
    let client = ScriptedClient::new(vec![
        ScriptedClient::tool_call("Trying a command.", "shell", json!({"command": "echo hi"})),
        ScriptedClient::text("Worked around it."),
    ]);
    let tracker = RecordingTracker::default();
    let app =
        programmer_graph(services(client, tracker, sandbox_engine(sandbox.path()))).unwrap();

    let initial = VersionedState::builder()
        .with_user_message("do the thing")
        .with_plan(TaskPlan::from_descriptions("t", ["only task"]))
        .build();

    let mut manager = RunManager::new(app).await;
    let run_id = manager
        .create_run(tracked_sandboxed_config(), initial)
        .await
        .unwrap();
    let RunOutcome::Paused(interrupt) = manager.run_until_settled(&run_id).await.unwrap() else {
        panic!("expected pause");
    };

    let RunOutcome::Completed(state) = manager
        .resume(&run_id, &interrupt.id, Decision::Ignore)
        .await
        .unwrap()
    else {
        panic!("expected completion");
    };

    let tool_msg = state
        .messages
        .get()
        .iter()
        .find(|m| m.has_role(Message::TOOL))
        .expect("placeholder tool message");
    assert_eq!(tool_msg.content, "Tool execution skipped by operator.");
    // The command never ran: no echo output anywhere in the conversation.
    assert!(!state
        .messages
        .get()
        .iter()
        .any(|m| m.content.contains("exit code")));
}

#[tokio::test]
async fn non_allow_listed_tools_execute_without_pausing() {
    let sandbox = tempdir().unwrap();
    let client = ScriptedClient::new(vec![
        ScriptedClient::tool_call(
            "Writing the file.",
            "write_file",
            json!({"path": "hello.txt", "content": "hi"}),
        ),
        ScriptedClient::text("Done."),
    ]);
    let tracker = RecordingTracker::default();
    let app =
        programmer_graph(services(client, tracker, sandbox_engine(sandbox.path()))).unwrap();

    let initial = VersionedState::builder()
        .with_user_message("write hello.txt")
        .with_plan(TaskPlan::from_descriptions("t", ["write the file"]))
        .build();

    let mut manager = RunManager::new(app).await;
    let run_id = manager
        .create_run(tracked_sandboxed_config(), initial)
        .await
        .unwrap();

    // No pause: write_file is not on the approval allow-list.
    let RunOutcome::Completed(state) = manager.run_until_settled(&run_id).await.unwrap() else {
        panic!("expected completion without pause");
    };
    assert!(state
        .messages
        .get()
        .iter()
        .any(|m| m.has_role(Message::TOOL) && m.content.contains("hello.txt")));
}

#[tokio::test]
async fn failing_tool_is_recoverable_and_the_run_continues() {
    let sandbox = tempdir().unwrap();
    let client = ScriptedClient::new(vec![
        ScriptedClient::tool_call(
            "Reading a file that is not there.",
            "read_file",
            json!({"path": "missing.txt"}),
        ),
        ScriptedClient::text("Recovered; nothing to read."),
    ]);
    let tracker = RecordingTracker::default();
    let app =
        programmer_graph(services(client, tracker, sandbox_engine(sandbox.path()))).unwrap();

    let initial = VersionedState::builder()
        .with_user_message("read it")
        .with_plan(TaskPlan::from_descriptions("t", ["read the file"]))
        .build();

    let mut manager = RunManager::new(app).await;
    let run_id = manager
        .create_run(tracked_sandboxed_config(), initial)
        .await
        .unwrap();
    let RunOutcome::Completed(state) = manager.run_until_settled(&run_id).await.unwrap() else {
        panic!("expected completion despite tool failure");
    };

    // The failure became a tool message plus an error event; the run
    // finished normally.
    assert!(state
        .messages
        .get()
        .iter()
        .any(|m| m.has_role(Message::TOOL) && m.content.contains("tool execution failed")));
    assert_eq!(state.errors.len(), 1);
    assert!(state.plan.snapshot().all_done());
}
