mod common;

use chrono::Utc;

use codeloom::interrupts::{
    ActionRequest, HumanInterrupt, InterruptCapabilities, InterruptStatus,
};
use codeloom::plan::TaskPlan;
use codeloom::runtimes::persistence::{from_json_str, to_json_string};
use codeloom::runtimes::{Checkpoint, PersistedCheckpoint, RunStatus};
use codeloom::state::VersionedState;
use codeloom::types::NodeKind;

fn sample_checkpoint() -> Checkpoint {
    let mut plan = TaskPlan::from_descriptions("title", ["one", "two"]);
    plan.start(0).unwrap();
    let mut state = VersionedState::builder()
        .with_user_message("fix it")
        .with_assistant_message("on it")
        .with_plan(plan)
        .build();
    state.add_extra("target_repository", serde_json::json!("acme/api"));

    Checkpoint {
        run_id: "run_test".into(),
        step: 4,
        state,
        current: Some(NodeKind::Custom("take-action".into())),
        status: RunStatus::Paused,
        visits: 7,
        pending_interrupt: Some(HumanInterrupt {
            id: "int_abc".into(),
            action_request: ActionRequest {
                action: "Approve Shell Command".into(),
                args: serde_json::json!({"command": "npm test", "workdir": "/repo"}),
            },
            capabilities: InterruptCapabilities::accept_or_ignore(),
            status: InterruptStatus::Pending,
        }),
        created_at: Utc::now(),
    }
}

#[test]
fn checkpoint_round_trips_through_json() {
    let checkpoint = sample_checkpoint();
    let persisted = PersistedCheckpoint::from(&checkpoint);
    let json = to_json_string(&persisted).unwrap();
    let reloaded: PersistedCheckpoint = from_json_str(&json).unwrap();
    let restored = Checkpoint::from(reloaded);

    assert_eq!(restored.run_id, checkpoint.run_id);
    assert_eq!(restored.step, 4);
    assert_eq!(restored.status, RunStatus::Paused);
    assert_eq!(restored.visits, 7);
    assert_eq!(restored.current, checkpoint.current);
    assert_eq!(restored.state, checkpoint.state);

    let interrupt = restored.pending_interrupt.unwrap();
    assert_eq!(interrupt.id, "int_abc");
    assert_eq!(interrupt.action_request.action, "Approve Shell Command");
    assert_eq!(
        interrupt.action_request.args["command"],
        serde_json::json!("npm test")
    );
    assert!(interrupt.capabilities.allow_accept);
    assert_eq!(interrupt.status, InterruptStatus::Pending);
}

#[test]
fn unknown_node_encoding_survives_as_custom() {
    assert_eq!(
        NodeKind::decode("SomethingNew"),
        NodeKind::Custom("SomethingNew".into())
    );
    let kind = NodeKind::Custom("generate-plan".into());
    assert_eq!(NodeKind::decode(&kind.encode()), kind);
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use codeloom::ratelimit::{RateCounter, RateStore, SqliteRateStore};
    use codeloom::runtimes::{Checkpointer, SqliteCheckpointer};

    async fn temp_checkpointer() -> (tempfile::TempDir, SqliteCheckpointer) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codeloom.db");
        std::fs::File::create(&path).unwrap();
        let cp = SqliteCheckpointer::connect(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        (dir, cp)
    }

    #[tokio::test]
    async fn sqlite_checkpointer_saves_and_restores() {
        let (_dir, checkpointer) = temp_checkpointer().await;
        let checkpoint = sample_checkpoint();

        checkpointer.save(checkpoint.clone()).await.unwrap();
        let mut later = checkpoint.clone();
        later.step = 5;
        later.status = RunStatus::Running;
        later.pending_interrupt = None;
        checkpointer.save(later).await.unwrap();

        let latest = checkpointer
            .load_latest("run_test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.step, 5);
        assert_eq!(latest.status, RunStatus::Running);
        assert_eq!(latest.state.messages.len(), 2);

        let history = checkpointer.history("run_test").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].step, 4);
        assert_eq!(history[0].status, RunStatus::Paused);

        assert!(checkpointer.load_latest("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_rate_store_round_trips_counters() {
        let (_dir, checkpointer) = temp_checkpointer().await;
        let store = SqliteRateStore::new(checkpointer.pool());

        assert!(store.load("user-a").await.unwrap().is_none());

        let counter = RateCounter {
            identity: "user-a".into(),
            count: 3,
            window_start: Utc::now(),
        };
        store.save(&counter).await.unwrap();

        let loaded = store.load("user-a").await.unwrap().unwrap();
        assert_eq!(loaded.identity, "user-a");
        assert_eq!(loaded.count, 3);

        // Upsert replaces.
        let bumped = RateCounter {
            count: 4,
            ..counter
        };
        store.save(&bumped).await.unwrap();
        assert_eq!(store.load("user-a").await.unwrap().unwrap().count, 4);
    }
}
