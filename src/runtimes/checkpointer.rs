//! Checkpoint persistence.
//!
//! A checkpoint captures everything needed to resume a run after a pause,
//! crash, or process restart: state, position, status, visit count, and any
//! pending interrupt. History is append-only, one checkpoint per step,
//! and fatal errors leave the last checkpoint intact for inspection and
//! resume tooling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::interrupts::HumanInterrupt;
use crate::runtimes::runner::{RunState, RunStatus};
use crate::state::VersionedState;
use crate::types::NodeKind;

/// Checkpoint store selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointerType {
    /// Volatile storage for tests and development.
    InMemory,
    /// Durable SQLite-backed persistence.
    #[cfg(feature = "sqlite")]
    Sqlite,
}

/// One persisted point in a run's history.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub run_id: String,
    pub step: u64,
    pub state: VersionedState,
    /// The node the run will execute next; `None` once terminal.
    pub current: Option<NodeKind>,
    pub status: RunStatus,
    /// Node visits consumed so far (recursion guard input).
    pub visits: u32,
    pub pending_interrupt: Option<HumanInterrupt>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Snapshot a run's persistable state.
    #[must_use]
    pub fn from_run(run_id: &str, run: &RunState) -> Self {
        Self {
            run_id: run_id.to_string(),
            step: run.step,
            state: run.state.clone(),
            current: run.current.clone(),
            status: run.status,
            visits: run.visits,
            pending_interrupt: run.pending_interrupt.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Errors raised by checkpoint stores.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    #[error("checkpoint backend error: {message}")]
    #[diagnostic(code(codeloom::checkpointer::backend))]
    Backend { message: String },

    #[error("checkpoint serialization error: {message}")]
    #[diagnostic(code(codeloom::checkpointer::serde))]
    Serde { message: String },
}

pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Pluggable checkpoint persistence.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Append a checkpoint to the run's history.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// The most recent checkpoint for a run, if any.
    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// Full step history for a run, oldest first.
    async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>>;
}

/// Volatile checkpointer for testing and development.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    checkpoints: Mutex<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        self.checkpoints
            .lock()
            .map_err(|_| CheckpointerError::Backend {
                message: "checkpoint map poisoned".into(),
            })?
            .entry(checkpoint.run_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .lock()
            .map_err(|_| CheckpointerError::Backend {
                message: "checkpoint map poisoned".into(),
            })?
            .get(run_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>> {
        Ok(self
            .checkpoints
            .lock()
            .map_err(|_| CheckpointerError::Backend {
                message: "checkpoint map poisoned".into(),
            })?
            .get(run_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Rebuild in-memory run state from a stored checkpoint.
#[must_use]
pub fn restore_run_state(checkpoint: &Checkpoint, config: super::runtime_config::RunConfig) -> RunState {
    RunState::restored(
        checkpoint.state.clone(),
        checkpoint.step,
        checkpoint.current.clone(),
        checkpoint.status,
        checkpoint.visits,
        checkpoint.pending_interrupt.clone(),
        config,
    )
}
