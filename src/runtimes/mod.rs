//! Runtime infrastructure: run management, checkpointing, configuration.
//!
//! The runtime layer abstracts over persistence backends while keeping one
//! API for run execution:
//!
//! - **[`RunManager`]**: orchestrator for stepwise, resumable execution
//! - **[`Checkpointer`]**: pluggable state persistence
//! - **[`RunConfig`] / [`EngineConfig`]**: per-run and process-wide
//!   configuration
//!
//! # Usage
//!
//! ```rust,no_run
//! use codeloom::runtimes::{RunManager, RunOutcome};
//! use codeloom::runtimes::runtime_config::RunConfig;
//! use codeloom::state::VersionedState;
//! # use codeloom::app::App;
//! # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
//! let mut manager = RunManager::new(app).await;
//! let run_id = manager
//!     .create_run(RunConfig::default(), VersionedState::new_with_user_message("Hello"))
//!     .await?;
//! match manager.run_until_settled(&run_id).await? {
//!     RunOutcome::Completed(state) => println!("{} messages", state.messages.len()),
//!     RunOutcome::Paused(interrupt) => println!("awaiting approval: {}", interrupt.action_request.action),
//!     RunOutcome::Cancelled(_) => println!("cancelled"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod checkpointer;
#[cfg(feature = "sqlite")]
pub mod checkpointer_sqlite;
pub mod persistence;
pub mod runner;
pub mod runtime_config;
pub mod types;

pub use checkpointer::{
    restore_run_state, Checkpoint, Checkpointer, CheckpointerError, CheckpointerType,
    InMemoryCheckpointer,
};
#[cfg(feature = "sqlite")]
pub use checkpointer_sqlite::SqliteCheckpointer;
pub use persistence::{PersistedCheckpoint, PersistedState, PersistenceError};
pub use runner::{
    CancelHandle, RunManager, RunOutcome, RunState, RunStatus, RunView, RunnerError, StepReport,
    StepResult,
};
pub use runtime_config::{EngineConfig, ModelDefaults, ModelOverrides, ModelRole, RunConfig, RunMode};
pub use types::{RunId, StepNumber};
