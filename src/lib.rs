//! # Codeloom: graph-driven orchestration for AI coding agents
//!
//! Codeloom runs multi-step coding tasks as a chain of cooperating stages
//! (routing, planning, programming) over a deterministic, resumable,
//! crash-recoverable workflow engine. Tools (file edits, searches, shell
//! commands) execute inside a per-run workspace, risky actions pause for
//! human approval, and token usage is accounted and reported to an
//! external tracker best-effort.
//!
//! ## Core Concepts
//!
//! - **Nodes**: async units of work consuming a state snapshot and
//!   producing a partial update, or suspending for operator approval
//! - **State**: versioned channels (messages, plan, ledger, counters,
//!   extra, errors), each with a declared merge rule
//! - **Graph**: declarative workflow wiring with first-declared-wins
//!   conditional edges
//! - **Runs**: strictly sequential state machines, checkpointed after
//!   every step, resumable across process restarts
//! - **Interrupts**: serializable approval records resolved by explicit
//!   operator decisions (accept / edit / ignore / respond)
//!
//! ## Building a Workflow
//!
//! ```
//! use codeloom::graphs::GraphBuilder;
//! use codeloom::node::{Node, NodeContext, NodeStep, NodePartial, NodeError};
//! use codeloom::message::Message;
//! use codeloom::state::StateSnapshot;
//! use codeloom::types::NodeKind;
//! use async_trait::async_trait;
//!
//! struct GreetingNode;
//!
//! #[async_trait]
//! impl Node for GreetingNode {
//!     async fn run(
//!         &self,
//!         _snapshot: StateSnapshot,
//!         _ctx: NodeContext,
//!     ) -> Result<NodeStep, NodeError> {
//!         Ok(NodePartial::new()
//!             .with_messages(vec![Message::assistant("Hello! Starting on it.")])
//!             .into())
//!     }
//! }
//!
//! let app = GraphBuilder::new()
//!     .add_node(NodeKind::Custom("greet".into()), GreetingNode)
//!     .add_edge(NodeKind::Start, NodeKind::Custom("greet".into()))
//!     .add_edge(NodeKind::Custom("greet".into()), NodeKind::End)
//!     .compile()
//!     .unwrap();
//! ```
//!
//! ## Running
//!
//! ```rust,no_run
//! # use codeloom::app::App;
//! use codeloom::runtimes::{RunManager, RunOutcome};
//! use codeloom::runtimes::runtime_config::RunConfig;
//! use codeloom::interrupts::Decision;
//! use codeloom::state::VersionedState;
//! # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
//! let mut manager = RunManager::new(app).await;
//! let run_id = manager
//!     .create_run(
//!         RunConfig::default(),
//!         VersionedState::new_with_user_message("Fix the flaky test"),
//!     )
//!     .await?;
//!
//! match manager.run_until_settled(&run_id).await? {
//!     RunOutcome::Completed(state) => {
//!         println!("done in {} messages", state.messages.len());
//!     }
//!     RunOutcome::Paused(interrupt) => {
//!         // Surface to an operator, then:
//!         manager.resume(&run_id, &interrupt.id, Decision::Accept).await?;
//!     }
//!     RunOutcome::Cancelled(_) => {}
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`message`] - Conversation message types
//! - [`state`] - Versioned state management and snapshots
//! - [`node`] - Node trait and execution primitives
//! - [`graphs`] - Workflow graph definition and compilation
//! - [`runtimes`] - Run manager, checkpointing, configuration
//! - [`interrupts`] - Human-approval protocol
//! - [`tools`] - Sandboxed/local tool execution
//! - [`secrets`] - Encrypted secret propagation
//! - [`accounting`] / [`tracker`] - Token ledger and external sync
//! - [`ratelimit`] - Per-identity run-creation gating
//! - [`stages`] - Manager, planner, and programmer graphs

pub mod accounting;
pub mod app;
pub mod channels;
pub mod event_bus;
pub mod graphs;
pub mod interrupts;
pub mod llm;
pub mod message;
pub mod node;
pub mod plan;
pub mod ratelimit;
pub mod reducers;
pub mod runtimes;
pub mod secrets;
pub mod stages;
pub mod state;
pub mod telemetry;
pub mod tools;
pub mod tracker;
pub mod types;
pub mod utils;
