//! Graph definition and compilation.
//!
//! The entry point is [`GraphBuilder`], a fluent builder for nodes and
//! edges that compiles into an executable [`App`](crate::app::App).
//!
//! # Routing model
//!
//! A run is a strictly sequential state machine: after a node returns, its
//! outgoing edges are evaluated **in registration order** and the first
//! whose predicate passes (unconditional edges always pass) selects the
//! single next node. No matching edge means the run terminates normally.
//! First-declared-wins makes routing deterministic even when several
//! predicates would match, so declare the most specific edges first.
//!
//! # Quick start
//!
//! ```
//! use codeloom::graphs::GraphBuilder;
//! use codeloom::types::NodeKind;
//! use codeloom::node::{Node, NodeContext, NodeStep, NodePartial, NodeError};
//! use codeloom::state::StateSnapshot;
//! use async_trait::async_trait;
//!
//! struct ProcessNode;
//!
//! #[async_trait]
//! impl Node for ProcessNode {
//!     async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeStep, NodeError> {
//!         Ok(NodePartial::default().into())
//!     }
//! }
//!
//! let app = GraphBuilder::new()
//!     .add_node(NodeKind::Custom("process".into()), ProcessNode)
//!     .add_edge(NodeKind::Start, NodeKind::Custom("process".into()))
//!     .add_edge(NodeKind::Custom("process".into()), NodeKind::End)
//!     .compile()
//!     .unwrap();
//! ```

mod builder;
mod compilation;
mod edges;

pub use builder::GraphBuilder;
pub use compilation::GraphCompileError;
pub use edges::{Edge, EdgePredicate};
