//! Node execution framework.
//!
//! This module provides the core abstractions for executable workflow nodes:
//! the [`Node`] trait, the execution context, partial state updates, and
//! node-level error handling.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::accounting::TokenDataPoint;
use crate::channels::errors::ErrorEvent;
use crate::event_bus::Event;
use crate::interrupts::{InterruptRequest, ResumeDecision};
use crate::message::Message;
use crate::plan::{PlanError, TaskPlan};
use crate::runtimes::runtime_config::RunConfig;
use crate::state::StateSnapshot;
use crate::types::NodeKind;

/// Core trait defining executable workflow nodes.
///
/// A node is a single unit of computation. It receives an immutable state
/// snapshot plus its execution context, performs its work, and either
/// returns a partial update or suspends the run for operator approval.
///
/// # Error Handling
///
/// 1. **Fatal errors**: return `Err(NodeError)`; the run is marked errored
///    and the previous checkpoint is preserved.
/// 2. **Recoverable failures** (a tool invocation that failed, a model reply
///    that did not parse): fold them into `NodePartial.errors` or a tool
///    message and return `Ok` so the agent can self-correct on the next
///    turn.
///
/// # Examples
///
/// ```rust,no_run
/// use codeloom::node::{Node, NodeContext, NodePartial, NodeStep, NodeError};
/// use codeloom::state::StateSnapshot;
/// use codeloom::message::Message;
/// use async_trait::async_trait;
///
/// struct Acknowledge;
///
/// #[async_trait]
/// impl Node for Acknowledge {
///     async fn run(&self, _: StateSnapshot, ctx: NodeContext) -> Result<NodeStep, NodeError> {
///         ctx.emit("ack", "request received")?;
///         Ok(NodePartial::new()
///             .with_messages(vec![Message::assistant("On it.")])
///             .into())
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute this node with the given state snapshot and context.
    async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext)
        -> Result<NodeStep, NodeError>;
}

/// What a node produced: either a state update to merge and route from, or
/// a suspension awaiting an operator decision.
///
/// Suspension is an ordinary return value, not an unwound exception; the run
/// manager checkpoints the state it already has and parks the run.
#[derive(Clone, Debug)]
pub enum NodeStep {
    /// Merge this partial update and continue via edge resolution.
    Continue(NodePartial),
    /// Pause the run and surface this interrupt to the caller.
    Suspend(InterruptRequest),
}

impl From<NodePartial> for NodeStep {
    fn from(partial: NodePartial) -> Self {
        NodeStep::Continue(partial)
    }
}

/// Execution context passed to nodes.
///
/// Carries the node's identity within the run, the step number, the run
/// configuration, and the event channel for observability.
#[derive(Clone)]
pub struct NodeContext {
    /// Identifier of the run this node executes within.
    pub run_id: String,
    /// Identifier of the executing node.
    pub node_id: String,
    /// Current step number within the run (1-based).
    pub step: u64,
    /// The run's configuration (mode, secrets, model overrides).
    pub config: Arc<RunConfig>,
    /// Channel for emitting events to the run's event bus.
    pub event_sender: flume::Sender<Event>,
    /// Present when this node previously suspended and the run was resumed:
    /// the resolved interrupt plus the operator's decision. The node acts on
    /// the decision instead of raising the interrupt again.
    pub resume: Option<ResumeDecision>,
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("node_id", &self.node_id)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl NodeContext {
    /// Emit a node-scoped event enriched with this context's metadata.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.event_sender
            .send(Event::node_message_with_meta(
                self.node_id.clone(),
                self.step,
                scope,
                message,
            ))
            .map_err(|_| NodeContextError::EventBusUnavailable)
    }
}

/// Partial state updates returned by node execution.
///
/// All fields are optional; a node updates only the channels it cares about.
/// The barrier merges partials atomically through the per-channel reducers,
/// so a node never observes a half-applied update.
#[derive(Clone, Debug, Default)]
pub struct NodePartial {
    /// Messages to append to the conversation.
    pub messages: Option<Vec<Message>>,
    /// Replacement task plan (last write wins).
    pub plan: Option<TaskPlan>,
    /// Token-usage data points to append to the ledger.
    pub tokens: Option<Vec<TokenDataPoint>>,
    /// Counter updates, merged by taking the maximum per key.
    pub counters: Option<FxHashMap<String, u64>>,
    /// Metadata to merge into the extra channel.
    pub extra: Option<FxHashMap<String, serde_json::Value>>,
    /// Errors to append to the error channel.
    pub errors: Option<Vec<ErrorEvent>>,
    /// Routing override: skip edge resolution and go straight to this node
    /// (or to [`NodeKind::End`] to finish the run).
    pub goto: Option<NodeKind>,
}

impl NodePartial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach messages to append.
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Attach a replacement plan.
    #[must_use]
    pub fn with_plan(mut self, plan: TaskPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Attach ledger entries to append.
    #[must_use]
    pub fn with_tokens(mut self, tokens: Vec<TokenDataPoint>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Attach counter updates.
    #[must_use]
    pub fn with_counters(mut self, counters: FxHashMap<String, u64>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Attach extra metadata.
    #[must_use]
    pub fn with_extra(mut self, extra: FxHashMap<String, serde_json::Value>) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Attach error events.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorEvent>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Override routing for this step.
    #[must_use]
    pub fn with_goto(mut self, target: NodeKind) -> Self {
        self.goto = Some(target);
        self
    }
}

/// Errors that can occur when using NodeContext methods.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeContextError {
    /// Event could not be sent because the event bus is gone.
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(codeloom::node::event_bus_unavailable),
        help("The event bus may be disconnected. Check run state.")
    )]
    EventBusUnavailable,
}

/// Fatal errors raised during node execution.
///
/// For recoverable failures that should be tracked without halting the run,
/// use `NodePartial.errors` instead.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state snapshot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(codeloom::node::missing_input),
        help("Check that the previous node produced the required data.")
    )]
    MissingInput { what: &'static str },

    /// External provider or service error.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(codeloom::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(codeloom::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(
        code(codeloom::node::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    /// An illegal task-plan mutation.
    #[error(transparent)]
    #[diagnostic(code(codeloom::node::plan))]
    Plan(#[from] PlanError),

    /// Secret resolution failed (missing key or corrupt envelope). Fatal:
    /// secrets are never silently dropped.
    #[error(transparent)]
    #[diagnostic(code(codeloom::node::secret))]
    Secret(#[from] crate::secrets::SecretError),

    /// The run's workspace could not be prepared. Distinct from tool
    /// failures during execution, which are recoverable and folded into
    /// state instead.
    #[error("workspace error: {0}")]
    #[diagnostic(code(codeloom::node::workspace))]
    Workspace(#[from] crate::tools::ToolError),

    /// Event bus communication error.
    #[error("event bus error: {0}")]
    #[diagnostic(code(codeloom::node::event_bus))]
    EventBus(#[from] NodeContextError),
}
