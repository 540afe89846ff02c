use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::channels::Channel;
use crate::graphs::Edge;
use crate::node::{Node, NodePartial};
use crate::reducers::{ReducerError, ReducerRegistry};
use crate::runtimes::runner::{RunManager, RunOutcome, RunnerError};
use crate::runtimes::runtime_config::{EngineConfig, RunConfig};
use crate::state::{StateSnapshot, VersionedState};
use crate::types::NodeKind;
use tracing::instrument;

/// A compiled workflow graph: node registry, ordered edges, and the reducer
/// registry that merges node updates at the barrier between steps.
///
/// `App` is the immutable product of
/// [`GraphBuilder::compile`](crate::graphs::GraphBuilder::compile); the
/// mutable execution environment around it (runs, checkpoints, interrupts)
/// lives in [`RunManager`].
///
/// # Examples
///
/// ```rust,no_run
/// use codeloom::graphs::GraphBuilder;
/// use codeloom::runtimes::runtime_config::RunConfig;
/// use codeloom::state::VersionedState;
/// use codeloom::types::NodeKind;
/// # struct MyNode;
/// # #[async_trait::async_trait]
/// # impl codeloom::node::Node for MyNode {
/// #     async fn run(&self, _: codeloom::state::StateSnapshot, _: codeloom::node::NodeContext) -> Result<codeloom::node::NodeStep, codeloom::node::NodeError> {
/// #         Ok(codeloom::node::NodePartial::default().into())
/// #     }
/// # }
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = GraphBuilder::new()
///     .add_node(NodeKind::Custom("process".into()), MyNode)
///     .add_edge(NodeKind::Start, NodeKind::Custom("process".into()))
///     .add_edge(NodeKind::Custom("process".into()), NodeKind::End)
///     .compile()?;
///
/// let initial = VersionedState::new_with_user_message("Hello");
/// let (run_id, outcome) = app.invoke(initial, RunConfig::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct App {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: Vec<Edge>,
    reducer_registry: ReducerRegistry,
    engine_config: EngineConfig,
}

/// Result of merging one node's partial update into state.
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    /// Channel identifiers whose content changed during the merge.
    pub updated_channels: Vec<&'static str>,
    /// Routing override requested by the node, if any.
    pub goto: Option<NodeKind>,
}

impl App {
    /// Internal (crate) factory keeping nodes/edges private.
    pub(crate) fn from_parts(
        nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
        edges: Vec<Edge>,
        engine_config: EngineConfig,
    ) -> Self {
        App {
            nodes,
            edges,
            reducer_registry: ReducerRegistry::default(),
            engine_config,
        }
    }

    /// The node registry, keyed by `NodeKind`.
    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<NodeKind, Arc<dyn Node>> {
        &self.nodes
    }

    /// All edges in registration order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The engine configuration this graph was compiled with.
    #[must_use]
    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    /// Resolve the next node after `from`, evaluating that node's outgoing
    /// edges in registration order. The first edge whose predicate passes
    /// wins; `None` means normal termination.
    #[must_use]
    pub fn resolve_next(&self, from: &NodeKind, snapshot: &StateSnapshot) -> Option<NodeKind> {
        self.edges
            .iter()
            .filter(|edge| edge.from() == from)
            .find(|edge| edge.matches(snapshot))
            .map(|edge| edge.to().clone())
    }

    /// Convenience: run this graph to its first settled outcome (completion
    /// or pending interrupt) on a throwaway [`RunManager`].
    ///
    /// Interactive flows that need resume, cancellation, or streaming should
    /// construct a `RunManager` directly so the run survives past this call.
    #[instrument(skip(self, initial_state, config), err)]
    pub async fn invoke(
        &self,
        initial_state: VersionedState,
        config: RunConfig,
    ) -> Result<(String, RunOutcome), RunnerError> {
        let mut manager = RunManager::new(self.clone()).await;
        let run_id = manager.create_run(config, initial_state).await?;
        let outcome = manager.run_until_settled(&run_id).await?;
        Ok((run_id, outcome))
    }

    /// Merge a node's partial update into `state` through the per-channel
    /// reducers, bumping each channel's version only when its content
    /// actually changed.
    ///
    /// The caller applies this to a scratch clone and swaps on success, so a
    /// failed merge (or a cancellation between steps) never leaves state
    /// half-updated.
    #[instrument(skip(self, state, partial), err)]
    pub fn apply_update(
        &self,
        state: &mut VersionedState,
        node: &NodeKind,
        partial: &NodePartial,
    ) -> Result<UpdateOutcome, ReducerError> {
        // Record before-states for version bump decisions.
        let msgs_before_len = state.messages.len();
        let msgs_before_ver = state.messages.version();
        let plan_before = state.plan.snapshot();
        let plan_before_ver = state.plan.version();
        let ledger_before_len = state.ledger.len();
        let ledger_before_ver = state.ledger.version();
        let counters_before = state.counters.snapshot();
        let counters_before_ver = state.counters.version();
        let extra_before = state.extra.snapshot();
        let extra_before_ver = state.extra.version();
        let errors_before_len = state.errors.len();
        let errors_before_ver = state.errors.version();

        // Apply reducers (they do NOT bump versions).
        self.reducer_registry.apply_all(state, partial)?;

        let mut updated: Vec<&'static str> = Vec::new();

        if state.messages.len() != msgs_before_len {
            state.messages.set_version(msgs_before_ver.saturating_add(1));
            updated.push("messages");
        }
        if state.plan.snapshot() != plan_before {
            state.plan.set_version(plan_before_ver.saturating_add(1));
            updated.push("plan");
        }
        if state.ledger.len() != ledger_before_len {
            state
                .ledger
                .set_version(ledger_before_ver.saturating_add(1));
            updated.push("ledger");
        }
        if state.counters.snapshot() != counters_before {
            state
                .counters
                .set_version(counters_before_ver.saturating_add(1));
            updated.push("counters");
        }
        if state.extra.snapshot() != extra_before {
            state.extra.set_version(extra_before_ver.saturating_add(1));
            updated.push("extra");
        }
        if state.errors.len() != errors_before_len {
            state
                .errors
                .set_version(errors_before_ver.saturating_add(1));
            updated.push("errors");
        }

        if !updated.is_empty() {
            tracing::debug!(
                target: "codeloom::app",
                node = %node,
                channels = ?updated,
                "channels updated"
            );
        }

        Ok(UpdateOutcome {
            updated_channels: updated,
            goto: partial.goto.clone(),
        })
    }
}
