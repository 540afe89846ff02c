//! Role-specific stage graphs built atop the engine.
//!
//! Three graphs cooperate on one coding task:
//!
//! 1. **Manager** ([`manager::manager_graph`]) classifies the incoming
//!    request and records the routing decision.
//! 2. **Planner** ([`planner::planner_graph`]) produces the task plan and
//!    the run's initial token data.
//! 3. **Programmer** ([`programmer::programmer_graph`]) works through the
//!    plan task by task: the model proposes tool calls, approval-gated
//!    tools pause the run, results fold back into the conversation, and
//!    usage syncs to the tracker after every model turn.
//!
//! A caller chains them by feeding each stage's final state into the next
//! stage's run.

pub mod manager;
pub mod planner;
pub mod programmer;

pub use manager::manager_graph;
pub use planner::planner_graph;
pub use programmer::programmer_graph;

use std::sync::Arc;

use crate::llm::CompletionClient;
use crate::runtimes::runtime_config::EngineConfig;
use crate::tools::ToolRegistry;
use crate::tracker::UsageTracker;

/// Extra-channel key carrying the manager's routing decision.
pub const ROUTE_KEY: &str = "route";
/// Extra-channel key holding the tool call awaiting execution.
pub const PENDING_TOOL_KEY: &str = "pending_tool";
/// Counter tracking plan generations.
pub const PLAN_REVISIONS_COUNTER: &str = "plan_revisions";

/// Shared services injected into stage nodes at graph-build time.
///
/// Per-run data (config, secrets, workspace) arrives through the node
/// context instead; services here are process-wide and read-only.
#[derive(Clone)]
pub struct StageServices {
    /// Model API client.
    pub client: Arc<dyn CompletionClient>,
    /// Tool set available to the programmer.
    pub tools: ToolRegistry,
    /// Usage tracker for best-effort sync.
    pub tracker: Arc<dyn UsageTracker>,
    /// Engine configuration (model defaults, sandbox root, cipher key).
    pub engine: EngineConfig,
}

impl StageServices {
    #[must_use]
    pub fn new(
        client: Arc<dyn CompletionClient>,
        tools: ToolRegistry,
        tracker: Arc<dyn UsageTracker>,
        engine: EngineConfig,
    ) -> Self {
        Self {
            client,
            tools,
            tracker,
            engine,
        }
    }
}

/// A standalone usage-sync node for custom graphs: pushes the ledger to
/// the tracker best-effort and returns an empty update.
pub fn record_usage_node(services: StageServices) -> impl crate::node::Node {
    RecordUsage { services }
}

/// Best-effort push of the ledger to the external tracker, shared by the
/// planner and programmer graphs.
///
/// Never fails the run; skip conditions and error swallowing live in
/// [`crate::tracker::sync_usage`].
pub(crate) struct RecordUsage {
    pub(crate) services: StageServices,
}

#[async_trait::async_trait]
impl crate::node::Node for RecordUsage {
    async fn run(
        &self,
        snapshot: crate::state::StateSnapshot,
        ctx: crate::node::NodeContext,
    ) -> Result<crate::node::NodeStep, crate::node::NodeError> {
        crate::tracker::sync_usage(
            self.services.tracker.as_ref(),
            &ctx.config,
            &ctx.run_id,
            &snapshot.ledger,
        )
        .await;
        Ok(crate::node::NodePartial::default().into())
    }
}
