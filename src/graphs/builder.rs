//! GraphBuilder implementation for constructing workflow graphs.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::edges::{Edge, EdgePredicate};
use crate::node::Node;
use crate::runtimes::runtime_config::EngineConfig;
use crate::types::NodeKind;

/// Builder for constructing workflow graphs with a fluent API.
///
/// Every graph must have at least one executable node, an edge out of
/// `NodeKind::Start` defining the entry point, and a path to `NodeKind::End`
/// (or an edge-less node, which terminates the run normally).
///
/// `Start` and `End` are virtual endpoints: they exist only for structural
/// definition and are never registered with [`add_node`](Self::add_node).
///
/// # Examples
///
/// ```
/// use codeloom::graphs::GraphBuilder;
/// use codeloom::types::NodeKind;
/// use std::sync::Arc;
///
/// # struct MyNode;
/// # #[async_trait::async_trait]
/// # impl codeloom::node::Node for MyNode {
/// #     async fn run(&self, _: codeloom::state::StateSnapshot, _: codeloom::node::NodeContext) -> Result<codeloom::node::NodeStep, codeloom::node::NodeError> {
/// #         Ok(codeloom::node::NodePartial::default().into())
/// #     }
/// # }
/// let app = GraphBuilder::new()
///     .add_node(NodeKind::Custom("classify".into()), MyNode)
///     .add_node(NodeKind::Custom("act".into()), MyNode)
///     .add_edge(NodeKind::Start, NodeKind::Custom("classify".into()))
///     // Conditional edges are tried first-declared-first:
///     .add_conditional_edge(
///         NodeKind::Custom("classify".into()),
///         NodeKind::Custom("act".into()),
///         Arc::new(|snapshot| !snapshot.plan.all_done()),
///     )
///     .add_edge(NodeKind::Custom("classify".into()), NodeKind::End)
///     .add_edge(NodeKind::Custom("act".into()), NodeKind::Custom("classify".into()))
///     .compile()
///     .unwrap();
/// ```
pub struct GraphBuilder {
    /// Registry of all nodes in the graph, keyed by their identifier.
    pub(crate) nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    /// All edges, in registration order.
    pub(crate) edges: Vec<Edge>,
    /// Engine configuration for the compiled application.
    pub(crate) engine_config: EngineConfig,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Creates a new, empty graph builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            edges: Vec::new(),
            engine_config: EngineConfig::default(),
        }
    }

    /// Adds a node to the graph.
    ///
    /// NOTE: `NodeKind::Start` and `NodeKind::End` are virtual structural
    /// endpoints. If either is passed here the registration is ignored with
    /// a warning; they are never executed.
    #[must_use]
    pub fn add_node(mut self, id: NodeKind, node: impl Node + 'static) -> Self {
        match id {
            NodeKind::Start | NodeKind::End => {
                tracing::warn!(
                    ?id,
                    "ignoring registration of virtual node kind (Start/End are virtual)"
                );
            }
            _ => {
                self.nodes.insert(id, Arc::new(node));
            }
        }
        self
    }

    /// Adds an unconditional edge between two nodes.
    ///
    /// Unconditional edges always match during routing, so an unconditional
    /// edge registered before a conditional one shadows it permanently, so
    /// declare guarded edges first.
    #[must_use]
    pub fn add_edge(mut self, from: NodeKind, to: NodeKind) -> Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    /// Adds a predicate-guarded edge.
    ///
    /// Edges out of a node are evaluated in the order they were registered;
    /// the first whose predicate passes selects the next node. When no edge
    /// matches, the run terminates normally.
    #[must_use]
    pub fn add_conditional_edge(
        mut self,
        from: NodeKind,
        to: NodeKind,
        predicate: EdgePredicate,
    ) -> Self {
        self.edges.push(Edge::conditional(from, to, predicate));
        self
    }

    /// Replaces the engine configuration for the compiled application.
    #[must_use]
    pub fn with_engine_config(mut self, engine_config: EngineConfig) -> Self {
        self.engine_config = engine_config;
        self
    }

    pub(crate) fn into_parts(self) -> (FxHashMap<NodeKind, Arc<dyn Node>>, Vec<Edge>, EngineConfig)
    {
        (self.nodes, self.edges, self.engine_config)
    }
}
