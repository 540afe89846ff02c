//! Graph compilation and structural validation.
//!
//! Wiring mistakes surface here, before any run starts, rather than as
//! runtime routing failures mid-task.

use miette::Diagnostic;
use thiserror::Error;

use crate::app::App;
use crate::types::NodeKind;

/// Structural errors detected at compile time.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    #[error("graph has no edge out of Start")]
    #[diagnostic(
        code(codeloom::graphs::missing_entry),
        help("Add an edge from NodeKind::Start to the first node of the workflow.")
    )]
    MissingEntry,

    #[error("edge references unregistered node: {kind}")]
    #[diagnostic(
        code(codeloom::graphs::unknown_node),
        help("Register the node with add_node before wiring edges to it.")
    )]
    UnknownNode { kind: NodeKind },

    #[error("edge out of End is not allowed")]
    #[diagnostic(code(codeloom::graphs::edge_from_end))]
    EdgeFromEnd,
}

impl super::builder::GraphBuilder {
    /// Compiles the graph into an executable application.
    ///
    /// Validates the wiring before anything executes:
    /// - at least one edge must leave `Start`
    /// - every edge endpoint must be a registered node or a virtual endpoint
    /// - no edge may leave `End`
    ///
    /// # Errors
    ///
    /// Returns [`GraphCompileError`] describing the first structural problem
    /// found.
    pub fn compile(self) -> Result<App, GraphCompileError> {
        let mut has_entry = false;
        for edge in &self.edges {
            if edge.from().is_end() {
                return Err(GraphCompileError::EdgeFromEnd);
            }
            if edge.from().is_start() {
                has_entry = true;
            }
            for endpoint in [edge.from(), edge.to()] {
                if endpoint.is_custom() && !self.nodes.contains_key(endpoint) {
                    return Err(GraphCompileError::UnknownNode {
                        kind: endpoint.clone(),
                    });
                }
            }
        }
        if !has_entry {
            return Err(GraphCompileError::MissingEntry);
        }

        let (nodes, edges, engine_config) = self.into_parts();
        Ok(App::from_parts(nodes, edges, engine_config))
    }
}
