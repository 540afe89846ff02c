//! Edge types and routing predicates.

use crate::state::StateSnapshot;
use crate::types::NodeKind;
use std::sync::Arc;

/// Predicate deciding whether an edge matches the current state.
///
/// Evaluated against the post-merge [`StateSnapshot`] after the source node
/// completes. Used with
/// [`GraphBuilder::add_conditional_edge`](super::GraphBuilder::add_conditional_edge).
///
/// # Examples
///
/// ```
/// use codeloom::graphs::EdgePredicate;
/// use std::sync::Arc;
///
/// // Match while the plan still has unfinished work.
/// let has_work: EdgePredicate = Arc::new(|snapshot| !snapshot.plan.all_done());
/// ```
pub type EdgePredicate = Arc<dyn Fn(&StateSnapshot) -> bool + Send + Sync + 'static>;

/// A directed edge, optionally guarded by a predicate.
///
/// Edges without a predicate always match. Edges are evaluated in the order
/// they were registered on the builder; the first match wins.
#[derive(Clone)]
pub struct Edge {
    from: NodeKind,
    to: NodeKind,
    predicate: Option<EdgePredicate>,
}

impl Edge {
    /// An unconditional edge.
    pub fn new(from: impl Into<NodeKind>, to: impl Into<NodeKind>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            predicate: None,
        }
    }

    /// A predicate-guarded edge.
    pub fn conditional(
        from: impl Into<NodeKind>,
        to: impl Into<NodeKind>,
        predicate: EdgePredicate,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            predicate: Some(predicate),
        }
    }

    /// The source node of this edge.
    pub fn from(&self) -> &NodeKind {
        &self.from
    }

    /// The target node of this edge.
    pub fn to(&self) -> &NodeKind {
        &self.to
    }

    /// Whether this edge matches the given snapshot.
    #[must_use]
    pub fn matches(&self, snapshot: &StateSnapshot) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(snapshot),
            None => true,
        }
    }

    /// Whether this edge carries a predicate.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.predicate.is_some()
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("conditional", &self.predicate.is_some())
            .finish()
    }
}
