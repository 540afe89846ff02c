//! Core identifier types for the codeloom workflow engine.
//!
//! This module defines the fundamental types used throughout the system for
//! identifying nodes and channels in workflow graphs. These are the core
//! domain concepts that define what a workflow *is*.
//!
//! For runtime execution types (run ids, step numbers), see
//! [`crate::runtimes::types`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within a workflow graph.
///
/// `NodeKind` serves as a unique identifier for nodes in the workflow
/// execution graph. It provides special handling for the virtual entry and
/// exit points (`Start`/`End`) while allowing arbitrary custom node names
/// through the `Custom` variant.
///
/// # Persistence
///
/// `NodeKind` supports serialization for checkpointing through both serde
/// and the [`encode`](Self::encode)/[`decode`](Self::decode) methods.
///
/// # Examples
///
/// ```
/// use codeloom::types::NodeKind;
///
/// let planner = NodeKind::Custom("generate-plan".to_string());
/// let encoded = planner.encode();
/// assert_eq!(encoded, "Custom:generate-plan");
/// assert_eq!(NodeKind::decode(&encoded), planner);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Virtual entry point. Never registered or executed; the edge out of
    /// `Start` selects the first real node of a run.
    Start,

    /// Virtual terminal node. Routing to `End` completes the run.
    End,

    /// Custom node identified by a user-defined string.
    ///
    /// The string should be descriptive and unique within the workflow.
    Custom(String),
}

impl NodeKind {
    /// Encode a NodeKind into its persisted string form.
    ///
    /// - `Start` → `"Start"`
    /// - `End` → `"End"`
    /// - `Custom("X")` → `"Custom:X"`
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Start => "Start".to_string(),
            NodeKind::End => "End".to_string(),
            NodeKind::Custom(s) => format!("Custom:{s}"),
        }
    }

    /// Decode a persisted string form back into a NodeKind.
    ///
    /// Falls back to `Custom(s)` for any unrecognized format, so older
    /// checkpoints keep loading after renames.
    pub fn decode(s: &str) -> Self {
        if s == "Start" {
            NodeKind::Start
        } else if s == "End" {
            NodeKind::End
        } else if let Some(rest) = s.strip_prefix("Custom:") {
            NodeKind::Custom(rest.to_string())
        } else {
            NodeKind::Custom(s.to_string())
        }
    }

    /// Returns `true` if this is the virtual [`Start`](Self::Start) node.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    /// Returns `true` if this is the virtual [`End`](Self::End) node.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Returns `true` if this is a custom node.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::End => write!(f, "End"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

// Developer experience: allow string literals where a NodeKind is expected.
impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        match s {
            "Start" => NodeKind::Start,
            "End" => NodeKind::End,
            other => NodeKind::Custom(other.to_string()),
        }
    }
}

/// Identifies a state channel and therefore which reducer merges its updates.
///
/// Each channel type has exactly one merge rule, fixed when the graph is
/// compiled:
///
/// | channel | merge rule |
/// |---|---|
/// | `Message` | append-only list |
/// | `Plan` | last-write-wins scalar |
/// | `Ledger` | append-only list |
/// | `Counter` | monotonic max per key |
/// | `Extra` | shallow map merge, last write wins per key |
/// | `Error` | append-only list |
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// Conversation messages (user, assistant, system, tool results).
    Message,
    /// The run's task plan.
    Plan,
    /// Token-usage data points recorded by model-invoking nodes.
    Ledger,
    /// Named monotonic counters (e.g., plan revision counts).
    Counter,
    /// Custom metadata and intermediate results.
    Extra,
    /// Error events and diagnostic information.
    Error,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Plan => write!(f, "plan"),
            Self::Ledger => write!(f, "ledger"),
            Self::Counter => write!(f, "counter"),
            Self::Extra => write!(f, "extra"),
            Self::Error => write!(f, "error"),
        }
    }
}
