//! Human-approval interrupts.
//!
//! Certain tool invocations (an explicit allow-list, see
//! [`crate::tools::ToolRegistry`]) must not run without operator sign-off.
//! A node raises an [`InterruptRequest`]; the run manager checkpoints the
//! run, marks it paused, and hands a [`HumanInterrupt`] record to the
//! caller. The run resumes only through an explicit [`Decision`], and a
//! decision kind the interrupt's capabilities do not permit is rejected
//! before any side effect.
//!
//! The interrupt is a plain serializable record, so a paused run survives
//! process restarts and the pending approval can be re-displayed from the
//! checkpoint alone.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The action an interrupt asks the operator to approve.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Human-readable action title, e.g. `"Approve Shell Command"`.
    pub action: String,
    /// Structured arguments of the pending invocation.
    pub args: Value,
}

/// Which resume decisions are legal for a given interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptCapabilities {
    pub allow_accept: bool,
    pub allow_edit: bool,
    pub allow_ignore: bool,
    pub allow_respond: bool,
}

impl InterruptCapabilities {
    /// Accept-or-ignore, the default for shell approval.
    #[must_use]
    pub fn accept_or_ignore() -> Self {
        Self {
            allow_accept: true,
            allow_edit: false,
            allow_ignore: true,
            allow_respond: false,
        }
    }

    /// Everything allowed, for plan-review style interrupts.
    #[must_use]
    pub fn all() -> Self {
        Self {
            allow_accept: true,
            allow_edit: true,
            allow_ignore: true,
            allow_respond: true,
        }
    }

    /// Whether the capability set permits the given decision kind.
    #[must_use]
    pub fn permits(&self, decision: &Decision) -> bool {
        match decision {
            Decision::Accept => self.allow_accept,
            Decision::Edit(_) => self.allow_edit,
            Decision::Ignore => self.allow_ignore,
            Decision::Respond(_) => self.allow_respond,
        }
    }
}

/// What a node raises to suspend the run.
///
/// The run manager assigns the id and wraps this into a [`HumanInterrupt`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub action_request: ActionRequest,
    pub capabilities: InterruptCapabilities,
}

impl InterruptRequest {
    #[must_use]
    pub fn new(action: impl Into<String>, args: Value, capabilities: InterruptCapabilities) -> Self {
        Self {
            action_request: ActionRequest {
                action: action.into(),
                args,
            },
            capabilities,
        }
    }
}

/// Resolution state of an interrupt. At most one `Pending` interrupt exists
/// per run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptStatus {
    Pending,
    Resolved,
}

/// A suspension point awaiting an operator decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanInterrupt {
    /// Unique interrupt id; resume calls must echo it.
    pub id: String,
    pub action_request: ActionRequest,
    pub capabilities: InterruptCapabilities,
    pub status: InterruptStatus,
}

impl HumanInterrupt {
    /// Wraps a node's request into a pending interrupt with a fresh id.
    #[must_use]
    pub fn from_request(request: InterruptRequest) -> Self {
        Self {
            id: crate::utils::id::IdGenerator::new().generate_interrupt_id(),
            action_request: request.action_request,
            capabilities: request.capabilities,
            status: InterruptStatus::Pending,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == InterruptStatus::Pending
    }
}

/// A resolved interrupt paired with the operator's decision, handed back to
/// the suspended node when the run resumes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeDecision {
    pub interrupt: HumanInterrupt,
    pub decision: Decision,
}

/// An operator's resume decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Decision {
    /// Execute the original arguments.
    Accept,
    /// Execute with replaced arguments.
    Edit(Value),
    /// Skip execution; a neutral placeholder result is injected.
    Ignore,
    /// Attach free-text feedback without executing.
    Respond(String),
}

impl Decision {
    /// Short name of the decision kind, for logs and rejection messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Edit(_) => "edit",
            Decision::Ignore => "ignore",
            Decision::Respond(_) => "respond",
        }
    }
}
