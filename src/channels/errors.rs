//! Error events collected in the `errors` channel.
//!
//! Fatal failures abort a run; everything else becomes an [`ErrorEvent`]
//! appended to state, where later nodes (the agent) can see it and
//! self-correct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents an error event with scope, error details, tags, and context.
///
/// # JSON Serialization Format
///
/// ```json
/// {
///   "when": "2026-08-02T10:30:00Z",
///   "scope": { "scope": "tool", "name": "shell" },
///   "error": {
///     "message": "command exited with status 1",
///     "cause": null,
///     "details": {"exit_code": 1}
///   },
///   "tags": ["tool", "recoverable"],
///   "context": {"command": "npm test"}
/// }
/// ```
///
/// The `scope` field uses a tagged union with a `"scope"` discriminator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorEvent {
    #[serde(default = "chrono::Utc::now")]
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub scope: ErrorScope,
    #[serde(default)]
    pub error: ErrorDetail,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl ErrorEvent {
    /// Create a node-scoped error event.
    pub fn node<S: Into<String>>(kind: S, step: u64, error: ErrorDetail) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Node {
                kind: kind.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a tool-scoped error event.
    pub fn tool<S: Into<String>>(name: S, error: ErrorDetail) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Tool { name: name.into() },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a runner-scoped error event.
    pub fn runner<S: Into<String>>(run: S, step: u64, error: ErrorDetail) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Runner {
                run: run.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create an app-scoped error event.
    pub fn app(error: ErrorDetail) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::App,
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Attach a tag for filtering.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Attach structured context.
    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Where in the system an error originated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum ErrorScope {
    /// A graph node at a given step.
    Node { kind: String, step: u64 },
    /// A tool invocation.
    Tool { name: String },
    /// The run manager, outside any single node.
    Runner { run: String, step: u64 },
    /// Application-level (compile/config time).
    App,
}

impl Default for ErrorScope {
    fn default() -> Self {
        ErrorScope::App
    }
}

/// A message plus optional nested cause, serde-friendly so events survive
/// checkpointing without losing the chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorDetail>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ErrorDetail {
    /// A detail carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }

    /// Wrap another detail as the cause of this one.
    #[must_use]
    pub fn caused_by(mut self, cause: ErrorDetail) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        let mut cause = self.cause.as_deref();
        while let Some(c) = cause {
            write!(f, ": {}", c.message)?;
            cause = c.cause.as_deref();
        }
        Ok(())
    }
}
