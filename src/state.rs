//! Versioned state management for run execution.
//!
//! A run's state is split into independent channels, each with its own
//! version number and merge rule (see [`crate::reducers`]):
//!
//! - **messages**: conversation data, append-only
//! - **plan**: the task plan, last write wins
//! - **ledger**: token usage, append-only
//! - **counters**: named monotonic counters
//! - **extra**: custom metadata, shallow map merge
//! - **errors**: error events, append-only
//!
//! Nodes never touch state directly; they receive an immutable
//! [`StateSnapshot`] and return partial updates that are merged atomically
//! between node executions.
//!
//! # Examples
//!
//! ```rust
//! use codeloom::state::VersionedState;
//! use codeloom::channels::Channel;
//! use serde_json::json;
//!
//! let mut state = VersionedState::new_with_user_message("Add retry logic");
//! state.extra.get_mut().insert("repo".to_string(), json!("acme/api"));
//!
//! let snapshot = state.snapshot();
//! assert_eq!(snapshot.messages.len(), 1);
//! assert_eq!(snapshot.extra.get("repo"), Some(&json!("acme/api")));
//! ```

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::{
    accounting::TokenDataPoint,
    channels::{
        errors::ErrorEvent, Channel, CountersChannel, ErrorsChannel, ExtrasChannel, LedgerChannel,
        MessagesChannel, PlanChannel,
    },
    message::{Message, Role},
    plan::TaskPlan,
};

/// The main state container for run execution.
///
/// Each channel maintains its own version number for change detection; the
/// barrier bumps a version only when that channel's content changed during
/// the step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedState {
    /// Conversation channel.
    pub messages: MessagesChannel,
    /// Task-plan channel.
    pub plan: PlanChannel,
    /// Token-usage ledger channel.
    pub ledger: LedgerChannel,
    /// Monotonic counters channel.
    pub counters: CountersChannel,
    /// Custom metadata channel.
    pub extra: ExtrasChannel,
    /// Error-event channel.
    pub errors: ErrorsChannel,
}

/// Immutable snapshot of run state at a specific point in time.
///
/// Snapshots are created by [`VersionedState::snapshot()`] and passed to
/// nodes during execution. They are independent clones; mutating the live
/// state afterwards does not affect a snapshot already handed out.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    pub messages: Vec<Message>,
    pub messages_version: u32,
    pub plan: TaskPlan,
    pub plan_version: u32,
    pub ledger: Vec<TokenDataPoint>,
    pub ledger_version: u32,
    pub counters: FxHashMap<String, u64>,
    pub counters_version: u32,
    pub extra: FxHashMap<String, Value>,
    pub extra_version: u32,
    pub errors: Vec<ErrorEvent>,
    pub errors_version: u32,
}

impl StateSnapshot {
    /// The most recent message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for VersionedState {
    fn default() -> Self {
        Self {
            messages: MessagesChannel::default(),
            plan: PlanChannel::default(),
            ledger: LedgerChannel::default(),
            counters: CountersChannel::default(),
            extra: ExtrasChannel::default(),
            errors: ErrorsChannel::default(),
        }
    }
}

impl VersionedState {
    /// Creates state initialized with a single user message.
    ///
    /// This is the usual entry point when a trigger payload carries the
    /// initial request text.
    pub fn new_with_user_message(user_text: &str) -> Self {
        Self {
            messages: MessagesChannel::new(vec![Message::with_role(Role::User, user_text)], 1),
            ..Default::default()
        }
    }

    /// Creates state initialized with an existing message history.
    pub fn new_with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: MessagesChannel::new(messages, 1),
            ..Default::default()
        }
    }

    /// Creates a builder for constructing state with a fluent API.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use codeloom::state::VersionedState;
    /// use serde_json::json;
    ///
    /// let state = VersionedState::builder()
    ///     .with_system_message("You are a careful software engineer.")
    ///     .with_user_message("Upgrade the lockfile")
    ///     .with_extra("branch", json!("main"))
    ///     .build();
    ///
    /// assert_eq!(state.snapshot().messages.len(), 2);
    /// ```
    pub fn builder() -> VersionedStateBuilder {
        VersionedStateBuilder::default()
    }

    /// Appends a message without bumping the version (the barrier owns
    /// version bumps).
    #[must_use = "consider using the returned self for method chaining"]
    pub fn add_message(&mut self, role: &str, content: &str) -> &mut Self {
        self.messages
            .get_mut()
            .push(Message::with_role(Role::from(role), content));
        self
    }

    /// Inserts a metadata entry without bumping the version.
    #[must_use = "consider using the returned self for method chaining"]
    pub fn add_extra(&mut self, key: &str, value: Value) -> &mut Self {
        self.extra.get_mut().insert(key.to_string(), value);
        self
    }

    /// Creates an immutable snapshot of the current state.
    ///
    /// Clones every channel, so cost is proportional to the amount of data
    /// held.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            messages: self.messages.snapshot(),
            messages_version: self.messages.version(),
            plan: self.plan.snapshot(),
            plan_version: self.plan.version(),
            ledger: self.ledger.snapshot(),
            ledger_version: self.ledger.version(),
            counters: self.counters.snapshot(),
            counters_version: self.counters.version(),
            extra: self.extra.snapshot(),
            extra_version: self.extra.version(),
            errors: self.errors.snapshot(),
            errors_version: self.errors.version(),
        }
    }
}

/// Builder for constructing [`VersionedState`] with a fluent API.
#[derive(Debug, Default)]
pub struct VersionedStateBuilder {
    messages: Vec<Message>,
    plan: Option<TaskPlan>,
    extra: FxHashMap<String, Value>,
}

impl VersionedStateBuilder {
    /// Adds a user message.
    pub fn with_user_message(mut self, content: &str) -> Self {
        self.messages.push(Message::with_role(Role::User, content));
        self
    }

    /// Adds an assistant message.
    pub fn with_assistant_message(mut self, content: &str) -> Self {
        self.messages
            .push(Message::with_role(Role::Assistant, content));
        self
    }

    /// Adds a system message.
    pub fn with_system_message(mut self, content: &str) -> Self {
        self.messages
            .push(Message::with_role(Role::System, content));
        self
    }

    /// Seeds the plan channel (restore and test paths).
    pub fn with_plan(mut self, plan: TaskPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Adds a metadata entry.
    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// Builds the final state with all channels at version 1.
    pub fn build(self) -> VersionedState {
        VersionedState {
            messages: MessagesChannel::new(self.messages, 1),
            plan: PlanChannel::new(self.plan.unwrap_or_default(), 1),
            extra: ExtrasChannel::new(self.extra, 1),
            ..Default::default()
        }
    }
}
