/*!
Persistence primitives for serializing/deserializing runtime state and
checkpoints (used by the SQLite checkpointer and any future persistent
backends).

Design goals:
- Explicit serde-friendly structs decoupled from internal in-memory
  representations.
- Conversion logic localized in From / TryFrom impls so checkpointer code
  stays lean and declarative.
- Forward compatibility: unknown NodeKind encodings round-trip as
  `NodeKind::Custom(encoded_string)`.

This module performs no I/O; it is pure data transformation and
(de)serialization glue.
*/

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    accounting::TokenDataPoint,
    channels::{
        errors::ErrorEvent, Channel, CountersChannel, ErrorsChannel, ExtrasChannel, LedgerChannel,
        MessagesChannel, PlanChannel,
    },
    interrupts::HumanInterrupt,
    message::Message,
    plan::TaskPlan,
    runtimes::checkpointer::Checkpoint,
    runtimes::runner::RunStatus,
    state::VersionedState,
    types::NodeKind,
};

/// Channel that stores a vector collection with version metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedVecChannel<T> {
    pub version: u32,
    #[serde(default)]
    pub items: Vec<T>,
}

impl<T> Default for PersistedVecChannel<T> {
    fn default() -> Self {
        Self {
            version: 1,
            items: Vec::new(),
        }
    }
}

/// Channel that stores a map collection with version metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedMapChannel<V> {
    pub version: u32,
    #[serde(default)]
    pub map: FxHashMap<String, V>,
}

impl<V> Default for PersistedMapChannel<V> {
    fn default() -> Self {
        Self {
            version: 1,
            map: FxHashMap::default(),
        }
    }
}

/// Channel that stores a single value with version metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersistedCellChannel<T> {
    pub version: u32,
    #[serde(default)]
    pub value: T,
}

/// Complete persisted shape of the in-memory VersionedState.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersistedState {
    pub messages: PersistedVecChannel<Message>,
    #[serde(default)]
    pub plan: PersistedCellChannel<TaskPlan>,
    #[serde(default)]
    pub ledger: PersistedVecChannel<TokenDataPoint>,
    #[serde(default)]
    pub counters: PersistedMapChannel<u64>,
    pub extra: PersistedMapChannel<Value>,
    #[serde(default)]
    pub errors: PersistedVecChannel<ErrorEvent>,
}

/// Full persisted checkpoint representation. The step history table stores
/// one instance of this shape per step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    pub run_id: String,
    pub step: u64,
    pub state: PersistedState,
    /// Next node encoded via `NodeKind::encode()`, absent once terminal.
    #[serde(default)]
    pub current: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub visits: u32,
    #[serde(default)]
    pub pending_interrupt: Option<HumanInterrupt>,
    /// RFC3339 creation time (keeps chrono::DateTime out of the shape).
    pub created_at: String,
}

/// Conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("missing field: {0}")]
    #[diagnostic(
        code(codeloom::persistence::missing_field),
        help("Populate the field in the persisted JSON before conversion.")
    )]
    MissingField(&'static str),

    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(codeloom::persistence::serde),
        help("Ensure the JSON structure matches the Persisted* types.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/* ---------- VersionedState <-> PersistedState ---------- */

impl From<&VersionedState> for PersistedState {
    fn from(s: &VersionedState) -> Self {
        PersistedState {
            messages: PersistedVecChannel {
                version: s.messages.version(),
                items: s.messages.snapshot(),
            },
            plan: PersistedCellChannel {
                version: s.plan.version(),
                value: s.plan.snapshot(),
            },
            ledger: PersistedVecChannel {
                version: s.ledger.version(),
                items: s.ledger.snapshot(),
            },
            counters: PersistedMapChannel {
                version: s.counters.version(),
                map: s.counters.snapshot(),
            },
            extra: PersistedMapChannel {
                version: s.extra.version(),
                map: s.extra.snapshot(),
            },
            errors: PersistedVecChannel {
                version: s.errors.version(),
                items: s.errors.snapshot(),
            },
        }
    }
}

impl From<PersistedState> for VersionedState {
    fn from(p: PersistedState) -> Self {
        VersionedState {
            messages: MessagesChannel::new(p.messages.items, p.messages.version),
            plan: PlanChannel::new(p.plan.value, p.plan.version),
            ledger: LedgerChannel::new(p.ledger.items, p.ledger.version),
            counters: CountersChannel::new(p.counters.map, p.counters.version),
            extra: ExtrasChannel::new(p.extra.map, p.extra.version),
            errors: ErrorsChannel::new(p.errors.items, p.errors.version),
        }
    }
}

/* ---------- Checkpoint <-> PersistedCheckpoint ---------- */

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            run_id: cp.run_id.clone(),
            step: cp.step,
            state: PersistedState::from(&cp.state),
            current: cp.current.as_ref().map(NodeKind::encode),
            status: cp.status,
            visits: cp.visits,
            pending_interrupt: cp.pending_interrupt.clone(),
            created_at: cp.created_at.to_rfc3339(),
        }
    }
}

impl From<PersistedCheckpoint> for Checkpoint {
    fn from(p: PersistedCheckpoint) -> Self {
        let created_at = chrono::DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Checkpoint {
            run_id: p.run_id,
            step: p.step,
            state: VersionedState::from(p.state),
            current: p.current.as_deref().map(NodeKind::decode),
            status: p.status,
            visits: p.visits,
            pending_interrupt: p.pending_interrupt,
            created_at,
        }
    }
}

/* ---------- JSON helpers ---------- */

/// Serialize any persisted shape to a JSON string.
pub fn to_json_string<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| PersistenceError::Serde { source: e })
}

/// Deserialize any persisted shape from a JSON string.
pub fn from_json_str<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| PersistenceError::Serde { source: e })
}
