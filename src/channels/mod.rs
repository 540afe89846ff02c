//! Versioned channel storage underpinning [`crate::state::VersionedState`].
//!
//! Each channel pairs its payload with a version number. Reducers mutate the
//! payload; the barrier in [`crate::app::App`] bumps the version only when
//! the payload actually changed, which gives observers a cheap change test
//! and keeps checkpoint diffs meaningful.

pub mod errors;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::accounting::TokenDataPoint;
use crate::message::Message;
use crate::plan::TaskPlan;
use errors::ErrorEvent;

/// Common surface of every versioned channel.
pub trait Channel {
    /// The owned snapshot type handed to nodes.
    type Snapshot;

    /// Current channel version. Starts at 1 and only grows.
    fn version(&self) -> u32;

    /// Overwrite the version. Reserved for the barrier and for restore paths.
    fn set_version(&mut self, version: u32);

    /// Clone the payload into an independent snapshot.
    fn snapshot(&self) -> Self::Snapshot;

    /// Whether the channel currently holds no data.
    fn is_empty(&self) -> bool;
}

/// Append-oriented channel holding an ordered list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VecChannel<T> {
    items: Vec<T>,
    version: u32,
}

impl<T> VecChannel<T> {
    /// Creates a channel from existing items at an explicit version
    /// (restore path).
    #[must_use]
    pub fn new(items: Vec<T>, version: u32) -> Self {
        Self { items, version }
    }

    /// Immutable access to the underlying items.
    #[must_use]
    pub fn get(&self) -> &Vec<T> {
        &self.items
    }

    /// Mutable access for reducers.
    pub fn get_mut(&mut self) -> &mut Vec<T> {
        &mut self.items
    }

    /// Number of items held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T> Default for VecChannel<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            version: 1,
        }
    }
}

impl<T: Clone> Channel for VecChannel<T> {
    type Snapshot = Vec<T>;

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Keyed channel holding a string-keyed map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapChannel<V> {
    map: FxHashMap<String, V>,
    version: u32,
}

impl<V> MapChannel<V> {
    #[must_use]
    pub fn new(map: FxHashMap<String, V>, version: u32) -> Self {
        Self { map, version }
    }

    #[must_use]
    pub fn get(&self) -> &FxHashMap<String, V> {
        &self.map
    }

    pub fn get_mut(&mut self) -> &mut FxHashMap<String, V> {
        &mut self.map
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

impl<V> Default for MapChannel<V> {
    fn default() -> Self {
        Self {
            map: FxHashMap::default(),
            version: 1,
        }
    }
}

impl<V: Clone> Channel for MapChannel<V> {
    type Snapshot = FxHashMap<String, V>;

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    fn snapshot(&self) -> FxHashMap<String, V> {
        self.map.clone()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Single-value channel with last-write-wins semantics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellChannel<T> {
    value: T,
    version: u32,
}

impl<T> CellChannel<T> {
    #[must_use]
    pub fn new(value: T, version: u32) -> Self {
        Self { value, version }
    }

    #[must_use]
    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Replace the held value wholesale.
    pub fn set(&mut self, value: T) {
        self.value = value;
    }
}

impl<T: Default> Default for CellChannel<T> {
    fn default() -> Self {
        Self {
            value: T::default(),
            version: 1,
        }
    }
}

impl Channel for CellChannel<TaskPlan> {
    type Snapshot = TaskPlan;

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    fn snapshot(&self) -> TaskPlan {
        self.value.clone()
    }

    fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Conversation channel.
pub type MessagesChannel = VecChannel<Message>;
/// Token-usage ledger channel.
pub type LedgerChannel = VecChannel<TokenDataPoint>;
/// Error-event channel.
pub type ErrorsChannel = VecChannel<ErrorEvent>;
/// Metadata channel.
pub type ExtrasChannel = MapChannel<Value>;
/// Monotonic counters channel.
pub type CountersChannel = MapChannel<u64>;
/// Task-plan channel.
pub type PlanChannel = CellChannel<TaskPlan>;
