//! State merge strategies.
//!
//! Every channel has a reducer fixed at graph-compile time; the barrier in
//! [`crate::app::App`] routes a node's [`NodePartial`] through the registry
//! so merge behavior is declared, not inferred from the shape of the update.
//!
//! Merge rules:
//! - `messages`, `ledger`, `errors`: append-only
//! - `plan`: last write wins
//! - `counters`: monotonic max per key
//! - `extra`: shallow map merge, last write wins per key

mod add_errors;
mod add_messages;
mod add_token_data;
mod map_merge;
mod max_counters;
mod reducer_registry;
mod replace_plan;

pub use add_errors::AddErrors;
pub use add_messages::AddMessages;
pub use add_token_data::AddTokenData;
pub use map_merge::MapMerge;
pub use max_counters::MaxCounters;
pub use reducer_registry::ReducerRegistry;
pub use replace_plan::ReplacePlan;

use crate::node::NodePartial;
use crate::state::VersionedState;
use crate::types::ChannelType;
use std::fmt;

/// Unified reducer trait: every reducer mutates `VersionedState` using a
/// `NodePartial` delta. Reducers never bump channel versions; the barrier
/// does that after detecting actual change.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial);
}

#[derive(Debug)]
pub enum ReducerError {
    UnknownChannel(ChannelType),
}

impl fmt::Display for ReducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerError::UnknownChannel(channel) => {
                write!(f, "no reducers registered for channel: {channel:?}")
            }
        }
    }
}

impl std::error::Error for ReducerError {}
