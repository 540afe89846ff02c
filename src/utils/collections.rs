//! Constructors for the map shapes used in node partials.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Empty map for the `extra` channel.
#[must_use]
pub fn new_extra_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}

/// Empty map for the `counters` channel.
#[must_use]
pub fn new_counter_map() -> FxHashMap<String, u64> {
    FxHashMap::default()
}
