use super::Reducer;
use crate::node::NodePartial;
use crate::state::VersionedState;

/// Merges counter updates by taking the maximum per key.
///
/// A counter can therefore never move backwards, even if a stale update is
/// replayed after a resume.
pub struct MaxCounters;

impl Reducer for MaxCounters {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(counters) = &update.counters {
            let target = state.counters.get_mut();
            for (key, value) in counters {
                let entry = target.entry(key.clone()).or_insert(0);
                if *value > *entry {
                    *entry = *value;
                }
            }
        }
    }
}
