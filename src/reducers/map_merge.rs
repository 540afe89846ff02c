use super::Reducer;
use crate::node::NodePartial;
use crate::state::VersionedState;

/// Shallow-merges metadata into the extra channel; an incoming key
/// overwrites an existing one.
pub struct MapMerge;

impl Reducer for MapMerge {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(extra) = &update.extra {
            // Sort keys so merged output is deterministic across runs.
            let mut pairs: Vec<_> = extra.iter().collect();
            pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
            let target = state.extra.get_mut();
            for (key, value) in pairs {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
