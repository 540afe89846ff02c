use super::Reducer;
use crate::node::NodePartial;
use crate::state::VersionedState;

/// Appends incoming error events to the error channel.
pub struct AddErrors;

impl Reducer for AddErrors {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(errors) = &update.errors {
            state.errors.get_mut().extend(errors.iter().cloned());
        }
    }
}
