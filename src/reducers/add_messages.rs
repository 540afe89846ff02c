use super::Reducer;
use crate::node::NodePartial;
use crate::state::VersionedState;

/// Appends incoming messages to the conversation channel.
pub struct AddMessages;

impl Reducer for AddMessages {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(messages) = &update.messages {
            state.messages.get_mut().extend(messages.iter().cloned());
        }
    }
}
