use super::Reducer;
use crate::node::NodePartial;
use crate::state::VersionedState;

/// Appends token-usage data points to the ledger channel.
///
/// The ledger never shrinks or rewrites history; cost reporting relies on
/// entries staying in append order.
pub struct AddTokenData;

impl Reducer for AddTokenData {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(tokens) = &update.tokens {
            state.ledger.get_mut().extend(tokens.iter().cloned());
        }
    }
}
