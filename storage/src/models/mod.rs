//! Persistence models for the `relayed_msg` table.

mod layer;
mod relayed_msg;

pub use layer::Layer;
pub(crate) use relayed_msg::{decode_height, encode_height};
pub use relayed_msg::{DeletionState, NewRelayedMsg, RelayedMsg};
