//! Application layer - drives one conversation turn through the gateway.

mod turn;

pub use turn::{text_deltas, TextDeltaStream, TurnReply, TurnService};
