//! Replay of a recorded session against a live peer.
//!
//! The player stands in for one side of a captured session, sending what
//! that side sent and checking that what comes back has the recorded sizes.

pub mod player;

pub use player::{originated_side, play, Player, ReplayOutcome, ReplayReport, ReplayState};
