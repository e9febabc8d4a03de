//! Error taxonomy shared by the relay and replay engines.

pub mod types;
