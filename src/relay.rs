//! # Relay
//!
//! Sits between the L and R programs, forwarding every byte unchanged in
//! both directions while handing each chunk to the attached recorders.
//!
//! [`Relay`] owns setup and teardown; [`Forwarder`] owns the readiness loop.
//! Everything runs on the calling thread. The only asynchronous event is
//! SIGCHLD, which reaps the R side program through the signal hub and
//! otherwise just interrupts the readiness wait.

pub mod engine;
pub mod forwarding;

pub use engine::{template_values, Relay, RelaySummary};
pub use forwarding::{ForwardStats, Forwarder};
