//! # Network Module
//!
//! Owned connection handles and the I/O primitives the relay and replay
//! engines are built on.
//!
//! - [`ResolvedAddress`]: host/port resolution, cloned freely and consumed
//!   by connect/listen calls.
//! - [`Endpoint`]: a named, owned connection (stream or datagram).
//! - [`ServiceEndpoint`]: the listening socket the R side connects to.
//! - [`reliable_io`]: retrying full writes and best-effort partial reads.

pub mod address;
pub mod endpoint;
pub mod reliable_io;

pub use address::ResolvedAddress;
pub use endpoint::{poll_ready, Endpoint, ServiceEndpoint};
pub use reliable_io::{read_available, write_all, WriteReady};
