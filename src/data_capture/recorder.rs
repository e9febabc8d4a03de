//! Recorder sink contract.
//!
//! The relay hands every forwarded chunk to each attached recorder, in
//! attachment order, from its single forwarding thread. A recorder must not
//! keep the frame beyond the call: the relay reuses the read buffer as soon
//! as fan-out completes.

use super::types::Frame;
use crate::error_handling::types::CaptureError;

pub trait Recorder: Send {
    /// Called once per forwarded chunk. `from` and `to` are the endpoint
    /// names the bytes travelled between.
    fn record(&mut self, from: &str, to: &str, frame: &Frame) -> Result<(), CaptureError>;

    /// Called exactly once, after the last `record`.
    fn shutdown(&mut self) -> Result<(), CaptureError>;

    /// Short label used in log lines.
    fn label(&self) -> &str {
        "recorder"
    }
}
