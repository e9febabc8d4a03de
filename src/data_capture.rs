//! Frames, the on-disk capture format and the recorders the relay feeds.

pub mod binary_recorder;
pub mod codec;
pub mod hex_recorder;
pub mod recorder;
pub mod types;

pub use binary_recorder::BinaryRecorder;
pub use codec::{decode, decode_filtered, encode, write_record, CaptureReader};
pub use hex_recorder::HexRecorder;
pub use recorder::Recorder;
pub use types::{Frame, Side};
