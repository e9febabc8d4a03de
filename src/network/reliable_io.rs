//! Retrying full writes and best-effort partial reads.
//!
//! These primitives sit under both the relay's forwarding loop and the
//! replay engine. Neither assumes a blocking mode: what happens on each call
//! is decided by what the OS reports.
//!
//! - [`write_all`] keeps writing until every byte has been accepted.
//!   `Interrupted` is retried transparently; `WouldBlock` parks on the sink's
//!   [`WriteReady::wait_writable`] and then retries the unsent remainder.
//! - [`read_available`] accumulates until the buffer is full, the peer
//!   closes, or a non-blocking source reports `WouldBlock`. That last case is
//!   how the relay forwards "whatever is ready right now". A source with
//!   nothing ready at all reports `WouldBlock` as an error, so callers can
//!   tell a spurious wake-up from a peer that closed.

use std::io::{self, Read, Write};

use crate::error_handling::types::TransferError;

/// A byte sink that can wait until the kernel will accept more data.
///
/// Sinks that never report `WouldBlock` can rely on the default, which
/// returns immediately.
pub trait WriteReady: Write {
    fn wait_writable(&self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteReady for Vec<u8> {}

/// Writes the whole of `buf`, returning the number of bytes sent.
///
/// On any error other than an interruption or a would-block condition the
/// write is abandoned and the error carries the count actually sent.
pub fn write_all<W: WriteReady + ?Sized>(writer: &mut W, buf: &[u8]) -> Result<usize, TransferError> {
    let mut sent = 0;
    while sent < buf.len() {
        match writer.write(&buf[sent..]) {
            Ok(0) => {
                return Err(TransferError::PartialWrite {
                    sent,
                    source: io::Error::from(io::ErrorKind::WriteZero),
                })
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                writer
                    .wait_writable()
                    .map_err(|source| TransferError::PartialWrite { sent, source })?;
            }
            Err(source) => return Err(TransferError::PartialWrite { sent, source }),
        }
    }
    Ok(sent)
}

/// Reads into `buf` until it is full, the peer closes or no more data is
/// ready, returning the number of bytes collected.
///
/// A return of zero means the peer closed before anything was read. If a
/// non-blocking source has nothing ready, the error carries `WouldBlock`
/// with `received` zero.
pub fn read_available<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize, TransferError> {
    let mut received = 0;
    while received < buf.len() {
        match reader.read(&mut buf[received..]) {
            Ok(0) => break,
            Ok(n) => received += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock && received > 0 => break,
            Err(source) => return Err(TransferError::ReadFailed { received, source }),
        }
    }
    Ok(received)
}
