//! Binary capture codec.
//!
//! A capture file is an append-only run of records with no header, footer
//! or checksum:
//!
//! ```text
//! +-----------+----------------------+------------------+
//! | direction | length (u32, big-end)| payload (length) |
//! | 'L' | 'R' |       4 bytes        |                  |
//! +-----------+----------------------+------------------+
//! ```
//!
//! A trailing record that is cut short anywhere (tag only, partial length,
//! partial payload) is the normal end of a capture taken from a relay that
//! stopped mid-write. It decodes as end-of-stream, never as an error.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use log::debug;

use super::types::{Frame, Side};
use crate::error_handling::types::CaptureError;

/// Bytes in front of every payload: tag + length.
pub const RECORD_HEADER_LEN: usize = 5;

/// Encodes one record.
pub fn encode(direction: Side, payload: &[u8]) -> Result<Vec<u8>, CaptureError> {
    let mut out = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
    write_record(&mut out, direction, payload)?;
    Ok(out)
}

/// Appends one record to `writer`.
pub fn write_record<W: Write + ?Sized>(
    writer: &mut W,
    direction: Side,
    payload: &[u8],
) -> Result<(), CaptureError> {
    let len = u32::try_from(payload.len()).map_err(|_| CaptureError::PayloadTooLarge(payload.len()))?;
    let mut header = [0u8; RECORD_HEADER_LEN];
    header[0] = direction.tag();
    header[1..].copy_from_slice(&len.to_be_bytes());
    writer.write_all(&header)?;
    writer.write_all(payload)?;
    Ok(())
}

/// Decodes the next record, or `None` at end-of-stream.
pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Frame>, CaptureError> {
    let mut header = [0u8; RECORD_HEADER_LEN];
    if !fill(reader, &mut header)? {
        return Ok(None);
    }
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as u64;

    // Grow with the data actually present rather than trusting the
    // declared length up front.
    let mut payload = Vec::new();
    reader.take(len).read_to_end(&mut payload)?;
    if (payload.len() as u64) < len {
        debug!(
            "Truncated trailing record: {} of {} payload bytes present",
            payload.len(),
            len
        );
        return Ok(None);
    }

    let direction = Side::from_tag(header[0]).ok_or(CaptureError::InvalidDirection(header[0]))?;
    Ok(Some(Frame::new(direction, payload)))
}

/// Decodes records until one travelling toward `direction` turns up,
/// discarding the rest, or `None` at end-of-stream.
pub fn decode_filtered<R: Read + ?Sized>(
    reader: &mut R,
    direction: Side,
) -> Result<Option<Frame>, CaptureError> {
    while let Some(frame) = decode(reader)? {
        if frame.direction() == direction {
            return Ok(Some(frame));
        }
    }
    Ok(None)
}

/// Reads exactly `buf.len()` bytes. `Ok(false)` when the stream ends first.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Lazy iterator over the frames of a capture stream.
///
/// Holds nothing but the stream position; iteration stops after
/// end-of-stream or the first error.
pub struct CaptureReader<R> {
    inner: R,
    filter: Option<Side>,
    done: bool,
}

impl CaptureReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CaptureError::OpenFailed(path.to_path_buf(), e))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            filter: None,
            done: false,
        }
    }

    /// Only yield frames travelling toward `direction`.
    pub fn toward(mut self, direction: Side) -> Self {
        self.filter = Some(direction);
        self
    }

    /// Next frame, `None` at end-of-stream.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        match self.filter {
            Some(direction) => decode_filtered(&mut self.inner, direction),
            None => decode(&mut self.inner),
        }
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<Frame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(frames: &[(Side, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (direction, payload) in frames {
            write_record(&mut out, *direction, payload).unwrap();
        }
        out
    }

    #[test]
    fn test_encode_layout() {
        let bytes = encode(Side::L, b"hello").unwrap();
        assert_eq!(bytes, vec![b'L', 0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_round_trip() {
        for (direction, payload) in [(Side::L, &b""[..]), (Side::R, &b"x"[..]), (Side::L, &[0u8; 300][..])] {
            let bytes = encode(direction, payload).unwrap();
            let frame = decode(&mut Cursor::new(bytes)).unwrap().unwrap();
            assert_eq!(frame, Frame::new(direction, payload.to_vec()));
        }
    }

    #[test]
    fn test_sequence_in_order() {
        let data = stream(&[(Side::L, b"one"), (Side::R, b"two"), (Side::L, b"three"), (Side::R, b"four")]);
        let mut cursor = Cursor::new(data);

        let mut seen = Vec::new();
        while let Some(frame) = decode(&mut cursor).unwrap() {
            seen.push((frame.direction(), frame.into_payload()));
        }
        assert_eq!(
            seen,
            vec![
                (Side::L, b"one".to_vec()),
                (Side::R, b"two".to_vec()),
                (Side::L, b"three".to_vec()),
                (Side::R, b"four".to_vec()),
            ]
        );
        assert!(decode(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_filtered_decode() {
        let data = stream(&[(Side::L, b"one"), (Side::R, b"two"), (Side::L, b"three"), (Side::R, b"four")]);
        let mut cursor = Cursor::new(data);

        assert_eq!(decode_filtered(&mut cursor, Side::R).unwrap().unwrap().payload(), b"two");
        assert_eq!(decode_filtered(&mut cursor, Side::R).unwrap().unwrap().payload(), b"four");
        assert!(decode_filtered(&mut cursor, Side::R).unwrap().is_none());
    }

    #[test]
    fn test_truncated_payload_is_end_of_stream() {
        let mut data = stream(&[(Side::L, b"whole")]);
        data.extend_from_slice(&[b'R', 0, 0, 0, 5, b'a', b'b', b'c']);
        let mut cursor = Cursor::new(data);

        assert_eq!(decode(&mut cursor).unwrap().unwrap().payload(), b"whole");
        assert!(decode(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_truncated_header_is_end_of_stream() {
        for tail in [&[b'L'][..], &[b'R', 0, 0][..]] {
            let mut data = stream(&[(Side::R, b"ok")]);
            data.extend_from_slice(tail);
            let mut cursor = Cursor::new(data);

            assert!(decode(&mut cursor).unwrap().is_some());
            assert!(decode(&mut cursor).unwrap().is_none());
        }
    }

    #[test]
    fn test_huge_declared_length_does_not_allocate_up_front() {
        let data = vec![b'L', 0xff, 0xff, 0xff, 0xff, 1, 2, 3];
        assert!(decode(&mut Cursor::new(data)).unwrap().is_none());
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let data = vec![b'X', 0, 0, 0, 1, 0];
        let err = decode(&mut Cursor::new(data)).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidDirection(b'X')));
    }

    #[test]
    fn test_reader_iterates_and_filters() {
        let data = stream(&[(Side::L, b"a"), (Side::R, b"b"), (Side::L, b"c")]);

        let all: Vec<Frame> = CaptureReader::new(Cursor::new(data.clone()))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(all.len(), 3);

        let toward_l: Vec<Vec<u8>> = CaptureReader::new(Cursor::new(data))
            .toward(Side::L)
            .map(|f| f.unwrap().into_payload())
            .collect();
        assert_eq!(toward_l, vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CaptureReader::open(dir.path().join("absent.bdr")).err().unwrap();
        assert!(matches!(err, CaptureError::OpenFailed(_, _)));
    }
}
