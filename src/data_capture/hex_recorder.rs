use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info};

use super::recorder::Recorder;
use super::types::Frame;
use crate::error_handling::types::CaptureError;

const BYTES_PER_LINE: usize = 16;
const BYTES_PER_GROUP: usize = 2;

/// Writes a human-readable hex transcript of the session.
///
/// ```text
/// 1718000000:123456789  from: L to: R
/// 00000000 4745 5420 2f20 4854 5450 2f31 2e31 0d0a
/// 00000010 0d0a
///
/// ```
pub struct HexRecorder {
    path: PathBuf,
    out: Option<BufWriter<File>>,
}

impl HexRecorder {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| CaptureError::OpenFailed(path.clone(), e))?;
        info!("Hex transcript will be written to {}", path.display());
        Ok(Self {
            path,
            out: Some(BufWriter::new(file)),
        })
    }
}

/// Appends one transcript entry for `frame` to `out`.
pub fn write_entry<W: Write + ?Sized>(
    out: &mut W,
    from: &str,
    to: &str,
    frame: &Frame,
) -> io::Result<()> {
    let at = frame.captured_at().unwrap_or_else(Utc::now);
    writeln!(
        out,
        "{}:{}  from: {} to: {}",
        at.timestamp(),
        at.timestamp_subsec_nanos(),
        from,
        to
    )?;

    for (line, chunk) in frame.payload().chunks(BYTES_PER_LINE).enumerate() {
        write!(out, "{:08x}", line * BYTES_PER_LINE)?;
        for group in chunk.chunks(BYTES_PER_GROUP) {
            out.write_all(b" ")?;
            for byte in group {
                write!(out, "{:02x}", byte)?;
            }
        }
        out.write_all(b"\n")?;
    }
    out.write_all(b"\n")
}

impl Recorder for HexRecorder {
    fn record(&mut self, from: &str, to: &str, frame: &Frame) -> Result<(), CaptureError> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| CaptureError::IoError(io::Error::other("hex recorder already shut down")))?;
        write_entry(out, from, to, frame)?;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), CaptureError> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
            debug!("Hex transcript {} closed", self.path.display());
        }
        Ok(())
    }

    fn label(&self) -> &str {
        "hex"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_capture::types::Side;

    fn body_of(entry: &str) -> Vec<&str> {
        entry.lines().skip(1).collect()
    }

    #[test]
    fn test_entry_layout() {
        let frame = Frame::captured(Side::R, b"GET / HTTP/1.1\r\n\r\n".to_vec());
        let mut out = Vec::new();
        write_entry(&mut out, "L", "R", &frame).unwrap();
        let text = String::from_utf8(out).unwrap();

        let header = text.lines().next().unwrap();
        assert!(header.ends_with("  from: L to: R"));
        let (secs, nanos) = header.split_once("  ").unwrap().0.split_once(':').unwrap();
        assert!(secs.parse::<i64>().is_ok());
        assert!(nanos.parse::<u32>().is_ok());

        assert_eq!(
            body_of(&text),
            vec![
                "00000000 4745 5420 2f20 4854 5450 2f31 2e31 0d0a",
                "00000010 0d0a",
                "",
            ]
        );
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_odd_length_tail() {
        let frame = Frame::new(Side::L, vec![0xab, 0xcd, 0xef]);
        let mut out = Vec::new();
        write_entry(&mut out, "R", "L", &frame).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(body_of(&text), vec!["00000000 abcd ef", ""]);
    }

    #[test]
    fn test_recorder_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ntee_output");

        let mut rec = HexRecorder::create(&path).unwrap();
        rec.record("L", "R", &Frame::captured(Side::R, b"hi".to_vec())).unwrap();
        rec.shutdown().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("from: L to: R\n00000000 6869\n\n"));
    }
}
