use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::codec::write_record;
use super::recorder::Recorder;
use super::types::Frame;
use crate::error_handling::types::CaptureError;

/// Persists every chunk as a capture record, readable by the player.
pub struct BinaryRecorder {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    records: u64,
}

impl BinaryRecorder {
    /// Creates (or truncates) the capture file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| CaptureError::OpenFailed(path.clone(), e))?;
        info!("Binary capture will be written to {}", path.display());
        Ok(Self {
            path,
            out: Some(BufWriter::new(file)),
            records: 0,
        })
    }
}

impl Recorder for BinaryRecorder {
    fn record(&mut self, _from: &str, _to: &str, frame: &Frame) -> Result<(), CaptureError> {
        let out = self.out.as_mut().ok_or_else(|| {
            CaptureError::IoError(std::io::Error::other("binary recorder already shut down"))
        })?;
        write_record(out, frame.direction(), frame.payload())?;
        self.records += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), CaptureError> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
            debug!("{} records written to {}", self.records, self.path.display());
        }
        Ok(())
    }

    fn label(&self) -> &str {
        "binary"
    }
}
