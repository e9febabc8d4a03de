use std::io;
use std::mem;

use log::{debug, error, info, trace};
use uuid::Uuid;

use crate::data_capture::{Frame, Recorder, Side};
use crate::error_handling::types::{NetworkError, RelayError, TransferError};
use crate::network::{poll_ready, read_available, write_all, Endpoint};

const BUFFER_SIZE: usize = 16 * 1024;
const PREVIEW_LEN: usize = 64;

/// Per-session transfer counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub chunks: u64,
    pub bytes_to_l: u64,
    pub bytes_to_r: u64,
}

/// Moves bytes between the L and R endpoints until both have finished
/// sending, handing every chunk to the attached recorders.
pub struct Forwarder {
    session_id: Uuid,
    recorders: Vec<Box<dyn Recorder>>,
    buf: Vec<u8>,
    stats: ForwardStats,
}

fn index(side: Side) -> usize {
    match side {
        Side::L => 0,
        Side::R => 1,
    }
}

impl Forwarder {
    pub fn new(session_id: Uuid, recorders: Vec<Box<dyn Recorder>>) -> Self {
        Self {
            session_id,
            recorders,
            buf: vec![0u8; BUFFER_SIZE],
            stats: ForwardStats::default(),
        }
    }

    pub fn stats(&self) -> &ForwardStats {
        &self.stats
    }

    /// Runs the readiness loop.
    ///
    /// A side that reports end-of-stream stops being watched and its peer's
    /// write direction is shut down; the loop returns once neither side has
    /// anything left to send. Signal delivery during the wait is retried.
    pub fn run(&mut self, left: &mut Endpoint, right: &mut Endpoint) -> Result<ForwardStats, RelayError> {
        left.set_nonblocking(true).map_err(NetworkError::SockError)?;
        right.set_nonblocking(true).map_err(NetworkError::SockError)?;

        let mut watching = [true, true];
        info!("[{}] Forwarding between {} and {}", self.session_id, left.name(), right.name());

        loop {
            let mut fds = Vec::with_capacity(2);
            let mut sides = Vec::with_capacity(2);
            for (side, endpoint) in [(Side::L, &*left), (Side::R, &*right)] {
                if !watching[index(side)] {
                    continue;
                }
                match endpoint.raw_fd() {
                    Some(fd) => {
                        fds.push(libc::pollfd {
                            fd,
                            events: libc::POLLIN,
                            revents: 0,
                        });
                        sides.push(side);
                    }
                    None => watching[index(side)] = false,
                }
            }
            if fds.is_empty() {
                break;
            }

            match poll_ready(&mut fds, -1) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    debug!("[{}] Readiness wait interrupted, retrying", self.session_id);
                    continue;
                }
                Err(e) => return Err(RelayError::PollFailed(e)),
            }

            for (pfd, side) in fds.iter().zip(sides) {
                if pfd.revents == 0 {
                    continue;
                }
                let (source, destination) = match side {
                    Side::L => (&mut *left, &mut *right),
                    Side::R => (&mut *right, &mut *left),
                };
                if pfd.revents & libc::POLLNVAL != 0 {
                    watching[index(side)] = false;
                    continue;
                }
                if !self.service(source, destination, side.opposite()) {
                    watching[index(side)] = false;
                }
            }
        }

        info!(
            "[{}] Forwarding finished: {} chunks, {} bytes to L, {} bytes to R",
            self.session_id, self.stats.chunks, self.stats.bytes_to_l, self.stats.bytes_to_r
        );
        Ok(self.stats.clone())
    }

    /// Handles a readiness event on `source`. Returns false once `source`
    /// has nothing more to send.
    ///
    /// `source` may have been closed earlier in the same pass after a failed
    /// write toward it; it is then finished without being read.
    pub(super) fn service(&mut self, source: &mut Endpoint, destination: &mut Endpoint, toward: Side) -> bool {
        if source.is_open() {
            return self.transfer(source, destination, toward);
        }
        debug!(
            "[{}] {} is closed; shutting {}'s write side",
            self.session_id,
            source.name(),
            destination.name()
        );
        if let Err(e) = destination.shutdown_write() {
            debug!("[{}] shutdown_write on {}: {}", self.session_id, destination.name(), e);
        }
        false
    }

    /// Forwards one chunk from `source` to `destination`, which is the
    /// `toward` side. Returns false once `source` has nothing more to send.
    fn transfer(&mut self, source: &mut Endpoint, destination: &mut Endpoint, toward: Side) -> bool {
        let (n, open) = if source.is_datagram() {
            // One datagram per event keeps message boundaries intact.
            match source.receive(&mut self.buf) {
                Ok(n) => (n, n > 0),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) => {
                    error!("[{}] Receive from {} failed: {}", self.session_id, source.name(), e);
                    (0, false)
                }
            }
        } else {
            match read_available(source, &mut self.buf) {
                Ok(n) => (n, n > 0),
                Err(TransferError::ReadFailed { received: 0, source: ref err })
                    if err.kind() == io::ErrorKind::WouldBlock =>
                {
                    return true
                }
                Err(e) => {
                    error!("[{}] Read from {} failed: {}", self.session_id, source.name(), e);
                    let received = match e {
                        TransferError::ReadFailed { received, .. } => received,
                        TransferError::PartialWrite { .. } => 0,
                    };
                    (received, false)
                }
            }
        };

        if n > 0 {
            self.forward_chunk(source.name(), destination, toward, n);
        }

        if !open {
            debug!(
                "[{}] {} finished sending; closing its read side and {}'s write side",
                self.session_id,
                source.name(),
                destination.name()
            );
            if let Err(e) = source.shutdown_read() {
                debug!("[{}] shutdown_read on {}: {}", self.session_id, source.name(), e);
            }
            if let Err(e) = destination.shutdown_write() {
                debug!("[{}] shutdown_write on {}: {}", self.session_id, destination.name(), e);
            }
        }
        open
    }

    fn forward_chunk(&mut self, from: &str, destination: &mut Endpoint, toward: Side, n: usize) {
        let chunk = &self.buf[..n];
        if destination.is_open() {
            if let Err(e) = write_all(destination, chunk) {
                error!(
                    "[{}] Write to {} failed: {}; closing it",
                    self.session_id,
                    destination.name(),
                    e
                );
                destination.close();
            }
        }

        self.stats.chunks += 1;
        match toward {
            Side::L => self.stats.bytes_to_l += n as u64,
            Side::R => self.stats.bytes_to_r += n as u64,
        }

        let preview = &chunk[..n.min(PREVIEW_LEN)];
        trace!(
            "[{}] {} -> {} {} bytes: {}{}",
            self.session_id,
            from,
            destination.name(),
            n,
            String::from_utf8_lossy(preview),
            if n > PREVIEW_LEN { " ..." } else { "" }
        );

        let frame = Frame::captured(toward, chunk.to_vec());
        let to = destination.name().to_string();
        self.fan_out(from, &to, &frame);
    }

    fn fan_out(&mut self, from: &str, to: &str, frame: &Frame) {
        for recorder in self.recorders.iter_mut() {
            if let Err(e) = recorder.record(from, to, frame) {
                error!(
                    "[{}] {} recorder failed to record {} bytes: {}",
                    self.session_id,
                    recorder.label(),
                    frame.len(),
                    e
                );
            }
        }
    }

    /// Shuts every recorder down in attachment order. Later calls do
    /// nothing.
    pub fn shutdown_recorders(&mut self) {
        for mut recorder in mem::take(&mut self.recorders) {
            match recorder.shutdown() {
                Ok(()) => debug!("[{}] {} recorder shut down", self.session_id, recorder.label()),
                Err(e) => error!(
                    "[{}] {} recorder failed to shut down: {}",
                    self.session_id,
                    recorder.label(),
                    e
                ),
            }
        }
    }
}
