use std::io::{self, Read};

use log::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::configuration::{PlayerConfig, PlayerRole, Protocol};
use crate::data_capture::{CaptureReader, Side};
use crate::error_handling::types::ReplayError;
use crate::network::{write_all, Endpoint, ResolvedAddress, ServiceEndpoint, WriteReady};

/// Largest chunk taken off the connection per expected frame.
const RECEIVE_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    Connecting,
    Playing,
    Terminated(ReplayOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub outcome: ReplayOutcome,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub mismatches: u64,
}

impl ReplayReport {
    fn new() -> Self {
        Self {
            outcome: ReplayOutcome::Success,
            frames_sent: 0,
            frames_received: 0,
            mismatches: 0,
        }
    }

    fn failed(mut self) -> Self {
        self.outcome = ReplayOutcome::Failure;
        self
    }
}

/// Frames this role sends itself rather than waits for.
///
/// A client stands in for the R side, whose data travelled toward L; a
/// server stands in for the L side.
pub fn originated_side(role: PlayerRole) -> Side {
    match role {
        PlayerRole::Client => Side::L,
        PlayerRole::Server => Side::R,
    }
}

/// Replays a capture against a live peer.
pub struct Player {
    session_id: Uuid,
    config: PlayerConfig,
    state: ReplayState,
}

impl Player {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            config,
            state: ReplayState::Connecting,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Connects according to the role, then plays the whole capture.
    ///
    /// An unreadable capture file or a failed connection is an error; a
    /// peer that goes away mid-replay is reported as
    /// [`ReplayOutcome::Failure`].
    pub fn start(&mut self) -> Result<ReplayReport, ReplayError> {
        self.state = ReplayState::Connecting;
        let setup = CaptureReader::open(&self.config.file)
            .map_err(ReplayError::from)
            .and_then(|frames| Ok((frames, self.connect()?)));
        let (frames, mut connection) = match setup {
            Ok(ready) => ready,
            Err(e) => {
                self.state = ReplayState::Terminated(ReplayOutcome::Failure);
                return Err(e);
            }
        };

        self.state = ReplayState::Playing;
        info!(
            "[{}] Playing {} as {:?}",
            self.session_id,
            self.config.file.display(),
            self.config.role
        );
        let report = play(self.session_id, self.config.role, &mut connection, frames);
        connection.close();

        self.state = ReplayState::Terminated(report.outcome);
        info!(
            "[{}] Replay finished: {:?} ({} sent, {} received, {} mismatches)",
            self.session_id, report.outcome, report.frames_sent, report.frames_received, report.mismatches
        );
        Ok(report)
    }

    fn connect(&self) -> Result<Endpoint, ReplayError> {
        let addr = ResolvedAddress::resolve(&self.config.host, self.config.port)?;
        match self.config.role {
            PlayerRole::Client => Ok(Endpoint::connect("R", Protocol::TCP, &addr)?),
            PlayerRole::Server => {
                let service = ServiceEndpoint::listen("Player", &addr)?;
                let connection = service.accept("L")?;
                service.close();
                Ok(connection)
            }
        }
    }
}

/// Drives `connection` from `frames` until the capture or the connection
/// runs out.
///
/// Frames this role originated are sent verbatim; for every other frame one
/// chunk is received and its size compared with the recording. Size
/// differences are counted and logged but never stop the replay.
pub fn play<C, R>(
    session_id: Uuid,
    role: PlayerRole,
    connection: &mut C,
    frames: CaptureReader<R>,
) -> ReplayReport
where
    C: Read + WriteReady + ?Sized,
    R: Read,
{
    let originated = originated_side(role);
    let mut report = ReplayReport::new();
    let mut buf = vec![0u8; RECEIVE_LIMIT];

    for (index, item) in frames.enumerate() {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                error!("[{}] Capture unreadable at frame {}: {}", session_id, index, e);
                return report.failed();
            }
        };

        if frame.direction() == originated {
            if let Err(e) = write_all(connection, frame.payload()) {
                error!("[{}] Sending frame {} failed: {}", session_id, index, e);
                return report.failed();
            }
            report.frames_sent += 1;
            trace!("[{}] Sent frame {} ({} bytes)", session_id, index, frame.len());
            continue;
        }

        match receive(connection, &mut buf) {
            Ok(0) => {
                error!(
                    "[{}] Peer closed while frame {} ({} bytes) was expected",
                    session_id,
                    index,
                    frame.len()
                );
                return report.failed();
            }
            Ok(n) => {
                report.frames_received += 1;
                if n != frame.len() {
                    report.mismatches += 1;
                    warn!(
                        "[{}] Frame {}: expected {} bytes, received {}",
                        session_id,
                        index,
                        frame.len(),
                        n
                    );
                } else {
                    trace!("[{}] Received frame {} ({} bytes)", session_id, index, n);
                }
            }
            Err(e) => {
                error!("[{}] Receiving frame {} failed: {}", session_id, index, e);
                return report.failed();
            }
        }
    }

    debug!("[{}] Capture exhausted", session_id);
    report
}

fn receive<C: Read + ?Sized>(connection: &mut C, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match connection.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_capture::{write_record, BinaryRecorder, Frame, Recorder};
    use std::collections::VecDeque;
    use std::io::{Cursor, Write};
    use std::net::{TcpListener, TcpStream};
    use std::path::Path;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Peer that hands out scripted chunks and collects what it is sent.
    struct FakePeer {
        incoming: VecDeque<io::Result<Vec<u8>>>,
        sent: Vec<u8>,
    }

    impl FakePeer {
        fn new(incoming: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                incoming: incoming.into(),
                sent: Vec::new(),
            }
        }
    }

    impl Read for FakePeer {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.incoming.pop_front() {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    impl Write for FakePeer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl WriteReady for FakePeer {}

    fn capture(frames: &[(Side, &[u8])]) -> CaptureReader<Cursor<Vec<u8>>> {
        let mut out = Vec::new();
        for (side, payload) in frames {
            write_record(&mut out, *side, payload).unwrap();
        }
        CaptureReader::new(Cursor::new(out))
    }

    #[test]
    fn test_size_mismatch_is_not_fatal() {
        let frames = capture(&[(Side::L, b"hello"), (Side::R, &[7u8; 10]), (Side::L, b"bye")]);
        let mut peer = FakePeer::new(vec![Ok(vec![1u8; 8])]);

        let report = play(Uuid::new_v4(), PlayerRole::Client, &mut peer, frames);
        assert_eq!(
            report,
            ReplayReport {
                outcome: ReplayOutcome::Success,
                frames_sent: 2,
                frames_received: 1,
                mismatches: 1,
            }
        );
        assert_eq!(peer.sent, b"hellobye");
    }

    #[test]
    fn test_server_role_sends_r_frames() {
        let frames = capture(&[(Side::R, b"banner"), (Side::L, b"cmd"), (Side::R, b"ok")]);
        let mut peer = FakePeer::new(vec![
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(b"cmd".to_vec()),
        ]);

        let report = play(Uuid::new_v4(), PlayerRole::Server, &mut peer, frames);
        assert_eq!(report.outcome, ReplayOutcome::Success);
        assert_eq!(report.mismatches, 0);
        assert_eq!(peer.sent, b"bannerok");
    }

    #[test]
    fn test_peer_close_fails_replay() {
        let frames = capture(&[(Side::L, b"hello"), (Side::R, b"world"), (Side::L, b"never sent")]);
        let mut peer = FakePeer::new(vec![]);

        let report = play(Uuid::new_v4(), PlayerRole::Client, &mut peer, frames);
        assert_eq!(report.outcome, ReplayOutcome::Failure);
        assert_eq!(report.frames_sent, 1);
        assert_eq!(peer.sent, b"hello");
    }

    #[test]
    fn test_receive_error_fails_replay() {
        let frames = capture(&[(Side::R, b"world")]);
        let mut peer = FakePeer::new(vec![Err(io::Error::from(io::ErrorKind::ConnectionReset))]);

        let report = play(Uuid::new_v4(), PlayerRole::Client, &mut peer, frames);
        assert_eq!(report.outcome, ReplayOutcome::Failure);
    }

    #[test]
    fn test_invalid_tag_fails_replay() {
        let mut data = Vec::new();
        write_record(&mut data, Side::L, b"fine").unwrap();
        data.extend_from_slice(&[b'Q', 0, 0, 0, 1, 0]);
        let mut peer = FakePeer::new(vec![]);

        let report = play(Uuid::new_v4(), PlayerRole::Client, &mut peer, CaptureReader::new(Cursor::new(data)));
        assert_eq!(report.outcome, ReplayOutcome::Failure);
        assert_eq!(report.frames_sent, 1);
    }

    #[test]
    fn test_truncated_capture_ends_successfully() {
        let mut data = Vec::new();
        write_record(&mut data, Side::L, b"whole").unwrap();
        data.extend_from_slice(&[b'L', 0, 0, 0, 9, b'p', b'a']);
        let mut peer = FakePeer::new(vec![]);

        let report = play(Uuid::new_v4(), PlayerRole::Client, &mut peer, CaptureReader::new(Cursor::new(data)));
        assert_eq!(report.outcome, ReplayOutcome::Success);
        assert_eq!(peer.sent, b"whole");
    }

    #[test]
    fn test_missing_capture_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut player = Player::new(PlayerConfig {
            role: PlayerRole::Client,
            host: "127.0.0.1".to_string(),
            port: 9,
            file: dir.path().join("missing.bdr"),
        });
        assert_eq!(player.state(), ReplayState::Connecting);

        assert!(matches!(player.start(), Err(ReplayError::CaptureError(_))));
        assert_eq!(player.state(), ReplayState::Terminated(ReplayOutcome::Failure));
    }

    fn record_session(path: &Path, frames: &[(Side, &[u8])]) {
        let mut recorder = BinaryRecorder::create(path).unwrap();
        for (side, payload) in frames {
            let (from, to) = match side {
                Side::L => ("R", "L"),
                Side::R => ("L", "R"),
            };
            recorder
                .record(from, to, &Frame::captured(*side, payload.to_vec()))
                .unwrap();
        }
        recorder.shutdown().unwrap();
    }

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn test_server_role_over_loopback() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.bdr");
        record_session(&path, &[(Side::R, b"welcome"), (Side::L, b"login"), (Side::R, b"ok")]);

        let port = free_port();
        let mut player = Player::new(PlayerConfig {
            role: PlayerRole::Server,
            host: "127.0.0.1".to_string(),
            port,
            file: path,
        });
        let server = thread::spawn(move || {
            let report = player.start().unwrap();
            (report, player.state())
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut client = loop {
            match TcpStream::connect(("127.0.0.1", port)) {
                Ok(stream) => break stream,
                Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
                Err(e) => panic!("player never listened: {}", e),
            }
        };

        let mut welcome = [0u8; 7];
        client.read_exact(&mut welcome).unwrap();
        assert_eq!(&welcome, b"welcome");
        client.write_all(b"login").unwrap();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"ok");

        let (report, state) = server.join().unwrap();
        assert_eq!(report.outcome, ReplayOutcome::Success);
        assert_eq!((report.frames_sent, report.frames_received, report.mismatches), (2, 1, 0));
        assert_eq!(state, ReplayState::Terminated(ReplayOutcome::Success));
    }

    #[test]
    fn test_client_role_connect_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.bdr");
        record_session(&path, &[(Side::L, b"hi")]);

        let mut player = Player::new(PlayerConfig {
            role: PlayerRole::Client,
            host: "127.0.0.1".to_string(),
            port: free_port(),
            file: path,
        });
        assert!(matches!(player.start(), Err(ReplayError::NetworkError(_))));
        assert_eq!(player.state(), ReplayState::Terminated(ReplayOutcome::Failure));
    }
}
