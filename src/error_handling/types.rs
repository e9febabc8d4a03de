use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    MissingPeer,
    MissingCommand,
    ConflictingRecorders,
    BadPort(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::MissingPeer => write!(f, "L side host and port are required (-L <host> <port>)"),
            ConfigError::MissingCommand => write!(f, "R side command is required (-R <cmd> [args...])"),
            ConfigError::ConflictingRecorders => {
                write!(f, "--binary-only and --hex-only are mutually exclusive")
            }
            ConfigError::BadPort(e) => write!(f, "Port error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum NetworkError {
    ResolveFailed(String, io::Error),
    NoAddress(String),
    BindError(io::Error),
    AcceptFailed(io::Error),
    ConnectFailed(String, io::Error),
    SockError(io::Error),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::ResolveFailed(host, e) => write!(f, "Unable to resolve {}: {}", host, e),
            NetworkError::NoAddress(host) => write!(f, "No usable address for {}", host),
            NetworkError::BindError(e) => write!(f, "Network bind error: {}", e),
            NetworkError::AcceptFailed(e) => write!(f, "Accept failed: {}", e),
            NetworkError::ConnectFailed(peer, e) => write!(f, "Connection to {} failed: {}", peer, e),
            NetworkError::SockError(e) => write!(f, "Socket error: {}", e),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Failure of one of the reliable I/O primitives.
///
/// Both variants carry the number of bytes that did make it across before
/// the failure so callers can report partial progress.
#[derive(Debug)]
pub enum TransferError {
    PartialWrite { sent: usize, source: io::Error },
    ReadFailed { received: usize, source: io::Error },
}

impl TransferError {
    pub fn io_error(&self) -> &io::Error {
        match self {
            TransferError::PartialWrite { source, .. } => source,
            TransferError::ReadFailed { source, .. } => source,
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::PartialWrite { sent, source } => {
                write!(f, "Write aborted after {} bytes: {}", sent, source)
            }
            TransferError::ReadFailed { received, source } => {
                write!(f, "Read failed after {} bytes: {}", received, source)
            }
        }
    }
}

impl std::error::Error for TransferError {}

#[derive(Debug)]
pub enum CaptureError {
    IoError(io::Error),
    OpenFailed(PathBuf, io::Error),
    InvalidDirection(u8),
    PayloadTooLarge(usize),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::IoError(e) => write!(f, "Capture IO error: {}", e),
            CaptureError::OpenFailed(path, e) => {
                write!(f, "Unable to open capture file {}: {}", path.display(), e)
            }
            CaptureError::InvalidDirection(tag) => {
                write!(f, "Invalid direction tag 0x{:02x} in capture record", tag)
            }
            CaptureError::PayloadTooLarge(len) => {
                write!(f, "Payload of {} bytes does not fit a capture record", len)
            }
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<io::Error> for CaptureError {
    fn from(err: io::Error) -> Self {
        CaptureError::IoError(err)
    }
}

#[derive(Debug)]
pub enum SignalError {
    InvalidSignal(i32),
    InstallFailed(i32, io::Error),
    RegistryPoisoned,
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalError::InvalidSignal(sig) => write!(f, "Signal {} cannot be trapped", sig),
            SignalError::InstallFailed(sig, e) => {
                write!(f, "Unable to install dispatch for signal {}: {}", sig, e)
            }
            SignalError::RegistryPoisoned => write!(f, "Signal registry lock poisoned"),
        }
    }
}

impl std::error::Error for SignalError {}

#[derive(Debug)]
pub enum ProcessError {
    EmptyCommand,
    SpawnFailed(String, io::Error),
    SignalError(SignalError),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::EmptyCommand => write!(f, "Child command is empty"),
            ProcessError::SpawnFailed(cmd, e) => write!(f, "Unable to start {}: {}", cmd, e),
            ProcessError::SignalError(e) => write!(f, "Child reaping setup failed: {}", e),
        }
    }
}

impl std::error::Error for ProcessError {}

impl From<SignalError> for ProcessError {
    fn from(err: SignalError) -> Self {
        ProcessError::SignalError(err)
    }
}

#[derive(Debug)]
pub enum RelayError {
    ConfigurationError(ConfigError),
    NetworkError(NetworkError),
    ProcessError(ProcessError),
    CaptureError(CaptureError),
    PollFailed(io::Error),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            RelayError::NetworkError(e) => write!(f, "Network error: {}", e),
            RelayError::ProcessError(e) => write!(f, "Process error: {}", e),
            RelayError::CaptureError(e) => write!(f, "Capture error: {}", e),
            RelayError::PollFailed(e) => write!(f, "Readiness wait failed: {}", e),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<ConfigError> for RelayError {
    fn from(err: ConfigError) -> Self {
        RelayError::ConfigurationError(err)
    }
}

impl From<NetworkError> for RelayError {
    fn from(err: NetworkError) -> Self {
        RelayError::NetworkError(err)
    }
}

impl From<ProcessError> for RelayError {
    fn from(err: ProcessError) -> Self {
        RelayError::ProcessError(err)
    }
}

impl From<CaptureError> for RelayError {
    fn from(err: CaptureError) -> Self {
        RelayError::CaptureError(err)
    }
}

#[derive(Debug)]
pub enum ReplayError {
    NetworkError(NetworkError),
    CaptureError(CaptureError),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::NetworkError(e) => write!(f, "Network error: {}", e),
            ReplayError::CaptureError(e) => write!(f, "Capture error: {}", e),
        }
    }
}

impl std::error::Error for ReplayError {}

impl From<NetworkError> for ReplayError {
    fn from(err: NetworkError) -> Self {
        ReplayError::NetworkError(err)
    }
}

impl From<CaptureError> for ReplayError {
    fn from(err: CaptureError) -> Self {
        ReplayError::CaptureError(err)
    }
}
