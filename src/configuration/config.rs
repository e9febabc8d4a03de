use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Service port value asking the kernel to pick a free port.
pub const WILDCARD_PORT: u16 = 0;

/// Interface the relay's own service binds to unless told otherwise.
pub const DEFAULT_SERVICE_HOST: &str = "127.0.0.1";

/// Base path of the recordings unless `-o` is given.
pub const DEFAULT_OUTPUT: &str = "ntee_output";

/// Extension appended to the output path for the binary capture file.
pub const BINARY_EXTENSION: &str = ".bdr";

const HELP: &str = "\
ntee sits between two programs communicating through sockets. As traffic
passes between program L and program R, ntee records the data being sent
for later analysis or playback.

   +---+                           +------+                         +---+
   | L |---listen---><---connect---| ntee |----fork/exec----------->| R |
   |___|                           |______|---listen--><--connect---|___|

The R command may contain the placeholders @NTEEPORT, @NTEESERVERHOSTADDR
and @NTEESERVERHOSTNAME. They are replaced with the port, address and host
name of the service ntee opened for R to connect to.

-R must be the last option: everything after it belongs to the R command.";

/// Fully resolved relay configuration.
///
/// Produced either from the command line alone or from a TOML file with the
/// command line layered on top. Field names double as the TOML keys:
///
/// ```toml
/// protocol = "tcp"
/// service_host = "127.0.0.1"
/// service_port = 0
/// output = "ntee_output"
/// left_host = "localhost"
/// left_port = 7000
/// command = ["client", "--port", "@NTEEPORT"]
/// recording = "both"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Transport used to reach the L side
    pub protocol: Protocol,
    /// Interface the relay service binds to for R to connect on
    pub service_host: String,
    /// Port of the relay service, `0` lets the kernel choose
    pub service_port: u16,
    /// Transcript path; the binary capture gets [`BINARY_EXTENSION`] appended
    pub output: PathBuf,
    pub left_host: Option<String>,
    pub left_port: Option<u16>,
    /// R side command line, placeholders still unexpanded
    pub command: Vec<String>,
    pub recording: RecordingMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            protocol: Protocol::TCP,
            service_host: DEFAULT_SERVICE_HOST.to_string(),
            service_port: WILDCARD_PORT,
            output: PathBuf::from(DEFAULT_OUTPUT),
            left_host: None,
            left_port: None,
            command: Vec::new(),
            recording: RecordingMode::Both,
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Checks that everything the relay needs before touching the network
    /// is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.left_host, self.left_port) {
            (Some(host), Some(_)) if !host.is_empty() => {}
            _ => return Err(ConfigError::MissingPeer),
        }
        if self.command.is_empty() || self.command[0].is_empty() {
            return Err(ConfigError::MissingCommand);
        }
        Ok(())
    }

    /// Host and port of the L side, if configured.
    pub fn left_peer(&self) -> Option<(&str, u16)> {
        match (&self.left_host, self.left_port) {
            (Some(host), Some(port)) => Some((host.as_str(), port)),
            _ => None,
        }
    }

    /// Path of the binary capture file written next to the transcript.
    pub fn binary_output(&self) -> PathBuf {
        let mut path = self.output.clone().into_os_string();
        path.push(BINARY_EXTENSION);
        PathBuf::from(path)
    }
}

/// Command line of the `ntee` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "ntee")]
#[command(version)]
#[command(about = "Network tee: relay and record the traffic between two programs")]
#[command(after_help = HELP)]
pub struct RelayArgs {
    /// TOML file providing base settings; other flags override it
    #[arg(short = 'c', long = "config")]
    pub config_file: Option<PathBuf>,

    /// Path where the recordings are written
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Transport used to reach the L side; R always connects over TCP
    #[arg(long = "sock", value_enum)]
    pub protocol: Option<Protocol>,

    /// Port ntee serves R on, for R programs with a hardcoded port
    #[arg(short = 'p', long = "port")]
    pub service_port: Option<u16>,

    /// Name or address ntee's service binds to
    #[arg(short = 'H', long = "host")]
    pub service_host: Option<String>,

    /// Only write the binary capture file
    #[arg(long = "binary-only", action = clap::ArgAction::SetTrue)]
    pub binary_only: bool,

    /// Only write the hex dump transcript
    #[arg(long = "hex-only", action = clap::ArgAction::SetTrue)]
    pub hex_only: bool,

    /// Address and port of the L side program
    #[arg(short = 'L', num_args = 2, value_names = ["HOST", "PORT"])]
    pub left: Option<Vec<String>>,

    /// R side command and its arguments; must come last
    #[arg(short = 'R', num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
    pub command: Option<Vec<String>>,
}

impl RelayArgs {
    /// Merges the command line over the optional configuration file and
    /// validates the result.
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let mut settings = match &self.config_file {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        if let Some(output) = self.output {
            settings.output = output;
        }
        if let Some(protocol) = self.protocol {
            settings.protocol = protocol;
        }
        if let Some(port) = self.service_port {
            settings.service_port = port;
        }
        if let Some(host) = self.service_host {
            settings.service_host = host;
        }

        match (self.binary_only, self.hex_only) {
            (true, true) => return Err(ConfigError::ConflictingRecorders),
            (true, false) => settings.recording = RecordingMode::BinaryOnly,
            (false, true) => settings.recording = RecordingMode::HexOnly,
            (false, false) => {}
        }

        if let Some(left) = self.left {
            if let [host, port] = left.as_slice() {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| ConfigError::BadPort(format!("{}: {}", port, e)))?;
                settings.left_host = Some(host.clone());
                settings.left_port = Some(port);
            }
        }
        if let Some(command) = self.command {
            settings.command = command;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Result<Settings, ConfigError> {
        RelayArgs::try_parse_from(args)
            .unwrap_or_else(|e| panic!("{}", e))
            .into_settings()
    }

    #[test]
    fn test_defaults_from_args() {
        let settings = parse(&["ntee", "-L", "localhost", "7000", "-R", "client", "@NTEEPORT"]).unwrap();

        assert_eq!(settings.protocol, Protocol::TCP);
        assert_eq!(settings.service_host, DEFAULT_SERVICE_HOST);
        assert_eq!(settings.service_port, WILDCARD_PORT);
        assert_eq!(settings.output, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(settings.left_peer(), Some(("localhost", 7000)));
        assert_eq!(settings.command, vec!["client", "@NTEEPORT"]);
        assert_eq!(settings.recording, RecordingMode::Both);
    }

    #[test]
    fn test_full_command_line() {
        let settings = parse(&[
            "ntee", "-o", "/tmp/session", "--sock", "udp", "-p", "5555", "-H", "0.0.0.0",
            "--binary-only", "-L", "10.0.0.1", "9000", "-R", "client", "@NTEESERVERHOSTNAME",
            "@NTEEPORT",
        ])
        .unwrap();

        assert_eq!(settings.protocol, Protocol::UDP);
        assert_eq!(settings.service_port, 5555);
        assert_eq!(settings.service_host, "0.0.0.0");
        assert_eq!(settings.recording, RecordingMode::BinaryOnly);
        assert_eq!(settings.binary_output(), PathBuf::from("/tmp/session.bdr"));
        assert_eq!(settings.command, vec!["client", "@NTEESERVERHOSTNAME", "@NTEEPORT"]);
    }

    #[test]
    fn test_missing_peer_is_rejected() {
        let err = parse(&["ntee", "-R", "client"]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPeer));
    }

    #[test]
    fn test_missing_command_is_rejected() {
        let err = parse(&["ntee", "-L", "localhost", "7000"]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCommand));
    }

    #[test]
    fn test_bad_left_port_is_rejected() {
        let err = parse(&["ntee", "-L", "localhost", "seventy", "-R", "client"]).unwrap_err();
        assert!(matches!(err, ConfigError::BadPort(_)));
    }

    #[test]
    fn test_conflicting_recorders() {
        let err = parse(&[
            "ntee", "--binary-only", "--hex-only", "-L", "localhost", "7000", "-R", "client",
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingRecorders));
    }

    #[test]
    fn test_config_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
protocol = "udp"
service_port = 4000
left_host = "peer.example"
left_port = 8080
command = ["client", "@NTEEPORT"]
recording = "hex-only"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let settings = parse(&["ntee", "-c", &path, "-p", "4100"]).unwrap();

        assert_eq!(settings.protocol, Protocol::UDP);
        assert_eq!(settings.service_port, 4100);
        assert_eq!(settings.service_host, DEFAULT_SERVICE_HOST);
        assert_eq!(settings.left_peer(), Some(("peer.example", 8080)));
        assert_eq!(settings.recording, RecordingMode::HexOnly);
    }

    #[test]
    fn test_broken_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "service_port = \"not a number\"").unwrap();

        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }
}
