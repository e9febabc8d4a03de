use super::types::PlayerRole;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

const HELP: &str = "\
Acts as either a client or a server and plays back the data recorded in an
ntee binary capture file (.bdr).

  --client  connects to <host> <port> and plays the data the R side sent
  --server  listens on <host> <port>, accepts one connection and plays the
            data the L side sent

Frames sent by the other side are awaited and their sizes compared with the
recording. Differences are reported but do not stop the playback.";

/// Options for one replay run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub role: PlayerRole,
    pub host: String,
    pub port: u16,
    pub file: PathBuf,
}

/// Command line of the `ntee_player` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "ntee_player")]
#[command(version)]
#[command(about = "Play back an ntee capture against a live peer")]
#[command(after_help = HELP)]
#[command(group(ArgGroup::new("role").required(true).args(["client", "server"])))]
pub struct PlayerArgs {
    /// Connect to <host> <port> and play the client's data
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub client: bool,

    /// Listen on <host> <port> and play the server's data
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub server: bool,

    /// Symbolic or IP address to use
    pub host: String,

    pub port: u16,

    /// ntee binary capture file to play back
    pub datafile: PathBuf,
}

impl From<PlayerArgs> for PlayerConfig {
    fn from(args: PlayerArgs) -> Self {
        let role = if args.server {
            PlayerRole::Server
        } else {
            PlayerRole::Client
        };
        Self {
            role,
            host: args.host,
            port: args.port,
            file: args.datafile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_role() {
        let args = PlayerArgs::try_parse_from(["ntee_player", "--client", "localhost", "7000", "run.bdr"])
            .unwrap_or_else(|e| panic!("{}", e));
        let config = PlayerConfig::from(args);

        assert_eq!(config.role, PlayerRole::Client);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 7000);
        assert_eq!(config.file, PathBuf::from("run.bdr"));
    }

    #[test]
    fn test_server_role() {
        let args = PlayerArgs::try_parse_from(["ntee_player", "--server", "0.0.0.0", "9000", "run.bdr"])
            .unwrap_or_else(|e| panic!("{}", e));
        assert_eq!(PlayerConfig::from(args).role, PlayerRole::Server);
    }

    #[test]
    fn test_role_is_required_and_exclusive() {
        assert!(PlayerArgs::try_parse_from(["ntee_player", "localhost", "7000", "run.bdr"]).is_err());
        assert!(PlayerArgs::try_parse_from([
            "ntee_player", "--client", "--server", "localhost", "7000", "run.bdr",
        ])
        .is_err());
    }

    #[test]
    fn test_port_must_be_numeric() {
        assert!(PlayerArgs::try_parse_from(["ntee_player", "--client", "localhost", "http", "run.bdr"]).is_err());
    }
}
