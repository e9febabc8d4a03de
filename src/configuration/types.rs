use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Transport used between the relay and the L side.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    #[value(name = "tcp")]
    TCP,
    #[value(name = "udp")]
    UDP,
}

/// Which recorders get attached to a relay session.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordingMode {
    #[default]
    Both,
    BinaryOnly,
    HexOnly,
}

impl RecordingMode {
    pub fn wants_binary(&self) -> bool {
        !matches!(self, RecordingMode::HexOnly)
    }

    pub fn wants_hex(&self) -> bool {
        !matches!(self, RecordingMode::BinaryOnly)
    }
}

/// The side of a captured session the player stands in for.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PlayerRole {
    /// Connects out, like the spawned R side program did.
    Client,
    /// Listens and accepts one connection, like the L side program did.
    Server,
}
