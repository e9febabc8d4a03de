pub mod config;
pub mod logging;
pub mod player_config;
pub mod types;

pub use config::{RelayArgs, Settings};
pub use logging::log_builder;
pub use player_config::{PlayerArgs, PlayerConfig};
pub use types::{PlayerRole, Protocol, RecordingMode};
