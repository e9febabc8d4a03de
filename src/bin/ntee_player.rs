use clap::Parser;
use log::error;
use ntee::configuration::{log_builder, PlayerArgs, PlayerConfig};
use ntee::replay::{Player, ReplayOutcome};

fn main() {
    log_builder().init();

    let config = PlayerConfig::from(PlayerArgs::parse());
    let mut player = Player::new(config);

    match player.start() {
        Ok(report) if report.outcome == ReplayOutcome::Success => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            error!("Replay failed: {}", e);
            std::process::exit(1);
        }
    }
}
