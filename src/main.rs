use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use ntee::configuration::{log_builder, RelayArgs, Settings};
use ntee::data_capture::{BinaryRecorder, HexRecorder};
use ntee::error_handling::types::RelayError;
use ntee::relay::Relay;
use ntee::signal_hub::SignalHub;

fn build_relay(settings: Settings) -> Result<Relay, RelayError> {
    let binary_path = settings.binary_output();
    let hex_path = settings.output.clone();
    let recording = settings.recording;

    let mut relay = Relay::new(settings, Arc::new(SignalHub::process()));
    if recording.wants_binary() {
        relay.add_recorder(Box::new(BinaryRecorder::create(binary_path)?));
    }
    if recording.wants_hex() {
        relay.add_recorder(Box::new(HexRecorder::create(hex_path)?));
    }
    Ok(relay)
}

fn main() {
    log_builder().init();

    let settings = RelayArgs::parse().into_settings().unwrap_or_else(|e| {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    });
    info!(
        "Relaying {:?} traffic to L side {}:{}",
        settings.protocol,
        settings.left_host.as_deref().unwrap_or_default(),
        settings.left_port.unwrap_or_default()
    );

    let relay = build_relay(settings).unwrap_or_else(|e| {
        error!("Unable to set up the relay: {}", e);
        std::process::exit(1);
    });

    match relay.start() {
        Ok(summary) => info!(
            "[{}] Session complete: {} chunks, {} bytes to L, {} bytes to R",
            summary.session_id, summary.chunks, summary.bytes_to_l, summary.bytes_to_r
        ),
        Err(e) => {
            error!("Relay failed: {}", e);
            std::process::exit(1);
        }
    }
}
