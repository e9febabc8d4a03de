pub mod configuration;
pub mod data_capture;
pub mod error_handling;
pub mod network;
pub mod process_management;
pub mod relay;
pub mod replay;
pub mod signal_hub;
