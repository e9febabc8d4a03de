use env_logger::{Builder, Env};

/// Level used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Logger setup shared by the binaries.
///
/// `RUST_LOG` replaces the default filter entirely, so a bare `trace`
/// raises every module to TRACE.
pub fn log_builder() -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or(DEFAULT_LOG_FILTER));
    builder.format_target(false);
    builder
}
