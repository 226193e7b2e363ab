//! event-echo: a single-threaded TCP echo server.
//!
//! Accepted connections are registered with the OS readiness poller and
//! served from one reactor loop:
//! - At most 64 simultaneous connections; extra connections are closed
//!   immediately after accept
//! - Every byte received is sent straight back, no framing
//! - Configuration via CLI arguments or TOML file

mod config;
mod runtime;

use config::{Config, ConfigError};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(ConfigError::Usage(e)) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        wait_timeout_ms = config.wait_timeout.as_millis() as u64,
        idle_sleep_ms = config.idle_sleep.as_millis() as u64,
        buffer_size = config.buffer_size,
        "Starting event-echo server"
    );

    match runtime::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
