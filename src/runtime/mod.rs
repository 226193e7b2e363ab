//! Single-threaded readiness runtime.
//!
//! Built on mio (epoll on Linux, kqueue on macOS):
//! - `Listener`: bound non-blocking socket producing accepted streams
//! - `admission`: the only path into the `Registry`
//! - `Registry`: socket <-> event handle views bounded by `MAX_WAIT_EVENTS`
//! - `Reactor`: bounded wait, condition enumeration, dispatch
//! - `handlers`: echo on read, no-op on write, teardown on close

mod admission;
mod connection;
mod error;
mod handlers;
mod listener;
mod reactor;
mod readiness;
mod registry;
mod wait_set;

pub use error::ReactorError;
pub use listener::Listener;
pub use reactor::{Reactor, ReactorOptions};

use crate::config::Config;
use tracing::warn;

/// Bind the listener and run the reactor until shutdown.
pub fn run(config: &Config) -> Result<(), ReactorError> {
    let listener = Listener::bind(config.host, config.port)?;
    let mut reactor: Reactor = Reactor::new(listener, ReactorOptions::from(config))?;

    let shutdown = reactor.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || shutdown.shutdown()) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    reactor.run()
}
