//! Single-threaded reactor loop.
//!
//! One thread accepts, admits, waits, and dispatches. Each pass drains the
//! listener's accept queue, then runs one bounded wait over the registered
//! sockets and dispatches whatever fired:
//!
//! ```text
//! Idle ──(registry non-empty)──> Waiting ──(notifications)──> Dispatching
//!  ^                               |  ^                            |
//!  └──────(registry empty)─────────┘  └────────────────────────────┘
//! ```

use crate::config::Config;
use crate::runtime::admission::admit;
use crate::runtime::connection::Connection;
use crate::runtime::error::{CloseReason, ReactorError};
use crate::runtime::handlers::{on_close, on_read, on_write};
use crate::runtime::listener::Listener;
use crate::runtime::readiness::{Condition, Readiness};
use crate::runtime::registry::{EventHandle, Registry, MAX_WAIT_EVENTS};
use crate::runtime::wait_set::{Notification, WaitOutcome, WaitSet, WAKE_TOKEN};
use mio::net::TcpStream;
use mio::{Poll, Waker};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Tuning for the reactor loop.
#[derive(Debug, Clone, Copy)]
pub struct ReactorOptions {
    /// Upper bound on a single readiness wait.
    pub wait_timeout: Duration,
    /// Sleep taken instead of waiting while no sockets are registered.
    pub idle_sleep: Duration,
    /// Size of the receive buffer shared by all connections.
    pub buffer_size: usize,
}

impl From<&Config> for ReactorOptions {
    fn from(config: &Config) -> Self {
        Self {
            wait_timeout: config.wait_timeout,
            idle_sleep: config.idle_sleep,
            buffer_size: config.buffer_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    Idle,
    Waiting,
    Dispatching,
}

/// Requests a reactor stop from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::Release);
        let _ = self.waker.wake();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Echo reactor holding at most `N` connections.
pub struct Reactor<const N: usize = MAX_WAIT_EVENTS> {
    poll: Poll,
    listener: Listener,
    connections: Registry<Connection, N>,
    wait_set: WaitSet<N>,
    buffer: Vec<u8>,
    options: ReactorOptions,
    shutdown: ShutdownHandle,
    state: ReactorState,
}

impl<const N: usize> Reactor<N> {
    pub fn new(listener: Listener, options: ReactorOptions) -> Result<Self, ReactorError> {
        let poll = Poll::new().map_err(ReactorError::Poll)?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN).map_err(ReactorError::Poll)?;

        Ok(Self {
            poll,
            listener,
            connections: Registry::new(),
            wait_set: WaitSet::new(),
            buffer: vec![0u8; options.buffer_size],
            options,
            shutdown: ShutdownHandle {
                requested: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
            state: ReactorState::Idle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Run until shutdown is requested or a fatal error occurs. Every
    /// remaining connection is closed on the way out.
    pub fn run(&mut self) -> Result<(), ReactorError> {
        info!(
            addr = %self.local_addr(),
            capacity = N,
            wait_timeout_ms = self.options.wait_timeout.as_millis() as u64,
            buffer_size = self.options.buffer_size,
            "Reactor started"
        );

        let result = loop {
            if self.shutdown.is_requested() {
                info!("Shutdown requested");
                break Ok(());
            }
            if let Err(e) = self.poll_once() {
                break Err(e);
            }
        };

        self.close_all();
        result
    }

    /// One pass: drain pending accepts, then one reactor iteration.
    pub fn poll_once(&mut self) -> Result<(), ReactorError> {
        self.accept_pending()?;
        self.turn()
    }

    /// Accept queued connections, at most `N + 1` per pass so a connect flood
    /// cannot starve dispatch.
    fn accept_pending(&mut self) -> Result<(), ReactorError> {
        for _ in 0..=N {
            match self.listener.accept() {
                Ok(Some((stream, peer))) => self.on_accept(stream, peer),
                Ok(None) => break,
                Err(ref e) if is_transient_accept_error(e) => {
                    debug!(error = %e, "Transient accept error");
                }
                Err(e) => return Err(ReactorError::Accept(e)),
            }
        }
        Ok(())
    }

    fn on_accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        if let Err((rejected, stream)) =
            admit(self.poll.registry(), &mut self.connections, stream, peer)
        {
            warn!(peer = %peer, reason = %rejected, "Connection rejected");
            drop(stream);
        }
    }

    /// One reactor iteration: sleep while idle, otherwise wait once and
    /// dispatch everything that fired.
    pub fn turn(&mut self) -> Result<(), ReactorError> {
        if self.connections.is_empty() {
            self.set_state(ReactorState::Idle);
            thread::sleep(self.options.idle_sleep);
            return Ok(());
        }

        self.set_state(ReactorState::Waiting);
        let ready = match self
            .wait_set
            .wait(&mut self.poll, self.options.wait_timeout)
            .map_err(ReactorError::Wait)?
        {
            WaitOutcome::TimedOut => return Ok(()),
            WaitOutcome::Woken(n) | WaitOutcome::Ready(n) => n,
        };

        self.set_state(ReactorState::Dispatching);
        for idx in 0..ready {
            if let Some(notification) = self.wait_set.get(idx) {
                self.dispatch(notification);
            }
        }
        self.set_state(ReactorState::Waiting);
        Ok(())
    }

    fn dispatch(&mut self, notification: Notification) {
        let handle = notification.handle;

        // Both views must agree, otherwise the handle is stale.
        let resolved = self
            .connections
            .resolve(handle)
            .filter(|id| self.connections.handle_of(*id) == Some(handle));
        let Some(socket) = resolved else {
            warn!(handle = %handle, "Stale event handle, skipping");
            return;
        };

        let readiness = match self.query_conditions(handle, notification.readiness) {
            Ok(readiness) => readiness,
            Err(reason) => {
                on_close(self.poll.registry(), &mut self.connections, handle, reason);
                return;
            }
        };
        if readiness.is_empty() {
            return;
        }
        trace!(handle = %handle, socket = %socket, ?readiness, "Dispatching");

        for condition in readiness.iter() {
            match condition {
                Condition::Read => on_read(
                    self.poll.registry(),
                    &mut self.connections,
                    handle,
                    &mut self.buffer,
                ),
                Condition::Write => on_write(&self.connections, handle),
                Condition::Closed => {
                    on_close(
                        self.poll.registry(),
                        &mut self.connections,
                        handle,
                        CloseReason::Hangup,
                    );
                }
            }
        }
    }

    /// Check the socket's pending error state before trusting the reported
    /// conditions. A failed query or a pending error means close.
    fn query_conditions(
        &self,
        handle: EventHandle,
        reported: Readiness,
    ) -> Result<Readiness, CloseReason> {
        let Some(conn) = self.connections.get(handle) else {
            return Ok(Readiness::EMPTY);
        };
        match conn.stream.take_error() {
            Ok(None) => Ok(reported),
            Ok(Some(e)) | Err(e) => Err(CloseReason::QueryFailed(e)),
        }
    }

    fn close_all(&mut self) {
        let count = self.connection_count();
        for handle in self.connections.handles() {
            on_close(
                self.poll.registry(),
                &mut self.connections,
                handle,
                CloseReason::Shutdown,
            );
        }
        info!(closed = count, "Reactor stopped");
    }

    fn set_state(&mut self, state: ReactorState) {
        if self.state != state {
            trace!(from = ?self.state, to = ?state, "Reactor state");
            self.state = state;
        }
    }
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}
