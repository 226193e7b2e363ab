//! Error types for setup, admission, and the reactor loop.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Fatal startup failures while preparing the listening socket.
#[derive(Debug)]
pub enum SetupError {
    SocketCreation(io::Error),
    Bind(SocketAddr, io::Error),
    Listen(io::Error),
    NonBlocking(io::Error),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::SocketCreation(e) => write!(f, "socket() failed: {e}"),
            SetupError::Bind(addr, e) => write!(f, "bind() to {addr} failed: {e}"),
            SetupError::Listen(e) => write!(f, "listen() failed: {e}"),
            SetupError::NonBlocking(e) => write!(f, "failed to set non-blocking mode: {e}"),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SetupError::SocketCreation(e)
            | SetupError::Bind(_, e)
            | SetupError::Listen(e)
            | SetupError::NonBlocking(e) => Some(e),
        }
    }
}

/// Recoverable refusal of one accepted connection.
#[derive(Debug)]
pub enum Rejected {
    CapacityExceeded { capacity: usize },
    Association(io::Error),
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::CapacityExceeded { capacity } => {
                write!(f, "connection limit of {capacity} reached")
            }
            Rejected::Association(e) => write!(f, "failed to register socket: {e}"),
        }
    }
}

impl std::error::Error for Rejected {}

/// Fatal reactor failures; these stop the server.
#[derive(Debug)]
pub enum ReactorError {
    Setup(SetupError),
    Poll(io::Error),
    Accept(io::Error),
    Wait(io::Error),
}

impl fmt::Display for ReactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorError::Setup(e) => write!(f, "{e}"),
            ReactorError::Poll(e) => write!(f, "failed to create poll instance: {e}"),
            ReactorError::Accept(e) => write!(f, "accept() failed: {e}"),
            ReactorError::Wait(e) => write!(f, "readiness wait failed: {e}"),
        }
    }
}

impl std::error::Error for ReactorError {}

impl From<SetupError> for ReactorError {
    fn from(e: SetupError) -> Self {
        ReactorError::Setup(e)
    }
}

/// Why a connection was torn down. Never propagated; logged at close.
#[derive(Debug)]
pub enum CloseReason {
    /// Peer sent EOF.
    PeerClosed,
    /// Hang-up or error condition reported by the poller.
    Hangup,
    ReadError(io::Error),
    WriteError(io::Error),
    /// Send accepted zero bytes.
    WriteZero,
    /// Querying the socket's error state failed or returned an error.
    QueryFailed(io::Error),
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::Hangup => write!(f, "hang-up"),
            CloseReason::ReadError(e) => write!(f, "recv failed: {e}"),
            CloseReason::WriteError(e) => write!(f, "send failed: {e}"),
            CloseReason::WriteZero => write!(f, "send returned 0"),
            CloseReason::QueryFailed(e) => write!(f, "socket error: {e}"),
            CloseReason::Shutdown => write!(f, "server shutdown"),
        }
    }
}
