//! Non-blocking listening socket.

use crate::runtime::error::SetupError;
use mio::net::{TcpListener, TcpStream};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tracing::info;

/// Bound, listening, non-blocking TCP socket.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Create, bind, and start listening on `host:port` with the OS maximum
    /// backlog.
    pub fn bind(host: Ipv4Addr, port: u16) -> Result<Self, SetupError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(host, port));

        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )
        .map_err(SetupError::SocketCreation)?;

        socket
            .set_reuse_address(true)
            .map_err(SetupError::SocketCreation)?;
        socket
            .bind(&addr.into())
            .map_err(|e| SetupError::Bind(addr, e))?;
        socket
            .listen(libc::SOMAXCONN)
            .map_err(SetupError::Listen)?;
        socket
            .set_nonblocking(true)
            .map_err(SetupError::NonBlocking)?;

        let std_listener: std::net::TcpListener = socket.into();
        let local_addr = std_listener
            .local_addr()
            .map_err(|e| SetupError::Bind(addr, e))?;

        info!(addr = %local_addr, backlog = libc::SOMAXCONN, "Server listening");

        Ok(Self {
            inner: TcpListener::from_std(std_listener),
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept one pending connection.
    ///
    /// Returns `Ok(None)` when no connection is waiting. Accepted streams are
    /// already non-blocking.
    pub fn accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        match self.inner.accept() {
            Ok(pair) => Ok(Some(pair)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
