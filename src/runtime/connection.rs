//! Per-connection state owned by the registry.

use crate::runtime::registry::{Socket, SocketId};
use mio::net::TcpStream;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

/// A single admitted client connection.
#[derive(Debug)]
pub struct Connection {
    /// Non-blocking stream, registered with the poller.
    pub stream: TcpStream,
    /// Remote address reported by accept.
    pub peer: SocketAddr,
    admitted_at: Instant,
    bytes_echoed: u64,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            admitted_at: Instant::now(),
            bytes_echoed: 0,
        }
    }

    /// Record bytes sent back to the peer.
    pub fn record_echo(&mut self, n: usize) {
        self.bytes_echoed += n as u64;
    }

    pub fn bytes_echoed(&self) -> u64 {
        self.bytes_echoed
    }

    /// Time since admission.
    pub fn age(&self) -> Duration {
        self.admitted_at.elapsed()
    }
}

impl Socket for Connection {
    fn id(&self) -> SocketId {
        SocketId(self.stream.as_raw_fd())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener as StdTcpListener, TcpStream as StdTcpStream};

    #[test]
    fn test_connection_bookkeeping() {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let _client = StdTcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, peer) = listener.accept().unwrap();
        let fd = accepted.as_raw_fd();

        let mut conn = Connection::new(TcpStream::from_std(accepted), peer);
        assert_eq!(conn.id(), SocketId(fd));
        assert_eq!(conn.bytes_echoed(), 0);

        conn.record_echo(4);
        conn.record_echo(6);
        assert_eq!(conn.bytes_echoed(), 10);
        assert!(conn.age() < Duration::from_secs(60));
    }
}
