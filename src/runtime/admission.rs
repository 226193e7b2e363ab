//! Admission of accepted sockets into the registry.
//!
//! This is the only path that grows the registry. A rejected stream is
//! handed back to the caller, which closes it by dropping it.

use crate::runtime::connection::Connection;
use crate::runtime::error::Rejected;
use crate::runtime::registry::{EventHandle, InsertError, Registry, SocketId};
use mio::net::TcpStream;
use mio::Interest;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use tracing::debug;

/// Associate `stream` with a fresh event handle and record it.
pub fn admit<const N: usize>(
    poll_registry: &mio::Registry,
    registry: &mut Registry<Connection, N>,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> Result<EventHandle, (Rejected, TcpStream)> {
    let id = SocketId(stream.as_raw_fd());
    if let Some(existing) = registry.handle_of(id) {
        let e = io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{id} already registered as {existing}"),
        );
        return Err((Rejected::Association(e), stream));
    }

    let handle = registry.next_handle();

    // Hang-up is reported with either interest; no separate close interest.
    if let Err(e) = poll_registry.register(
        &mut stream,
        handle.token(),
        Interest::READABLE | Interest::WRITABLE,
    ) {
        return Err((Rejected::Association(e), stream));
    }

    if registry.is_full() {
        deregister(poll_registry, &mut stream, handle);
        return Err((
            Rejected::CapacityExceeded {
                capacity: registry.capacity(),
            },
            stream,
        ));
    }

    match registry.insert(Connection::new(stream, peer)) {
        Ok(inserted) => {
            debug_assert_eq!(inserted, handle);
            debug!(handle = %inserted, peer = %peer, active = registry.len(), "Connection admitted");
            Ok(inserted)
        }
        Err((err, mut conn)) => {
            deregister(poll_registry, &mut conn.stream, handle);
            let rejected = match err {
                InsertError::Full => Rejected::CapacityExceeded {
                    capacity: registry.capacity(),
                },
                InsertError::Duplicate(id) => Rejected::Association(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{id} already registered"),
                )),
            };
            Err((rejected, conn.stream))
        }
    }
}

fn deregister(poll_registry: &mio::Registry, stream: &mut TcpStream, handle: EventHandle) {
    if let Err(e) = poll_registry.deregister(stream) {
        debug!(handle = %handle, error = %e, "Deregister failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_util::accepted_pair;
    use mio::Poll;
    use std::io::Read;
    use std::os::unix::io::{FromRawFd, IntoRawFd};
    use std::time::Duration;

    #[test]
    fn test_admit_until_capacity() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 2> = Registry::new();
        let mut clients = Vec::new();

        for _ in 0..2 {
            let (client, stream, peer) = accepted_pair();
            admit(poll.registry(), &mut registry, stream, peer).unwrap();
            clients.push(client);
            assert!(registry.is_consistent());
        }
        let before = registry.handles();

        let (mut client, stream, peer) = accepted_pair();
        let (rejected, stream) = admit(poll.registry(), &mut registry, stream, peer).unwrap_err();
        assert!(matches!(
            rejected,
            Rejected::CapacityExceeded { capacity: 2 }
        ));

        // Rejection leaves existing entries untouched.
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.handles(), before);
        assert!(registry.is_consistent());

        // The caller closes the rejected stream; the peer sees EOF.
        drop(stream);
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_rejection_is_repeatable() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 1> = Registry::new();
        let (_client, stream, peer) = accepted_pair();
        let handle = admit(poll.registry(), &mut registry, stream, peer).unwrap();

        for _ in 0..3 {
            let (_client, stream, peer) = accepted_pair();
            let (rejected, _stream) =
                admit(poll.registry(), &mut registry, stream, peer).unwrap_err();
            assert!(matches!(rejected, Rejected::CapacityExceeded { .. }));
        }

        assert_eq!(registry.handles(), vec![handle]);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_already_registered_socket_is_association_error() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 4> = Registry::new();
        let (_client, stream, peer) = accepted_pair();
        let fd = stream.as_raw_fd();
        let handle = admit(poll.registry(), &mut registry, stream, peer).unwrap();

        // A second stream object over the same descriptor.
        let alias = unsafe { TcpStream::from_raw_fd(fd) };
        let (rejected, returned) = admit(poll.registry(), &mut registry, alias, peer).unwrap_err();
        assert!(matches!(
            rejected,
            Rejected::Association(ref e) if e.kind() == io::ErrorKind::AlreadyExists
        ));

        // The stream comes back to the caller; release it without closing
        // the descriptor the registry still owns.
        assert_eq!(returned.into_raw_fd(), fd);

        assert_eq!(registry.handles(), vec![handle]);
        assert_eq!(registry.handle_of(SocketId(fd)), Some(handle));
        assert!(registry.is_consistent());
    }
}
