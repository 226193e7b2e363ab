//! Per-condition handlers: read-and-echo, write, and close.
//!
//! Every handler first checks registry membership, so a handle closed
//! earlier in the same dispatch is a no-op for the handlers that follow.

use crate::runtime::connection::Connection;
use crate::runtime::error::CloseReason;
use crate::runtime::registry::{EventHandle, Registry};
use std::io::{self, Read, Write};
use tracing::{debug, trace, warn};

/// Receive until the socket would block, echoing each chunk back.
///
/// EOF, a receive error, or a failed send tears the connection down. A short
/// send is logged and the remainder dropped.
pub fn on_read<const N: usize>(
    poll_registry: &mio::Registry,
    registry: &mut Registry<Connection, N>,
    handle: EventHandle,
    buf: &mut [u8],
) {
    let Some(conn) = registry.get_mut(handle) else {
        return;
    };

    let reason = loop {
        let n = match conn.stream.read(buf) {
            Ok(0) => break CloseReason::PeerClosed,
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => break CloseReason::ReadError(e),
        };

        match conn.stream.write(&buf[..n]) {
            Ok(0) => break CloseReason::WriteZero,
            Ok(sent) => {
                conn.record_echo(sent);
                if sent < n {
                    warn!(handle = %handle, received = n, sent, "Short write, dropping remainder");
                } else {
                    trace!(handle = %handle, bytes = n, "Echoed");
                }
            }
            Err(e) => break CloseReason::WriteError(e),
        }
    };

    on_close(poll_registry, registry, handle, reason);
}

/// Writable notification. There is no buffered output, so nothing to flush.
pub fn on_write<const N: usize>(registry: &Registry<Connection, N>, handle: EventHandle) {
    if registry.contains(handle) {
        trace!(handle = %handle, "Writable");
    }
}

/// Tear down a connection: deregister, drop both registry views, and close
/// the socket.
///
/// Returns `false` if the handle was already closed.
pub fn on_close<const N: usize>(
    poll_registry: &mio::Registry,
    registry: &mut Registry<Connection, N>,
    handle: EventHandle,
    reason: CloseReason,
) -> bool {
    let Some(mut conn) = registry.remove(handle) else {
        trace!(handle = %handle, "Already closed");
        return false;
    };

    if let Err(e) = poll_registry.deregister(&mut conn.stream) {
        debug!(handle = %handle, error = %e, "Deregister failed");
    }

    debug!(
        handle = %handle,
        peer = %conn.peer,
        bytes_echoed = conn.bytes_echoed(),
        duration_ms = conn.age().as_millis() as u64,
        reason = %reason,
        active = registry.len(),
        "Connection closed"
    );

    // Dropping the stream closes the socket.
    drop(conn);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::admission::admit;
    use crate::runtime::test_util::{accepted_pair, read_with_timeout, wait_until_peekable};
    use mio::Poll;
    use std::net::Shutdown;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for_bytes<const N: usize>(
        registry: &Registry<Connection, N>,
        handle: EventHandle,
        len: usize,
    ) {
        wait_until_peekable(&registry.get(handle).unwrap().stream, len);
    }

    /// Keep reading until the handler closes the connection, as repeated
    /// readiness would.
    fn read_until_closed<const N: usize>(
        poll: &Poll,
        registry: &mut Registry<Connection, N>,
        handle: EventHandle,
        buf: &mut [u8],
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while registry.contains(handle) {
            assert!(Instant::now() < deadline, "connection was not closed");
            on_read(poll.registry(), registry, handle, buf);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_read_echoes_payload() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 4> = Registry::new();
        let (mut client, stream, peer) = accepted_pair();
        let handle = admit(poll.registry(), &mut registry, stream, peer).unwrap();

        client.write_all(b"ping").unwrap();
        wait_for_bytes(&registry, handle, 4);

        let mut buf = [0u8; 16];
        on_read(poll.registry(), &mut registry, handle, &mut buf);

        assert_eq!(read_with_timeout(&mut client, 4), b"ping");
        assert!(registry.contains(handle));
        assert_eq!(registry.get(handle).unwrap().bytes_echoed(), 4);
    }

    #[test]
    fn test_read_exact_buffer_size_keeps_connection() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 4> = Registry::new();
        let (mut client, stream, peer) = accepted_pair();
        let handle = admit(poll.registry(), &mut registry, stream, peer).unwrap();

        let payload = [0xabu8; 8];
        client.write_all(&payload).unwrap();
        wait_for_bytes(&registry, handle, 8);

        let mut buf = [0u8; 8];
        on_read(poll.registry(), &mut registry, handle, &mut buf);

        assert_eq!(read_with_timeout(&mut client, 8), payload);
        assert!(registry.contains(handle));
    }

    #[test]
    fn test_read_larger_than_buffer_drains_all() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 4> = Registry::new();
        let (mut client, stream, peer) = accepted_pair();
        let handle = admit(poll.registry(), &mut registry, stream, peer).unwrap();

        let payload: Vec<u8> = (0..50u8).collect();
        client.write_all(&payload).unwrap();
        wait_for_bytes(&registry, handle, payload.len());

        let mut buf = [0u8; 8];
        on_read(poll.registry(), &mut registry, handle, &mut buf);

        assert_eq!(read_with_timeout(&mut client, payload.len()), payload);
        assert!(registry.contains(handle));
    }

    #[test]
    fn test_zero_byte_read_closes() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 4> = Registry::new();
        let (client, stream, peer) = accepted_pair();
        let handle = admit(poll.registry(), &mut registry, stream, peer).unwrap();

        client.shutdown(Shutdown::Write).unwrap();
        wait_for_bytes(&registry, handle, 0);

        let mut buf = [0u8; 8];
        on_read(poll.registry(), &mut registry, handle, &mut buf);

        assert!(!registry.contains(handle));
        assert!(registry.is_empty());
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_payload_then_eof_is_echoed_before_close() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 4> = Registry::new();
        let (mut client, stream, peer) = accepted_pair();
        let handle = admit(poll.registry(), &mut registry, stream, peer).unwrap();

        client.write_all(b"last").unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let mut buf = [0u8; 16];
        read_until_closed(&poll, &mut registry, handle, &mut buf);

        assert!(!registry.contains(handle));
        assert_eq!(read_with_timeout(&mut client, 4), b"last");
    }

    #[test]
    fn test_read_without_data_is_noop() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 4> = Registry::new();
        let (_client, stream, peer) = accepted_pair();
        let handle = admit(poll.registry(), &mut registry, stream, peer).unwrap();

        let mut buf = [0u8; 8];
        on_read(poll.registry(), &mut registry, handle, &mut buf);
        on_write(&registry, handle);

        assert!(registry.contains(handle));
    }

    #[test]
    fn test_close_twice_is_idempotent() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 4> = Registry::new();
        let (_c1, s1, p1) = accepted_pair();
        let (_c2, s2, p2) = accepted_pair();
        let h1 = admit(poll.registry(), &mut registry, s1, p1).unwrap();
        let h2 = admit(poll.registry(), &mut registry, s2, p2).unwrap();

        assert!(on_close(poll.registry(), &mut registry, h1, CloseReason::Hangup));
        let after_first = registry.handles();

        assert!(!on_close(poll.registry(), &mut registry, h1, CloseReason::Hangup));
        assert_eq!(registry.handles(), after_first);
        assert_eq!(registry.handles(), vec![h2]);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_handlers_ignore_unknown_handle() {
        let poll = Poll::new().unwrap();
        let mut registry: Registry<Connection, 4> = Registry::new();
        let stale = registry.next_handle();

        let mut buf = [0u8; 8];
        on_read(poll.registry(), &mut registry, stale, &mut buf);
        on_write(&registry, stale);
        assert!(!on_close(poll.registry(), &mut registry, stale, CloseReason::Hangup));
        assert!(registry.is_empty());
    }
}
