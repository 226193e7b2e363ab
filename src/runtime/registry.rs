//! Bidirectional socket <-> event handle registry.
//!
//! Two views of one relation: `by_socket` maps a socket identity to its
//! handle, `by_handle` maps a handle back to the owned socket. Slab keys are
//! the handles, so every live handle is below the capacity `N`.

use mio::Token;
use slab::Slab;
use std::collections::HashMap;
use std::fmt;
use std::os::unix::io::RawFd;

/// Maximum number of simultaneously registered sockets.
pub const MAX_WAIT_EVENTS: usize = 64;

/// Opaque readiness handle associated with one registered socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(usize);

impl EventHandle {
    /// The poll token carrying this handle.
    pub fn token(self) -> Token {
        Token(self.0)
    }

    /// Recover a handle from a poll token.
    pub fn from_token(token: Token) -> Self {
        Self(token.0)
    }
}

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// OS-level identity of a socket (its descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub RawFd);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

/// Anything the registry can own.
pub trait Socket {
    fn id(&self) -> SocketId;
}

/// Why an insert was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// The registry already holds `N` sockets.
    Full,
    /// A socket with the same identity is already registered.
    Duplicate(SocketId),
}

/// Registry of live sockets, bounded by `N` at the type level.
pub struct Registry<S, const N: usize = MAX_WAIT_EVENTS> {
    by_socket: HashMap<SocketId, EventHandle>,
    by_handle: Slab<S>,
}

impl<S: Socket, const N: usize> Registry<S, N> {
    pub fn new() -> Self {
        Self {
            by_socket: HashMap::with_capacity(N),
            by_handle: Slab::with_capacity(N),
        }
    }

    /// Maximum number of sockets this registry will hold.
    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.by_handle.len() >= N
    }

    /// The handle the next successful `insert` will assign.
    pub fn next_handle(&self) -> EventHandle {
        EventHandle(self.by_handle.vacant_key())
    }

    /// Insert a socket, creating both views in one step.
    pub fn insert(&mut self, socket: S) -> Result<EventHandle, (InsertError, S)> {
        if self.is_full() {
            return Err((InsertError::Full, socket));
        }
        let id = socket.id();
        if self.by_socket.contains_key(&id) {
            return Err((InsertError::Duplicate(id), socket));
        }

        let handle = EventHandle(self.by_handle.insert(socket));
        self.by_socket.insert(id, handle);
        debug_assert!(self.is_consistent());
        Ok(handle)
    }

    /// Check if a handle maps to a live socket.
    pub fn contains(&self, handle: EventHandle) -> bool {
        self.by_handle.contains(handle.0)
    }

    /// Resolve a handle to the identity of the socket it belongs to.
    pub fn resolve(&self, handle: EventHandle) -> Option<SocketId> {
        self.by_handle.get(handle.0).map(Socket::id)
    }

    /// Look up the handle registered for a socket.
    pub fn handle_of(&self, id: SocketId) -> Option<EventHandle> {
        self.by_socket.get(&id).copied()
    }

    pub fn get(&self, handle: EventHandle) -> Option<&S> {
        self.by_handle.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: EventHandle) -> Option<&mut S> {
        self.by_handle.get_mut(handle.0)
    }

    /// Remove a socket, deleting both views in one step.
    ///
    /// Returns `None` if the handle is not registered, so repeated removal is
    /// a no-op.
    pub fn remove(&mut self, handle: EventHandle) -> Option<S> {
        let socket = self.by_handle.try_remove(handle.0)?;
        self.by_socket.remove(&socket.id());
        debug_assert!(self.is_consistent());
        Some(socket)
    }

    /// Handles of every registered socket.
    pub fn handles(&self) -> Vec<EventHandle> {
        self.by_handle.iter().map(|(key, _)| EventHandle(key)).collect()
    }

    /// True when both views describe exactly the same set of pairs.
    pub fn is_consistent(&self) -> bool {
        self.by_socket.len() == self.by_handle.len()
            && self.by_handle.len() <= N
            && self
                .by_handle
                .iter()
                .all(|(key, socket)| self.by_socket.get(&socket.id()) == Some(&EventHandle(key)))
    }
}

impl<S: Socket, const N: usize> Default for Registry<S, N> {
    fn default() -> Self {
        Self::new()
    }
}
