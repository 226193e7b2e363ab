//! Bounded notification buffer for one readiness wait.

use crate::runtime::readiness::Readiness;
use crate::runtime::registry::{EventHandle, MAX_WAIT_EVENTS};
use mio::{Events, Poll, Token};
use std::io;
use std::time::Duration;

/// Reserved token for the shutdown waker; never handed out by a registry.
pub const WAKE_TOKEN: Token = Token(usize::MAX);

/// One signaled handle together with the conditions it reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub handle: EventHandle,
    pub readiness: Readiness,
}

/// Result of a single bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Nothing became ready before the timeout.
    TimedOut,
    /// The shutdown waker fired, possibly alongside socket notifications.
    Woken(usize),
    /// This many notifications are available through `get`.
    Ready(usize),
}

/// Wait buffer holding at most `N` notifications per wait.
pub struct WaitSet<const N: usize = MAX_WAIT_EVENTS> {
    events: Events,
    ready: Vec<Notification>,
}

impl<const N: usize> WaitSet<N> {
    pub fn new() -> Self {
        Self {
            events: Events::with_capacity(N),
            ready: Vec::with_capacity(N),
        }
    }

    /// Block on `poll` for at most `timeout`.
    ///
    /// An interrupted wait is reported as a timeout.
    pub fn wait(&mut self, poll: &mut Poll, timeout: Duration) -> io::Result<WaitOutcome> {
        self.ready.clear();

        match poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                return Ok(WaitOutcome::TimedOut)
            }
            Err(e) => return Err(e),
        }

        let mut woken = false;
        for event in self.events.iter() {
            if event.token() == WAKE_TOKEN {
                woken = true;
                continue;
            }
            self.ready.push(Notification {
                handle: EventHandle::from_token(event.token()),
                readiness: Readiness::from_event(event),
            });
        }
        debug_assert!(self.ready.len() <= N);

        Ok(if woken {
            WaitOutcome::Woken(self.ready.len())
        } else if self.ready.is_empty() {
            WaitOutcome::TimedOut
        } else {
            WaitOutcome::Ready(self.ready.len())
        })
    }

    /// Notification `idx` from the most recent wait.
    pub fn get(&self, idx: usize) -> Option<Notification> {
        self.ready.get(idx).copied()
    }
}

impl<const N: usize> Default for WaitSet<N> {
    fn default() -> Self {
        Self::new()
    }
}
