//! Readiness conditions reported for one socket.
//!
//! Conditions are independent bits; more than one may be set by a single
//! notification. Iteration always yields them in dispatch order.

use mio::event::Event;
use std::fmt;

/// A single I/O condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Read,
    Write,
    Closed,
}

impl Condition {
    /// Dispatch order. Read drains before close so a final payload that
    /// arrives together with the hang-up is still echoed.
    pub const ORDER: [Condition; 3] = [Condition::Read, Condition::Write, Condition::Closed];

    const fn bit(self) -> u8 {
        match self {
            Condition::Read => 0b001,
            Condition::Write => 0b010,
            Condition::Closed => 0b100,
        }
    }
}

/// Set of pending conditions.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness(u8);

impl Readiness {
    pub const EMPTY: Readiness = Readiness(0);
    pub const READ: Readiness = Readiness(Condition::Read.bit());
    pub const WRITE: Readiness = Readiness(Condition::Write.bit());
    pub const CLOSED: Readiness = Readiness(Condition::Closed.bit());

    /// Translate a poll event. Error and hang-up both count as closed.
    pub fn from_event(event: &Event) -> Self {
        let mut readiness = Readiness::EMPTY;
        if event.is_readable() {
            readiness |= Readiness::READ;
        }
        if event.is_writable() {
            readiness |= Readiness::WRITE;
        }
        if event.is_read_closed() || event.is_write_closed() || event.is_error() {
            readiness |= Readiness::CLOSED;
        }
        readiness
    }

    pub fn contains(self, condition: Condition) -> bool {
        self.0 & condition.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Pending conditions in dispatch order.
    pub fn iter(self) -> impl Iterator<Item = Condition> {
        Condition::ORDER
            .into_iter()
            .filter(move |condition| self.contains(*condition))
    }
}

impl std::ops::BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Readiness) {
        self.0 |= rhs.0;
    }
}

impl From<Condition> for Readiness {
    fn from(condition: Condition) -> Self {
        Readiness(condition.bit())
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_order() {
        let all = Readiness::CLOSED | Readiness::WRITE | Readiness::READ;
        let order: Vec<_> = all.iter().collect();
        assert_eq!(order, vec![Condition::Read, Condition::Write, Condition::Closed]);
    }

    #[test]
    fn test_read_and_close_together() {
        let readiness = Readiness::READ | Readiness::CLOSED;
        assert!(readiness.contains(Condition::Read));
        assert!(!readiness.contains(Condition::Write));
        assert!(readiness.contains(Condition::Closed));

        let order: Vec<_> = readiness.iter().collect();
        assert_eq!(order, vec![Condition::Read, Condition::Closed]);
    }

    #[test]
    fn test_empty() {
        assert!(Readiness::EMPTY.is_empty());
        assert_eq!(Readiness::EMPTY.iter().count(), 0);
        assert_eq!(Readiness::default(), Readiness::EMPTY);
        assert!(!Readiness::from(Condition::Write).is_empty());
    }

    #[test]
    fn test_debug_lists_conditions() {
        let readiness = Readiness::WRITE | Readiness::READ;
        assert_eq!(format!("{readiness:?}"), "{Read, Write}");
    }
}
