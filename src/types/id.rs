//! Identifier types for engine entities.
//!
//! These types provide type-safe identifiers for the three record kinds the
//! engine manages: publishers, processes, and subscriptions. They wrap arena
//! indices, so a handle held across the termination of its record simply
//! stops resolving instead of aliasing a recycled slot.

use crate::util::ArenaIndex;
use core::fmt;

/// A unique identifier for a publisher.
///
/// Publishers are the immutable definition nodes of the reactive graph; one
/// publisher runs at most one process at a time.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublisherId(pub(crate) ArenaIndex);

impl PublisherId {
    /// Returns the underlying arena index (internal use).
    #[must_use]
    #[allow(dead_code)]
    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }
}

impl fmt::Debug for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublisherId({}:{})", self.0.index(), self.0.generation())
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0.index())
    }
}

/// A unique identifier for a running process.
///
/// A process is one activation of a publisher, spawned by the first
/// subscriber and shared by every subscriber that joins while it runs.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ProcessId(pub(crate) ArenaIndex);

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessId({}:{})", self.0.index(), self.0.generation())
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ps{}", self.0.index())
    }
}

/// A unique identifier for a subscription.
///
/// A subscription is one consumer's handle onto a running process. It stays
/// valid until the terminal notification has been delivered; after that,
/// cancellation and pulls on the stale handle degrade to no-ops and
/// `Cancelled` results respectively.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(pub(crate) ArenaIndex);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SubscriptionId({}:{})",
            self.0.index(),
            self.0.generation()
        )
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0.index())
    }
}

/// A logical instant.
///
/// Time advances by one whenever the reactor exhausts the current instant's
/// work and promotes the deferred queue. It never tracks wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// The zero instant (engine start).
    pub const ZERO: Self = Self(0);

    /// Creates a time from a raw instant count.
    #[must_use]
    pub const fn from_instants(instants: u64) -> Self {
        Self(instants)
    }

    /// Returns the raw instant count.
    #[must_use]
    pub const fn instants(self) -> u64 {
        self.0
    }

    /// Returns the next instant, saturating on overflow.
    #[must_use]
    pub(crate) const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
