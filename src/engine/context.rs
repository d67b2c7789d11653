//! The reaction context: logical time, the executing process and
//! subscription, and the reactor's scheduling state.
//!
//! Where a dynamically-typed engine would keep this in a process-wide
//! singleton, here it is a plain field of the engine; callbacks reach it
//! through the `&mut Engine` they are handed, so there is exactly one
//! writer at any instant by construction.

use crate::types::{ProcessId, Rank, SubscriptionId, Time};

pub(crate) struct Context {
    /// Logical time; advances when the reactor promotes the deferred heap.
    pub(crate) time: Time,
    /// The process currently executing, if any.
    pub(crate) process: Option<ProcessId>,
    /// The subscription currently being set up, delivered to, or iterated.
    pub(crate) sub: Option<SubscriptionId>,
    /// Rank at which the current reaction began; `None` outside a reaction.
    pub(crate) cursor: Option<Rank>,
    /// Pairing heap of processes scheduled for the current instant.
    pub(crate) reacted: Option<ProcessId>,
    /// Pairing heap of processes deferred to the next instant.
    pub(crate) delayed: Option<ProcessId>,
    /// Birth counter for top-level publisher ranks.
    pub(crate) births: u32,
    /// Engine frame depth; the reactor runs when this unwinds to zero.
    pub(crate) depth: u32,
    /// Latch preventing reactor reentry from notifications it delivers.
    pub(crate) reacting: bool,
}

impl Context {
    pub(crate) const fn new() -> Self {
        Self {
            time: Time::ZERO,
            process: None,
            sub: None,
            cursor: None,
            reacted: None,
            delayed: None,
            births: 0,
            depth: 0,
            reacting: false,
        }
    }
}
