//! Subscription records and the intrusive consumer rings.
//!
//! Each process keeps its consumers on two circular doubly-linked rings:
//! `waiting` (no value held) and `pending` (flow subscriptions holding an
//! unread value). A subscription is on at most one ring at a time; a
//! subscription with cleared links is detached and will receive at most one
//! more notification (the one already queued for it, if any).
//!
//! The ring head is the oldest member; `attach` inserts before the head,
//! making the newcomer the tail, so walking `next` from the head visits
//! members in insertion order.

use crate::engine::publisher::{Consumer, Value};
use crate::types::{ProcessId, PublisherId, SubscriptionId};
use crate::util::Arena;

/// Which ring a subscription currently sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RingTag {
    Waiting,
    Pending,
}

/// One consumer's handle onto a running process.
pub(crate) struct SubscriptionRecord {
    /// The publisher whose prop stack carries this subscription's
    /// notifications.
    pub(crate) publisher: PublisherId,
    /// The process that issued the subscribe; `None` for external
    /// consumers. Restored as the current process around each delivery.
    pub(crate) source: Option<ProcessId>,
    /// The process subscribed to.
    pub(crate) target: ProcessId,
    /// Consumer notification sinks.
    pub(crate) consumer: Consumer,
    /// Subscription-local user state.
    pub(crate) state: Value,
    /// Tasks: terminal polarity (true = success). Flows: true when the
    /// notification announces a value, false when it must be translated by
    /// accept/reject.
    pub(crate) flag: bool,
    /// Ring links; `None`/`None` means detached.
    pub(crate) prev: Option<SubscriptionId>,
    pub(crate) next: Option<SubscriptionId>,
    /// Which ring the links belong to.
    pub(crate) ring: Option<RingTag>,
    /// Next entry in the publisher's LIFO prop stack.
    pub(crate) prop_next: Option<SubscriptionId>,
    /// True while queued on the prop stack.
    pub(crate) queued: bool,
}

impl SubscriptionRecord {
    pub(crate) fn new(
        publisher: PublisherId,
        source: Option<ProcessId>,
        target: ProcessId,
        consumer: Consumer,
        state: Value,
    ) -> Self {
        Self {
            publisher,
            source,
            target,
            consumer,
            state,
            flag: false,
            prev: None,
            next: None,
            ring: None,
            prop_next: None,
            queued: false,
        }
    }

    /// A detached subscription has been extracted from both rings.
    pub(crate) fn is_detached(&self) -> bool {
        self.next.is_none()
    }

    /// True when this subscription is its ring's only member.
    pub(crate) fn is_sole(&self, s: SubscriptionId) -> bool {
        self.next == Some(s)
    }
}

/// Inserts `s` immediately before the head, making it the ring's tail.
pub(crate) fn ring_attach(
    subs: &mut Arena<SubscriptionRecord>,
    head: &mut Option<SubscriptionId>,
    s: SubscriptionId,
    tag: RingTag,
) {
    match *head {
        None => {
            let rec = subs.get_mut(s.0).expect("subscription missing");
            rec.prev = Some(s);
            rec.next = Some(s);
            rec.ring = Some(tag);
            *head = Some(s);
        }
        Some(h) => {
            let tail = subs
                .get_mut(h.0)
                .expect("ring head missing")
                .prev
                .expect("ring member without prev");
            subs.get_mut(tail.0).expect("ring tail missing").next = Some(s);
            subs.get_mut(h.0).expect("ring head missing").prev = Some(s);
            let rec = subs.get_mut(s.0).expect("subscription missing");
            rec.prev = Some(tail);
            rec.next = Some(h);
            rec.ring = Some(tag);
        }
    }
}

/// Removes `s` from its ring, clearing its links and updating the head.
pub(crate) fn ring_detach(
    subs: &mut Arena<SubscriptionRecord>,
    head: &mut Option<SubscriptionId>,
    s: SubscriptionId,
) {
    let rec = subs.get_mut(s.0).expect("subscription missing");
    let prev = rec.prev;
    let next = rec.next;
    rec.prev = None;
    rec.next = None;
    rec.ring = None;

    if next == Some(s) {
        // Sole member.
        *head = None;
        return;
    }
    let prev = prev.expect("ring member without prev");
    let next = next.expect("ring member without next");
    subs.get_mut(prev.0).expect("ring member missing").next = Some(next);
    subs.get_mut(next.0).expect("ring member missing").prev = Some(prev);
    if *head == Some(s) {
        *head = Some(next);
    }
}

/// Collects the ring's members in insertion order (tests and diagnostics).
#[cfg(test)]
pub(crate) fn ring_members(
    subs: &Arena<SubscriptionRecord>,
    head: Option<SubscriptionId>,
) -> Vec<SubscriptionId> {
    let mut out = Vec::new();
    let Some(h) = head else { return out };
    let mut cursor = h;
    loop {
        out.push(cursor);
        let next = subs
            .get(cursor.0)
            .expect("ring member missing")
            .next
            .expect("ring member without next");
        if next == h {
            break;
        }
        cursor = next;
    }
    out
}
