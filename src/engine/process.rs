//! Process records and the reactor's pairing heap.
//!
//! A process is one running activation of a publisher. Its record owns the
//! user state, the opaque handle driving the underlying computation, the
//! heads of the two subscription rings, and the intrusive first-child /
//! next-sibling links the reactor heap threads through scheduled processes.
//!
//! The heap orders processes by their parent publisher's rank, so popping
//! repeatedly yields the instant's ticks in ascending rank order. `link` and
//! `push` are O(1); `pop` pairs the root's children left to right and folds
//! them back right to left, O(log n) amortized.

use crate::engine::publisher::{ProcessHandle, PublisherRecord, Value};
use crate::types::{ProcessId, PublisherId, SubscriptionId};
use crate::util::Arena;

/// A running activation of a publisher.
pub(crate) struct ProcessRecord {
    /// The publisher this process activates.
    pub(crate) publisher: PublisherId,
    /// User-level state, owned by the combinator.
    pub(crate) state: Value,
    /// The opaque process value returned by the effect; dropped on
    /// retirement.
    pub(crate) handle: Option<Box<dyn ProcessHandle>>,
    /// Ring of subscriptions not currently holding a value.
    pub(crate) waiting: Option<SubscriptionId>,
    /// Ring of flow subscriptions holding an unread value.
    pub(crate) pending: Option<SubscriptionId>,
    /// Pairing heap: first child.
    pub(crate) heap_child: Option<ProcessId>,
    /// Pairing heap: next sibling.
    pub(crate) heap_sibling: Option<ProcessId>,
    /// True while the process sits in one of the reactor heaps.
    pub(crate) scheduled: bool,
    /// Set once the effect has returned; distinguishes initial scheduling
    /// during `perform` from ordinary scheduling.
    pub(crate) armed: bool,
    /// Set by `resolve` or cancellation; a retired process is never
    /// re-entered.
    pub(crate) retired: bool,
}

impl ProcessRecord {
    pub(crate) fn new(publisher: PublisherId, state: Value) -> Self {
        Self {
            publisher,
            state,
            handle: None,
            waiting: None,
            pending: None,
            heap_child: None,
            heap_sibling: None,
            scheduled: false,
            armed: false,
            retired: false,
        }
    }

    /// True when no subscription ring holds any consumer.
    pub(crate) fn rings_empty(&self) -> bool {
        self.waiting.is_none() && self.pending.is_none()
    }
}

fn rank_precedes(
    publishers: &Arena<PublisherRecord>,
    processes: &Arena<ProcessRecord>,
    a: ProcessId,
    b: ProcessId,
) -> bool {
    let pa = processes.get(a.0).expect("heap node missing").publisher;
    let pb = processes.get(b.0).expect("heap node missing").publisher;
    let ra = &publishers.get(pa.0).expect("publisher missing").ranks;
    let rb = &publishers.get(pb.0).expect("publisher missing").ranks;
    ra < rb
}

/// Links two heaps, making the lower-rank root the parent.
pub(crate) fn heap_link(
    publishers: &Arena<PublisherRecord>,
    processes: &mut Arena<ProcessRecord>,
    a: ProcessId,
    b: ProcessId,
) -> ProcessId {
    let (parent, child) = if rank_precedes(publishers, processes, a, b) {
        (a, b)
    } else {
        (b, a)
    };
    let first = processes.get(parent.0).expect("heap node missing").heap_child;
    {
        let c = processes.get_mut(child.0).expect("heap node missing");
        c.heap_sibling = first;
    }
    let p = processes.get_mut(parent.0).expect("heap node missing");
    p.heap_child = Some(child);
    parent
}

/// Pushes a process onto a heap, returning the new root.
pub(crate) fn heap_push(
    publishers: &Arena<PublisherRecord>,
    processes: &mut Arena<ProcessRecord>,
    root: Option<ProcessId>,
    p: ProcessId,
) -> ProcessId {
    match root {
        None => p,
        Some(r) => heap_link(publishers, processes, p, r),
    }
}

/// Pops the minimum-rank process off the heap rooted at `*root`.
pub(crate) fn heap_pop(
    publishers: &Arena<PublisherRecord>,
    processes: &mut Arena<ProcessRecord>,
    root: &mut Option<ProcessId>,
) -> Option<ProcessId> {
    let min = (*root)?;

    let mut kids = Vec::new();
    let mut cursor = processes
        .get_mut(min.0)
        .expect("heap node missing")
        .heap_child
        .take();
    while let Some(k) = cursor {
        cursor = processes
            .get_mut(k.0)
            .expect("heap node missing")
            .heap_sibling
            .take();
        kids.push(k);
    }

    // Pair left to right.
    let mut paired = Vec::with_capacity(kids.len().div_ceil(2));
    let mut iter = kids.chunks_exact(2);
    for pair in iter.by_ref() {
        paired.push(heap_link(publishers, processes, pair[0], pair[1]));
    }
    if let [odd] = iter.remainder() {
        paired.push(*odd);
    }

    // Fold right to left.
    let mut new_root = None;
    for h in paired.into_iter().rev() {
        new_root = Some(heap_push(publishers, processes, new_root, h));
    }
    *root = new_root;
    Some(min)
}
