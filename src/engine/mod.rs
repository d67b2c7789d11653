//! The propagator engine: frames, propagation, and the reactor.
//!
//! Everything the crate does funnels through [`Engine`]. Consumers call
//! [`Engine::subscribe_task`] / [`Engine::subscribe_flow`] to attach to a
//! publisher (spawning its process if idle), [`Engine::pull`] to read a flow
//! value, and [`Engine::unsubscribe`] to cancel. Combinator callbacks,
//! handed a `&mut Engine`, drive their consumers with the notification
//! primitives ([`Engine::success`], [`Engine::failure`], [`Engine::step`],
//! [`Engine::done`]) and the scheduling primitives ([`Engine::schedule`],
//! [`Engine::resolve`]).
//!
//! # Frames
//!
//! Every public entry point that may deliver notifications brackets its work
//! in an engine frame on the publisher it addresses. The frame records
//! whether the publisher was already held; only the outermost frame per
//! publisher drains that publisher's propagation stack on exit, so
//! notifications emitted by nested re-entries accumulate and fire once the
//! outer caller finishes. When the overall frame depth unwinds to zero the
//! reactor runs to quiescence.
//!
//! # Ordering
//!
//! The propagation stack is LIFO: notifications dispatched later from within
//! one callback are delivered first. Within one logical instant the reactor
//! ticks processes in strictly ascending publisher rank; a schedule whose
//! rank does not exceed the current cursor is deferred to the next instant.

mod context;
mod process;
pub mod publisher;
mod subscription;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::tracing_compat::{debug, trace};
use crate::types::{ProcessId, PublisherId, Rank, SubscriptionId, Time};
use crate::util::Arena;
use context::Context;
use process::{heap_pop, heap_push, ProcessRecord};
use publisher::{
    Consumer, EffectFn, Notifier, PublisherRecord, Side, StateInit, Value, Vtable,
};
use subscription::{ring_attach, ring_detach, RingTag, SubscriptionRecord};

use std::any::Any;
use std::rc::Rc;

pub use publisher::{FlowBuilder, ProcessHandle, TaskBuilder};

/// One bracketed entry into the engine on behalf of a publisher.
struct Frame {
    publisher: PublisherId,
    /// True when the publisher was already held; the outer frame owns the
    /// propagation drain.
    reentrant: bool,
    saved_process: Option<ProcessId>,
    saved_sub: Option<SubscriptionId>,
}

/// The reactive propagator.
///
/// Single-threaded and cooperative: user callbacks never block the engine,
/// they enqueue work and return. External events re-enter through the
/// [`Notifier`]s handed to each publisher's effect; each external entry
/// runs the reactor to quiescence before returning.
pub struct Engine {
    publishers: Arena<PublisherRecord>,
    processes: Arena<ProcessRecord>,
    subscriptions: Arena<SubscriptionRecord>,
    ctx: Context,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with default arena capacities.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::new())
    }

    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            publishers: Arena::with_capacity(config.publisher_capacity),
            processes: Arena::with_capacity(config.process_capacity),
            subscriptions: Arena::with_capacity(config.subscription_capacity),
            ctx: Context::new(),
        }
    }

    // === Introspection ===

    /// Returns the current logical time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.ctx.time
    }

    /// Returns the process currently executing, if any.
    #[must_use]
    pub fn current_process(&self) -> Option<ProcessId> {
        self.ctx.process
    }

    /// Returns the subscription currently being delivered to or set up.
    #[must_use]
    pub fn current_subscription(&self) -> Option<SubscriptionId> {
        self.ctx.sub
    }

    /// Returns a publisher's rank.
    #[must_use]
    pub fn publisher_rank(&self, publisher: PublisherId) -> Option<&Rank> {
        self.publishers.get(publisher.0).map(|r| &r.ranks)
    }

    /// Returns the number of registered publishers.
    #[must_use]
    pub fn live_publishers(&self) -> usize {
        self.publishers.len()
    }

    /// Returns the number of running processes.
    #[must_use]
    pub fn live_processes(&self) -> usize {
        self.processes.len()
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn live_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// True when no frame is active and no work is scheduled.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.ctx.depth == 0
            && !self.ctx.reacting
            && self.ctx.reacted.is_none()
            && self.ctx.delayed.is_none()
    }

    // === Registration ===

    /// Inserts a publisher record, deriving its rank from the creation
    /// context: nested creations slot in under the executing process's
    /// publisher, top-level creations consume the engine birth counter.
    pub(crate) fn register(
        &mut self,
        effect: EffectFn,
        init_process: StateInit,
        init_sub: StateInit,
        vtable: Vtable,
    ) -> PublisherId {
        let ranks = match self.ctx.process {
            Some(p) => {
                let parent = self
                    .processes
                    .get(p.0)
                    .expect("current process missing")
                    .publisher;
                let rec = self
                    .publishers
                    .get_mut(parent.0)
                    .expect("parent publisher missing");
                let r = rec.ranks.child(rec.children);
                rec.children += 1;
                r
            }
            None => {
                let r = Rank::root(self.ctx.births);
                self.ctx.births += 1;
                r
            }
        };
        let id = PublisherId(self.publishers.insert(PublisherRecord {
            ranks,
            held: false,
            children: 0,
            current: None,
            prop: None,
            effect,
            init_process,
            init_sub,
            vtable,
        }));
        trace!(publisher = %id, "publisher registered");
        id
    }

    // === Subscribing ===

    /// Subscribes to a task publisher.
    ///
    /// Spawns the publisher's process if none is running, otherwise joins
    /// it. The sinks receive the terminal value: `on_success` on success,
    /// `on_failure` on failure or cancellation (a cancelled non-sole
    /// subscription is failed with the [`Error::cancelled`] sentinel).
    pub fn subscribe_task(
        &mut self,
        publisher: PublisherId,
        on_success: impl Fn(&mut Engine, SubscriptionId, Value) + 'static,
        on_failure: impl Fn(&mut Engine, SubscriptionId, Value) + 'static,
    ) -> SubscriptionId {
        self.subscribe_inner(
            publisher,
            Consumer::Task {
                on_success: Rc::new(on_success),
                on_failure: Rc::new(on_failure),
            },
        )
    }

    /// Subscribes to a flow publisher.
    ///
    /// `on_step` announces an available value (pull it with
    /// [`Engine::pull`]); `on_done` announces termination. After a
    /// cancellation the final notification may arrive through `on_step`
    /// with the pull surfacing [`Error::cancelled`].
    pub fn subscribe_flow(
        &mut self,
        publisher: PublisherId,
        on_step: impl Fn(&mut Engine, SubscriptionId) + 'static,
        on_done: impl Fn(&mut Engine, SubscriptionId) + 'static,
    ) -> SubscriptionId {
        self.subscribe_inner(
            publisher,
            Consumer::Flow {
                on_step: Rc::new(on_step),
                on_done: Rc::new(on_done),
            },
        )
    }

    fn subscribe_inner(&mut self, pb: PublisherId, consumer: Consumer) -> SubscriptionId {
        let frame = self.enter(pb);
        let source = self.ctx.process;

        let current = self
            .publishers
            .get(pb.0)
            .expect("subscribe on missing publisher")
            .current;
        let target = match current {
            Some(p) => p,
            None => self.spawn_process(pb),
        };

        let (init_sub, subscribe_cb) = {
            let rec = self.publishers.get(pb.0).expect("publisher missing");
            (rec.init_sub.clone(), rec.vtable.subscribe.clone())
        };
        let s = SubscriptionId(self.subscriptions.insert(SubscriptionRecord::new(
            pb,
            source,
            target,
            consumer,
            init_sub(),
        )));
        {
            let Engine {
                processes,
                subscriptions,
                ..
            } = self;
            let proc = processes.get_mut(target.0).expect("process missing");
            ring_attach(subscriptions, &mut proc.waiting, s, RingTag::Waiting);
        }
        trace!(publisher = %pb, subscription = %s, "subscribed");

        self.ctx.process = Some(target);
        self.ctx.sub = Some(s);
        subscribe_cb(self);

        self.exit(frame);
        s
    }

    /// Spawns a fresh process: initial state, `perform`, then the effect
    /// with its two bound notifiers.
    fn spawn_process(&mut self, pb: PublisherId) -> ProcessId {
        let (init_process, perform, effect) = {
            let rec = self.publishers.get(pb.0).expect("publisher missing");
            (
                rec.init_process.clone(),
                rec.vtable.perform.clone(),
                rec.effect.clone(),
            )
        };
        let p = ProcessId(self.processes.insert(ProcessRecord::new(pb, init_process())));
        self.publishers
            .get_mut(pb.0)
            .expect("publisher missing")
            .current = Some(p);
        debug!(publisher = %pb, process = %p, "process spawned");

        self.ctx.process = Some(p);
        self.ctx.sub = None;
        perform(self);

        let handle = effect(
            self,
            Notifier {
                process: p,
                side: Side::Left,
            },
            Notifier {
                process: p,
                side: Side::Right,
            },
        );
        if let Some(rec) = self.processes.get_mut(p.0) {
            // A process that resolved during `perform` stays retired; arm it
            // anyway so later schedules go through the heaps.
            if !rec.retired {
                rec.handle = Some(handle);
            }
            rec.armed = true;
        }
        p
    }

    /// Cancels a subscription.
    ///
    /// Synchronous and idempotent: cancelling twice, or after the terminal
    /// notification, is a no-op. Cancelling the sole consumer of a live
    /// process cancels the underlying computation.
    pub fn unsubscribe(&mut self, s: SubscriptionId) {
        let Some(rec) = self.subscriptions.get(s.0) else {
            return;
        };
        let pb = rec.publisher;
        let frame = self.enter(pb);
        trace!(publisher = %pb, subscription = %s, "unsubscribe");

        let snapshot = self
            .subscriptions
            .get(s.0)
            .map(|r| (r.is_detached(), r.target, r.ring, r.is_sole(s)));
        if let Some((false, target, ring, sole)) = snapshot {
            self.ctx.process = Some(target);
            self.ctx.sub = Some(s);
            let is_flow = self
                .publishers
                .get(pb.0)
                .expect("publisher missing")
                .is_flow();
            if is_flow {
                self.unsubscribe_flow(pb, s, target, ring, sole);
            } else if sole {
                self.cancel_process(target);
            } else {
                let r = self
                    .subscriptions
                    .get_mut(s.0)
                    .expect("subscription missing");
                r.flag = false;
                r.state = Box::new(Error::cancelled());
                self.dispatch(s);
            }
        }

        self.exit(frame);
    }

    fn unsubscribe_flow(
        &mut self,
        pb: PublisherId,
        s: SubscriptionId,
        target: ProcessId,
        ring: Option<RingTag>,
        sole: bool,
    ) {
        match ring {
            Some(RingTag::Waiting) => {
                let pending_empty = self
                    .processes
                    .get(target.0)
                    .expect("process missing")
                    .pending
                    .is_none();
                if sole && pending_empty {
                    self.cancel_process(target);
                } else {
                    {
                        let Engine {
                            processes,
                            subscriptions,
                            ..
                        } = self;
                        let proc = processes.get_mut(target.0).expect("process missing");
                        ring_detach(subscriptions, &mut proc.waiting, s);
                    }
                    let reject = self
                        .publishers
                        .get(pb.0)
                        .expect("publisher missing")
                        .vtable
                        .flow
                        .as_ref()
                        .expect("flow publisher without hooks")
                        .reject
                        .clone();
                    reject(self);
                    self.release_subscription_if_settled(s);
                }
            }
            Some(RingTag::Pending) => {
                let waiting_empty = self
                    .processes
                    .get(target.0)
                    .expect("process missing")
                    .waiting
                    .is_none();
                if sole && waiting_empty {
                    self.cancel_process(target);
                } else {
                    // Force the consumer's next pull to surface Cancelled.
                    self.subscriptions
                        .get_mut(s.0)
                        .expect("subscription missing")
                        .flag = true;
                    self.dispatch(s);
                }
            }
            None => {}
        }
    }

    /// Pulls the value a flow subscription was notified about.
    ///
    /// Moves the subscription from `pending` back to `waiting` and runs the
    /// publisher's `accept` hook; its result is the pulled value. Pulling
    /// from a terminated or cancelled subscription returns
    /// [`Error::cancelled`] and queues the terminal notification.
    ///
    /// # Panics
    ///
    /// Panics when called on a subscription to a task publisher.
    pub fn pull(&mut self, s: SubscriptionId) -> Result<Value> {
        let Some(rec) = self.subscriptions.get(s.0) else {
            return Err(Error::cancelled());
        };
        let pb = rec.publisher;
        let target = rec.target;
        let frame = self.enter(pb);

        let rec = self
            .subscriptions
            .get_mut(s.0)
            .expect("subscription missing");
        rec.flag = false;
        let result = if rec.is_detached() {
            self.prop_push(pb, s);
            Err(Error::cancelled())
        } else {
            {
                let Engine {
                    processes,
                    subscriptions,
                    ..
                } = self;
                let proc = processes.get_mut(target.0).expect("process missing");
                if subscriptions.get(s.0).expect("subscription missing").ring
                    == Some(RingTag::Pending)
                {
                    ring_detach(subscriptions, &mut proc.pending, s);
                    ring_attach(subscriptions, &mut proc.waiting, s, RingTag::Waiting);
                }
            }
            self.ctx.process = Some(target);
            self.ctx.sub = Some(s);
            let accept = self
                .publishers
                .get(pb.0)
                .expect("publisher missing")
                .vtable
                .flow
                .as_ref()
                .expect("pull on a task publisher")
                .accept
                .clone();
            accept(self)
        };

        self.exit(frame);
        result
    }

    /// Re-enters the engine on behalf of an external notification.
    pub(crate) fn notify(&mut self, n: Notifier) {
        let Some(proc) = self.processes.get(n.process.0) else {
            trace!(process = %n.process, "notify on released process ignored");
            return;
        };
        let pb = proc.publisher;
        let frame = self.enter(pb);
        self.ctx.process = Some(n.process);
        self.ctx.sub = None;
        let cb = {
            let rec = self.publishers.get(pb.0).expect("publisher missing");
            match n.side {
                Side::Left => rec.vtable.on_left.clone(),
                Side::Right => rec.vtable.on_right.clone(),
            }
        };
        cb(self);
        self.exit(frame);
    }

    // === Primitives for combinator callbacks ===

    /// Extracts the next value from the current process's underlying
    /// computation.
    ///
    /// # Panics
    ///
    /// Panics outside a process context or when the process has no
    /// transferable representation.
    pub fn transfer(&mut self) -> Result<Value> {
        let p = self.ctx.process.expect("transfer outside a process context");
        let mut handle = self
            .processes
            .get_mut(p.0)
            .expect("process missing")
            .handle
            .take()
            .expect("transfer without a transferable process");
        let result = handle.transfer(self);
        match self.processes.get(p.0).map(|r| r.retired) {
            Some(false) => {
                self.processes
                    .get_mut(p.0)
                    .expect("process missing")
                    .handle = Some(handle);
            }
            // Retired mid-transfer: the cancellation action was deferred
            // while we held the handle.
            Some(true) => handle.cancel(self),
            None => {}
        }
        result
    }

    /// Reads the current process's state.
    ///
    /// # Panics
    ///
    /// Panics outside a process context or on a state type mismatch.
    pub fn process_state<T: Any>(&mut self) -> &mut T {
        let p = self
            .ctx
            .process
            .expect("process state outside a process context");
        self.processes
            .get_mut(p.0)
            .expect("process missing")
            .state
            .downcast_mut::<T>()
            .expect("process state type mismatch")
    }

    /// Replaces the current process's state.
    pub fn set_process_state(&mut self, state: Value) {
        let p = self
            .ctx
            .process
            .expect("process state outside a process context");
        self.processes.get_mut(p.0).expect("process missing").state = state;
    }

    /// Reads the current subscription's state.
    ///
    /// # Panics
    ///
    /// Panics outside a subscription context or on a state type mismatch.
    pub fn sub_state<T: Any>(&mut self) -> &mut T {
        let s = self
            .ctx
            .sub
            .expect("subscription state outside a subscription context");
        self.subscriptions
            .get_mut(s.0)
            .expect("subscription missing")
            .state
            .downcast_mut::<T>()
            .expect("subscription state type mismatch")
    }

    /// Replaces the current subscription's state.
    pub fn set_sub_state(&mut self, state: Value) {
        let s = self
            .ctx
            .sub
            .expect("subscription state outside a subscription context");
        self.subscriptions
            .get_mut(s.0)
            .expect("subscription missing")
            .state = state;
    }

    /// Delivers a task success to the current subscription.
    pub fn success(&mut self, value: Value) {
        let s = self.ctx.sub.expect("success outside a subscription context");
        {
            let rec = self
                .subscriptions
                .get_mut(s.0)
                .expect("subscription missing");
            rec.flag = true;
            rec.state = value;
        }
        self.dispatch(s);
    }

    /// Delivers a task failure to the current subscription.
    pub fn failure(&mut self, value: Value) {
        let s = self.ctx.sub.expect("failure outside a subscription context");
        {
            let rec = self
                .subscriptions
                .get_mut(s.0)
                .expect("subscription missing");
            rec.flag = false;
            rec.state = value;
        }
        self.dispatch(s);
    }

    /// Announces a flow value to the current subscription: schedules its
    /// step notification and parks it on the pending ring until pulled.
    pub fn step(&mut self) {
        let s = self.ctx.sub.expect("step outside a subscription context");
        self.subscriptions
            .get_mut(s.0)
            .expect("subscription missing")
            .flag = true;
        self.dispatch(s);
        let target = self
            .subscriptions
            .get(s.0)
            .expect("subscription missing")
            .target;
        let Engine {
            processes,
            subscriptions,
            ..
        } = self;
        let proc = processes.get_mut(target.0).expect("process missing");
        ring_attach(subscriptions, &mut proc.pending, s, RingTag::Pending);
    }

    /// Announces flow termination to the current subscription. The flag is
    /// preserved from its last value; the consumer detects termination by
    /// the pull surfacing Cancelled.
    pub fn done(&mut self) {
        let s = self.ctx.sub.expect("done outside a subscription context");
        self.dispatch(s);
    }

    /// Runs `f` once per subscription on the current process's waiting
    /// ring, in insertion order, with each subscription made current.
    /// Tolerates `f` removing the subscription it is visiting.
    pub fn each_waiting(&mut self, f: impl FnMut(&mut Engine)) {
        self.each_ring(RingTag::Waiting, f);
    }

    /// Runs `f` once per subscription on the current process's pending
    /// ring, in insertion order, with each subscription made current.
    /// Tolerates `f` removing the subscription it is visiting.
    pub fn each_pending(&mut self, f: impl FnMut(&mut Engine)) {
        self.each_ring(RingTag::Pending, f);
    }

    fn each_ring(&mut self, tag: RingTag, mut f: impl FnMut(&mut Engine)) {
        let p = self
            .ctx
            .process
            .expect("ring iteration outside a process context");
        let head = {
            let rec = self.processes.get(p.0).expect("process missing");
            match tag {
                RingTag::Waiting => rec.waiting,
                RingTag::Pending => rec.pending,
            }
        };
        let Some(h) = head else { return };
        let saved_sub = self.ctx.sub;
        let mut cursor = Some(h);
        while let Some(c) = cursor {
            let Some(next) = self.subscriptions.get(c.0).map(|r| r.next) else {
                break;
            };
            self.ctx.sub = Some(c);
            f(self);
            cursor = match next {
                Some(n) if n != h && n != c => Some(n),
                _ => None,
            };
        }
        self.ctx.sub = saved_sub;
    }

    /// Arranges for the current process to tick.
    ///
    /// During `perform` (before the effect has returned) the tick runs
    /// immediately. Otherwise the process joins the current instant when
    /// the reactor is idle or its publisher's rank exceeds the cursor, and
    /// is deferred to the next instant when it does not.
    pub fn schedule(&mut self) {
        let p = self.ctx.process.expect("schedule outside a process context");
        let (armed, scheduled, retired, pb) = {
            let rec = self.processes.get(p.0).expect("process missing");
            (rec.armed, rec.scheduled, rec.retired, rec.publisher)
        };
        if retired {
            return;
        }
        if !armed {
            let tick = self
                .publishers
                .get(pb.0)
                .expect("publisher missing")
                .vtable
                .tick
                .clone();
            tick(self);
            return;
        }
        if scheduled {
            return;
        }
        let in_instant = match &self.ctx.cursor {
            None => true,
            Some(cursor) => {
                &self
                    .publishers
                    .get(pb.0)
                    .expect("publisher missing")
                    .ranks
                    > cursor
            }
        };
        self.processes
            .get_mut(p.0)
            .expect("process missing")
            .scheduled = true;
        let Engine {
            publishers,
            processes,
            ctx,
            ..
        } = self;
        if in_instant {
            ctx.reacted = Some(heap_push(publishers, processes, ctx.reacted.take(), p));
        } else {
            ctx.delayed = Some(heap_push(publishers, processes, ctx.delayed.take(), p));
        }
        trace!(process = %p, deferred = !in_instant, "scheduled");
    }

    /// Marks the current process's underlying computation as terminated.
    ///
    /// The publisher's `current` transitions back to idle (a later
    /// subscribe spawns a fresh process) and the process is retired: its
    /// handle is dropped and it can no longer be scheduled.
    pub fn resolve(&mut self) {
        let p = self.ctx.process.expect("resolve outside a process context");
        let Some(rec) = self.processes.get_mut(p.0) else {
            return;
        };
        let pb = rec.publisher;
        rec.retired = true;
        rec.handle = None;
        if let Some(pubrec) = self.publishers.get_mut(pb.0) {
            if pubrec.current == Some(p) {
                pubrec.current = None;
            }
        }
        debug!(publisher = %pb, process = %p, "process resolved");
    }

    // === Frames and propagation ===

    fn enter(&mut self, pb: PublisherId) -> Frame {
        let rec = self.publishers.get_mut(pb.0).expect("publisher missing");
        let reentrant = rec.held;
        rec.held = true;
        self.ctx.depth += 1;
        Frame {
            publisher: pb,
            reentrant,
            saved_process: self.ctx.process,
            saved_sub: self.ctx.sub,
        }
    }

    fn exit(&mut self, frame: Frame) {
        self.ctx.process = frame.saved_process;
        self.ctx.sub = frame.saved_sub;
        if !frame.reentrant {
            self.propagate(frame.publisher);
            if let Some(rec) = self.publishers.get_mut(frame.publisher.0) {
                rec.held = false;
            }
        }
        self.ctx.depth -= 1;
        if self.ctx.depth == 0 {
            self.react();
        }
    }

    /// Drains a publisher's propagation stack.
    ///
    /// Each notification runs in the consumer's context: the consumer's
    /// process becomes current, and when the consumer belongs to a
    /// publisher a frame is opened on it, so notifications the consumer
    /// emits in response drain when that frame exits. Propagation is
    /// therefore depth-first: one consumer's emissions reach its own
    /// consumers before further work in unrelated consumers.
    fn propagate(&mut self, pb: PublisherId) {
        enum Sink {
            Task(publisher::TaskSink, Value),
            Flow(publisher::FlowSink),
        }

        let saved_process = self.ctx.process;
        let saved_sub = self.ctx.sub;
        loop {
            let Some(pubrec) = self.publishers.get_mut(pb.0) else {
                break;
            };
            let Some(s) = pubrec.prop else { break };
            let srec = self
                .subscriptions
                .get_mut(s.0)
                .expect("queued subscription missing");
            pubrec.prop = srec.prop_next;
            srec.prop_next = None;
            srec.queued = false;
            let source = srec.source;
            let flag = srec.flag;

            let sink = match &srec.consumer {
                Consumer::Task {
                    on_success,
                    on_failure,
                } => {
                    let cb = if flag {
                        on_success.clone()
                    } else {
                        on_failure.clone()
                    };
                    let value = std::mem::replace(&mut srec.state, Box::new(()));
                    Sink::Task(cb, value)
                }
                Consumer::Flow { on_step, on_done } => Sink::Flow(if flag {
                    on_step.clone()
                } else {
                    on_done.clone()
                }),
            };

            let consumer_pub = match source {
                Some(src) => match self.processes.get(src.0) {
                    Some(rec) => Some(rec.publisher),
                    None => {
                        // The consumer process is gone; drop the
                        // notification.
                        trace!(subscription = %s, "consumer released, notification dropped");
                        self.release_subscription_if_settled(s);
                        continue;
                    }
                },
                None => None,
            };

            trace!(subscription = %s, flag, "deliver");
            match consumer_pub {
                Some(cpb) => {
                    let frame = self.enter(cpb);
                    self.ctx.process = source;
                    self.ctx.sub = Some(s);
                    match sink {
                        Sink::Task(cb, value) => cb(self, s, value),
                        Sink::Flow(cb) => cb(self, s),
                    }
                    self.exit(frame);
                }
                None => {
                    self.ctx.process = None;
                    self.ctx.sub = Some(s);
                    match sink {
                        Sink::Task(cb, value) => cb(self, s, value),
                        Sink::Flow(cb) => cb(self, s),
                    }
                }
            }
            self.release_subscription_if_settled(s);
        }
        self.ctx.process = saved_process;
        self.ctx.sub = saved_sub;
    }

    /// Removes a subscription from its ring and queues its notification on
    /// the publisher's propagation stack.
    fn dispatch(&mut self, s: SubscriptionId) {
        let (target, ring, pb) = {
            let rec = self
                .subscriptions
                .get(s.0)
                .expect("dispatch on missing subscription");
            (rec.target, rec.ring, rec.publisher)
        };
        if ring.is_some() {
            let Engine {
                processes,
                subscriptions,
                ..
            } = self;
            let proc = processes.get_mut(target.0).expect("process missing");
            let head = match ring.expect("ring tag") {
                RingTag::Waiting => &mut proc.waiting,
                RingTag::Pending => &mut proc.pending,
            };
            ring_detach(subscriptions, head, s);
        }
        self.prop_push(pb, s);
    }

    /// Pushes a subscription onto the publisher's LIFO propagation stack
    /// unless it is already queued.
    fn prop_push(&mut self, pb: PublisherId, s: SubscriptionId) {
        let prev = self.publishers.get(pb.0).expect("publisher missing").prop;
        let rec = self
            .subscriptions
            .get_mut(s.0)
            .expect("subscription missing");
        if rec.queued {
            return;
        }
        rec.queued = true;
        rec.prop_next = prev;
        self.publishers.get_mut(pb.0).expect("publisher missing").prop = Some(s);
    }

    /// Cancels a process: detaches it from its publisher and invokes the
    /// underlying computation's cancellation action. The computation is
    /// expected to terminate through its notifiers afterwards.
    fn cancel_process(&mut self, p: ProcessId) {
        let Some(rec) = self.processes.get_mut(p.0) else {
            return;
        };
        let pb = rec.publisher;
        rec.retired = true;
        let handle = rec.handle.take();
        if let Some(pubrec) = self.publishers.get_mut(pb.0) {
            if pubrec.current == Some(p) {
                pubrec.current = None;
            }
        }
        debug!(publisher = %pb, process = %p, "process cancelled");
        if let Some(mut h) = handle {
            let saved_process = self.ctx.process;
            let saved_sub = self.ctx.sub;
            self.ctx.process = Some(p);
            self.ctx.sub = None;
            h.cancel(self);
            self.ctx.process = saved_process;
            self.ctx.sub = saved_sub;
        }
        self.release_process_if_settled(p);
    }

    /// Releases a subscription whose lifecycle ended: detached from both
    /// rings with no notification in flight.
    fn release_subscription_if_settled(&mut self, s: SubscriptionId) {
        let Some(rec) = self.subscriptions.get(s.0) else {
            return;
        };
        if rec.is_detached() && !rec.queued {
            let target = rec.target;
            self.subscriptions.remove(s.0);
            trace!(subscription = %s, "subscription released");
            self.release_process_if_settled(target);
        }
    }

    /// Releases a process that is no longer its publisher's current, holds
    /// no consumers, and sits in no heap.
    fn release_process_if_settled(&mut self, p: ProcessId) {
        let Some(rec) = self.processes.get(p.0) else {
            return;
        };
        if !rec.rings_empty() || rec.scheduled {
            return;
        }
        let pb = rec.publisher;
        let is_current = self
            .publishers
            .get(pb.0)
            .is_some_and(|r| r.current == Some(p));
        if !is_current {
            self.processes.remove(p.0);
            trace!(process = %p, "process released");
        }
    }

    // === The reactor ===

    /// Drains the scheduled heaps: ticks in ascending rank order within an
    /// instant, then promotes the deferred heap and advances time.
    fn react(&mut self) {
        if self.ctx.reacting {
            return;
        }
        if self.ctx.reacted.is_none() && self.ctx.delayed.is_none() {
            return;
        }
        self.ctx.reacting = true;
        loop {
            loop {
                let popped = {
                    let Engine {
                        publishers,
                        processes,
                        ctx,
                        ..
                    } = self;
                    heap_pop(publishers, processes, &mut ctx.reacted)
                };
                let Some(ps) = popped else { break };
                let Some(rec) = self.processes.get_mut(ps.0) else {
                    continue;
                };
                rec.scheduled = false;
                let pb = rec.publisher;
                if rec.retired {
                    self.release_process_if_settled(ps);
                    continue;
                }
                let (rank, tick) = {
                    let pubrec = self.publishers.get(pb.0).expect("publisher missing");
                    (pubrec.ranks.clone(), pubrec.vtable.tick.clone())
                };
                trace!(publisher = %pb, process = %ps, time = %self.ctx.time, "tick");
                self.ctx.process = Some(ps);
                self.ctx.sub = None;
                self.ctx.cursor = Some(rank);
                self.publishers
                    .get_mut(pb.0)
                    .expect("publisher missing")
                    .held = true;
                tick(self);
                self.propagate(pb);
                if let Some(pubrec) = self.publishers.get_mut(pb.0) {
                    pubrec.held = false;
                }
                self.release_process_if_settled(ps);
            }
            if self.ctx.delayed.is_none() {
                break;
            }
            self.ctx.reacted = self.ctx.delayed.take();
            self.ctx.time = self.ctx.time.next();
            debug!(time = %self.ctx.time, "instant advanced");
        }
        self.ctx.process = None;
        self.ctx.sub = None;
        self.ctx.cursor = None;
        self.ctx.reacting = false;
    }
}
