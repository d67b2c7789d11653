//! Publisher records, callback vtables, and the builders that assemble them.
//!
//! A publisher is the immutable shape of a reactive node: its rank, its
//! callback slots, and its spawn function (`effect`). Combinator authors
//! assemble publishers through [`TaskBuilder`] and [`FlowBuilder`] and then
//! implement the callback contract:
//!
//! | Slot        | Task meaning                | Flow meaning            |
//! |-------------|-----------------------------|-------------------------|
//! | `perform`   | initial setup               | initial setup           |
//! | `subscribe` | per-subscription setup      | per-subscription setup  |
//! | `on_left`   | success notification sink   | step notification sink  |
//! | `on_right`  | failure notification sink   | done notification sink  |
//! | `tick`      | re-entry for scheduled work | same                    |
//! | `accept`    | (absent)                    | consumer pulled         |
//! | `reject`    | (absent)                    | consumer cancelled      |
//!
//! Publisher kind is a runtime property: a publisher is a flow exactly when
//! it carries `accept`/`reject` hooks.

use crate::engine::Engine;
use crate::error::Result;
use crate::types::{ProcessId, Rank, SubscriptionId};
use std::any::Any;
use std::rc::Rc;

/// A type-erased value moving through the engine: process state,
/// subscription state, and the payloads of transfers and task completions.
pub type Value = Box<dyn Any>;

/// A producer-side callback slot.
pub(crate) type Callback = Rc<dyn Fn(&mut Engine)>;

/// The `accept` hook of a flow publisher: computes the value a pull returns.
pub(crate) type AcceptFn = Rc<dyn Fn(&mut Engine) -> Result<Value>>;

/// A factory for the initial state of a process or subscription.
pub(crate) type StateInit = Rc<dyn Fn() -> Value>;

/// A consumer sink on a task subscription; receives the terminal value.
pub(crate) type TaskSink = Rc<dyn Fn(&mut Engine, SubscriptionId, Value)>;

/// A consumer sink on a flow subscription.
pub(crate) type FlowSink = Rc<dyn Fn(&mut Engine, SubscriptionId)>;

/// The spawn function of a publisher: builds the opaque process
/// representation, wiring the two notifiers into the underlying computation.
pub(crate) type EffectFn =
    Rc<dyn Fn(&mut Engine, Notifier, Notifier) -> Box<dyn ProcessHandle>>;

/// The opaque process value returned by a publisher's effect.
///
/// The engine never interprets it; it drives the underlying computation
/// through exactly two operations.
pub trait ProcessHandle {
    /// Extracts the next produced value.
    ///
    /// Called by [`Engine::transfer`] on behalf of the publisher's `accept`
    /// hook. May fail; the failure propagates to the pulling consumer.
    fn transfer(&mut self, engine: &mut Engine) -> Result<Value>;

    /// Cancels the underlying computation.
    ///
    /// The computation is still expected to terminate through its notifiers
    /// afterwards (failure for tasks, done for flows).
    fn cancel(&mut self, engine: &mut Engine);
}

/// Which of a publisher's two notification sinks a notifier drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Success (tasks) or step (flows).
    Left,
    /// Failure (tasks) or done (flows).
    Right,
}

/// A re-entry handle bound to one process and one notification side.
///
/// The effect receives two of these and hands them to whatever drives the
/// underlying computation (a timer driver, an I/O completion, another
/// engine callback). Invoking one enters the engine, makes the bound
/// process current, and runs the publisher's corresponding sink. Invoking a
/// notifier whose process has already been released is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct Notifier {
    pub(crate) process: ProcessId,
    pub(crate) side: Side,
}

impl Notifier {
    /// Returns which sink this notifier drives.
    #[must_use]
    pub const fn side(self) -> Side {
        self.side
    }

    /// Re-enters the engine and runs the bound notification sink.
    pub fn invoke(self, engine: &mut Engine) {
        engine.notify(self);
    }
}

/// Consumer notification sinks attached at subscribe time.
///
/// Task sinks receive the terminal value; flow sinks are value-free, the
/// consumer reads its state or pulls in response.
pub(crate) enum Consumer {
    Task {
        on_success: TaskSink,
        on_failure: TaskSink,
    },
    Flow {
        on_step: FlowSink,
        on_done: FlowSink,
    },
}

/// The flow-only callback hooks; their presence is what makes a publisher a
/// flow.
pub(crate) struct FlowHooks {
    pub(crate) accept: AcceptFn,
    pub(crate) reject: Callback,
}

/// The callback vtable of a publisher.
pub(crate) struct Vtable {
    pub(crate) perform: Callback,
    pub(crate) subscribe: Callback,
    pub(crate) tick: Callback,
    pub(crate) on_left: Callback,
    pub(crate) on_right: Callback,
    pub(crate) flow: Option<FlowHooks>,
}

/// The immutable shape of a reactive node plus its mutable dispatch state.
pub(crate) struct PublisherRecord {
    /// Position in the reactive DAG; fixed at creation.
    pub(crate) ranks: Rank,
    /// Reentrancy guard: true while some frame executes on behalf of this
    /// publisher. The outermost frame drains `prop` on exit.
    pub(crate) held: bool,
    /// Number of publishers created under this publisher's process so far.
    pub(crate) children: u32,
    /// The running process, if any.
    pub(crate) current: Option<ProcessId>,
    /// Head of the LIFO propagation stack of subscriptions awaiting
    /// delivery.
    pub(crate) prop: Option<SubscriptionId>,
    /// Spawn function for new processes.
    pub(crate) effect: EffectFn,
    /// Factory for fresh process state.
    pub(crate) init_process: StateInit,
    /// Factory for fresh subscription state.
    pub(crate) init_sub: StateInit,
    pub(crate) vtable: Vtable,
}

impl PublisherRecord {
    /// Flow publishers carry accept/reject hooks; tasks do not.
    pub(crate) fn is_flow(&self) -> bool {
        self.vtable.flow.is_some()
    }
}

fn noop() -> Callback {
    Rc::new(|_| {})
}

fn unit_state() -> StateInit {
    Rc::new(|| Box::new(()))
}

/// Builder for task publishers (single terminal value).
///
/// Every slot except the effect defaults to a no-op; initial states default
/// to `()`.
pub struct TaskBuilder {
    effect: EffectFn,
    perform: Callback,
    subscribe: Callback,
    tick: Callback,
    on_left: Callback,
    on_right: Callback,
    init_process: StateInit,
    init_sub: StateInit,
}

impl TaskBuilder {
    /// Starts a task publisher from its effect.
    #[must_use]
    pub fn new<F>(effect: F) -> Self
    where
        F: Fn(&mut Engine, Notifier, Notifier) -> Box<dyn ProcessHandle> + 'static,
    {
        Self {
            effect: Rc::new(effect),
            perform: noop(),
            subscribe: noop(),
            tick: noop(),
            on_left: noop(),
            on_right: noop(),
            init_process: unit_state(),
            init_sub: unit_state(),
        }
    }

    /// Sets the initial-setup callback, run once when the process spawns.
    #[must_use]
    pub fn perform(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.perform = Rc::new(f);
        self
    }

    /// Sets the per-subscription setup callback.
    #[must_use]
    pub fn subscribe(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.subscribe = Rc::new(f);
        self
    }

    /// Sets the scheduled-work callback.
    #[must_use]
    pub fn tick(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.tick = Rc::new(f);
        self
    }

    /// Sets the success notification sink.
    #[must_use]
    pub fn on_left(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.on_left = Rc::new(f);
        self
    }

    /// Sets the failure notification sink.
    #[must_use]
    pub fn on_right(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.on_right = Rc::new(f);
        self
    }

    /// Sets the factory for fresh process state.
    #[must_use]
    pub fn init_process(mut self, f: impl Fn() -> Value + 'static) -> Self {
        self.init_process = Rc::new(f);
        self
    }

    /// Sets the factory for fresh subscription state.
    #[must_use]
    pub fn init_sub(mut self, f: impl Fn() -> Value + 'static) -> Self {
        self.init_sub = Rc::new(f);
        self
    }

    /// Registers the publisher with the engine and returns its id.
    pub fn register(self, engine: &mut Engine) -> crate::types::PublisherId {
        engine.register(
            self.effect,
            self.init_process,
            self.init_sub,
            Vtable {
                perform: self.perform,
                subscribe: self.subscribe,
                tick: self.tick,
                on_left: self.on_left,
                on_right: self.on_right,
                flow: None,
            },
        )
    }
}

/// Builder for flow publishers (a sequence of values, then done).
///
/// The `accept` hook defaults to a plain [`Engine::transfer`], which is the
/// common case of a flow whose process representation yields values
/// directly.
pub struct FlowBuilder {
    effect: EffectFn,
    perform: Callback,
    subscribe: Callback,
    tick: Callback,
    on_left: Callback,
    on_right: Callback,
    accept: AcceptFn,
    reject: Callback,
    init_process: StateInit,
    init_sub: StateInit,
}

impl FlowBuilder {
    /// Starts a flow publisher from its effect.
    #[must_use]
    pub fn new<F>(effect: F) -> Self
    where
        F: Fn(&mut Engine, Notifier, Notifier) -> Box<dyn ProcessHandle> + 'static,
    {
        Self {
            effect: Rc::new(effect),
            perform: noop(),
            subscribe: noop(),
            tick: noop(),
            on_left: noop(),
            on_right: noop(),
            accept: Rc::new(Engine::transfer),
            reject: noop(),
            init_process: unit_state(),
            init_sub: unit_state(),
        }
    }

    /// Sets the initial-setup callback, run once when the process spawns.
    #[must_use]
    pub fn perform(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.perform = Rc::new(f);
        self
    }

    /// Sets the per-subscription setup callback.
    #[must_use]
    pub fn subscribe(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.subscribe = Rc::new(f);
        self
    }

    /// Sets the scheduled-work callback.
    #[must_use]
    pub fn tick(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.tick = Rc::new(f);
        self
    }

    /// Sets the step notification sink.
    #[must_use]
    pub fn on_left(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.on_left = Rc::new(f);
        self
    }

    /// Sets the done notification sink.
    #[must_use]
    pub fn on_right(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.on_right = Rc::new(f);
        self
    }

    /// Sets the consumer-pull hook; its result is what the pull returns.
    #[must_use]
    pub fn accept(mut self, f: impl Fn(&mut Engine) -> Result<Value> + 'static) -> Self {
        self.accept = Rc::new(f);
        self
    }

    /// Sets the consumer-cancelled hook, run when a non-sole waiting
    /// subscription withdraws.
    #[must_use]
    pub fn reject(mut self, f: impl Fn(&mut Engine) + 'static) -> Self {
        self.reject = Rc::new(f);
        self
    }

    /// Sets the factory for fresh process state.
    #[must_use]
    pub fn init_process(mut self, f: impl Fn() -> Value + 'static) -> Self {
        self.init_process = Rc::new(f);
        self
    }

    /// Sets the factory for fresh subscription state.
    #[must_use]
    pub fn init_sub(mut self, f: impl Fn() -> Value + 'static) -> Self {
        self.init_sub = Rc::new(f);
        self
    }

    /// Registers the publisher with the engine and returns its id.
    pub fn register(self, engine: &mut Engine) -> crate::types::PublisherId {
        engine.register(
            self.effect,
            self.init_process,
            self.init_sub,
            Vtable {
                perform: self.perform,
                subscribe: self.subscribe,
                tick: self.tick,
                on_left: self.on_left,
                on_right: self.on_right,
                flow: Some(FlowHooks {
                    accept: self.accept,
                    reject: self.reject,
                }),
            },
        )
    }
}
