#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! mod common;
//! use common::*;
//! ```
//!
//! Besides logging helpers, this module holds the combinator-author
//! fixtures the scenario suite drives: manually driven source flows,
//! one-shot tasks, and a zip-of-flows combinator implemented against the
//! engine's callback contract exactly as a library combinator would be.

use riptide::{
    Engine, FlowBuilder, Notifier, ProcessHandle, PublisherId, SubscriptionId, TaskBuilder, Value,
};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// A shared, ordered record of observable events.
///
/// Fixtures and consumer callbacks push labeled events; tests assert the
/// exact sequence.
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    /// Returns the events recorded so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Returns and clears the events recorded so far.
    #[must_use]
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

// ============================================================================
// Source flow fixture
// ============================================================================

/// Process state of a source flow.
struct SourceState {
    terminated: bool,
}

/// Terminates a source process: done to every consumer, then resolve.
fn source_terminate(e: &mut Engine, label: &'static str, log: &EventLog) {
    if e.process_state::<SourceState>().terminated {
        return;
    }
    e.process_state::<SourceState>().terminated = true;
    log.push(format!("{label} done"));
    e.each_waiting(|e| e.done());
    e.each_pending(|e| e.done());
    e.resolve();
}

struct SourceHandle {
    label: &'static str,
    log: EventLog,
    queue: Rc<RefCell<VecDeque<String>>>,
    closed: Rc<Cell<bool>>,
}

impl ProcessHandle for SourceHandle {
    fn transfer(&mut self, e: &mut Engine) -> riptide::Result<Value> {
        let popped = self.queue.borrow_mut().pop_front();
        match popped {
            Some(v) => {
                self.log.push(format!("{} transfer {v}", self.label));
                if !self.queue.borrow().is_empty() {
                    // More buffered values: notify again right away.
                    e.each_waiting(|e| e.step());
                } else if self.closed.get() {
                    source_terminate(e, self.label, &self.log);
                }
                Ok(Box::new(v))
            }
            None => Err(riptide::Error::user(format!("{} drained", self.label))),
        }
    }

    fn cancel(&mut self, e: &mut Engine) {
        self.log.push(format!("{} cancelled", self.label));
        source_terminate(e, self.label, &self.log);
    }
}

/// A manually driven flow producer.
///
/// Values are buffered externally (as a timer or I/O driver would buffer
/// completions) and announced through the effect's notifiers. Consumers
/// pull values with [`Engine::pull`]; the transfer eagerly re-notifies
/// while the buffer is non-empty, and a closed source terminates once the
/// buffer drains.
pub struct Source {
    pub publisher: PublisherId,
    queue: Rc<RefCell<VecDeque<String>>>,
    closed: Rc<Cell<bool>>,
    notifiers: Rc<RefCell<Option<(Notifier, Notifier)>>>,
}

impl Source {
    pub fn new(engine: &mut Engine, label: &'static str, log: &EventLog) -> Self {
        let queue: Rc<RefCell<VecDeque<String>>> = Rc::default();
        let closed: Rc<Cell<bool>> = Rc::default();
        let notifiers: Rc<RefCell<Option<(Notifier, Notifier)>>> = Rc::default();
        let log = log.clone();

        let publisher = FlowBuilder::new({
            let queue = queue.clone();
            let closed = closed.clone();
            let notifiers = notifiers.clone();
            let log = log.clone();
            move |_e, left, right| {
                *notifiers.borrow_mut() = Some((left, right));
                Box::new(SourceHandle {
                    label,
                    log: log.clone(),
                    queue: queue.clone(),
                    closed: closed.clone(),
                }) as Box<dyn ProcessHandle>
            }
        })
        .init_process(|| Box::new(SourceState { terminated: false }))
        .subscribe({
            let queue = queue.clone();
            let closed = closed.clone();
            let log = log.clone();
            move |e| {
                if e.process_state::<SourceState>().terminated {
                    e.done();
                    return;
                }
                if closed.get() && queue.borrow().is_empty() {
                    // Already exhausted when the first consumer arrives.
                    e.process_state::<SourceState>().terminated = true;
                    log.push(format!("{label} done"));
                    e.done();
                    e.resolve();
                }
            }
        })
        .on_left(|e| e.each_waiting(|e| e.step()))
        .on_right({
            let log = log.clone();
            move |e| source_terminate(e, label, &log)
        })
        .register(engine);

        Self {
            publisher,
            queue,
            closed,
            notifiers,
        }
    }

    /// Buffers a value and announces it.
    pub fn emit(&self, engine: &mut Engine, v: &str) {
        self.queue.borrow_mut().push_back(v.to_string());
        let n: Option<(Notifier, Notifier)> = *self.notifiers.borrow();
        if let Some((left, _)) = n {
            left.invoke(engine);
        }
    }

    /// Buffers a final value: the source terminates once it is consumed.
    pub fn emit_last(&self, engine: &mut Engine, v: &str) {
        self.closed.set(true);
        self.emit(engine, v);
    }

    /// Terminates the source.
    pub fn finish(&self, engine: &mut Engine) {
        self.closed.set(true);
        let n: Option<(Notifier, Notifier)> = *self.notifiers.borrow();
        if let Some((_, right)) = n {
            right.invoke(engine);
        }
    }

    /// Marks the source exhausted before any process spawns; the first
    /// subscriber observes immediate termination.
    pub fn preclose(&self) {
        self.closed.set(true);
    }
}

// ============================================================================
// One-shot task fixture
// ============================================================================

struct OneshotHandle {
    label: &'static str,
    log: EventLog,
}

impl ProcessHandle for OneshotHandle {
    fn transfer(&mut self, _e: &mut Engine) -> riptide::Result<Value> {
        Err(riptide::Error::user("tasks do not transfer"))
    }

    fn cancel(&mut self, e: &mut Engine) {
        self.log.push(format!("{} cancelled", self.label));
        e.each_waiting(|e| e.failure(Box::new(riptide::Error::cancelled())));
        e.resolve();
    }
}

/// A manually completed task producer.
pub struct OneshotTask {
    pub publisher: PublisherId,
    slot: Rc<RefCell<Option<String>>>,
    notifiers: Rc<RefCell<Option<(Notifier, Notifier)>>>,
}

impl OneshotTask {
    pub fn new(engine: &mut Engine, label: &'static str, log: &EventLog) -> Self {
        let slot: Rc<RefCell<Option<String>>> = Rc::default();
        let notifiers: Rc<RefCell<Option<(Notifier, Notifier)>>> = Rc::default();
        let log = log.clone();

        let publisher = TaskBuilder::new({
            let notifiers = notifiers.clone();
            let log = log.clone();
            move |_e, left, right| {
                *notifiers.borrow_mut() = Some((left, right));
                Box::new(OneshotHandle {
                    label,
                    log: log.clone(),
                }) as Box<dyn ProcessHandle>
            }
        })
        .on_left({
            let slot = slot.clone();
            let log = log.clone();
            move |e| {
                let v = slot.borrow().clone().expect("no value to deliver");
                log.push(format!("{label} succeed {v}"));
                e.each_waiting(|e| e.success(Box::new(v.clone())));
                e.resolve();
            }
        })
        .on_right({
            let log = log.clone();
            move |e| {
                log.push(format!("{label} fail"));
                e.each_waiting(|e| e.failure(Box::new(riptide::Error::user("task failed"))));
                e.resolve();
            }
        })
        .register(engine);

        Self {
            publisher,
            slot,
            notifiers,
        }
    }

    /// Completes the task successfully with `v`.
    pub fn succeed(&self, engine: &mut Engine, v: &str) {
        *self.slot.borrow_mut() = Some(v.to_string());
        let n: Option<(Notifier, Notifier)> = *self.notifiers.borrow();
        if let Some((left, _)) = n {
            left.invoke(engine);
        }
    }

    /// Fails the task.
    pub fn fail(&self, engine: &mut Engine) {
        let n: Option<(Notifier, Notifier)> = *self.notifiers.borrow();
        if let Some((_, right)) = n {
            right.invoke(engine);
        }
    }
}

// ============================================================================
// Zip combinator fixture
// ============================================================================

type CombineFn = Rc<dyn Fn(&mut Engine, Vec<Value>) -> riptide::Result<Value>>;

/// Process state of a zip.
struct ZipState {
    subs: Vec<Option<SubscriptionId>>,
    ready: Vec<bool>,
    live: Vec<bool>,
    /// True while a consumer pull cycle is in progress; input terminations
    /// observed mid-cycle are deferred so the cycle still completes.
    pulling: bool,
    cancel_after_pull: bool,
    terminated: bool,
}

impl ZipState {
    fn new(n: usize) -> Self {
        Self {
            subs: vec![None; n],
            ready: vec![false; n],
            live: vec![true; n],
            pulling: false,
            cancel_after_pull: false,
            terminated: false,
        }
    }
}

fn zip_on_step(e: &mut Engine, i: usize) {
    let all_ready = {
        let st = e.process_state::<ZipState>();
        st.ready[i] = true;
        !st.terminated
            && !st.pulling
            && st.live.iter().all(|l| *l)
            && st.ready.iter().all(|r| *r)
    };
    if all_ready {
        e.each_waiting(|e| e.step());
    }
}

fn zip_on_done(e: &mut Engine, i: usize) {
    {
        let st = e.process_state::<ZipState>();
        st.live[i] = false;
        st.subs[i] = None;
        if st.terminated {
            return;
        }
        if st.pulling {
            st.cancel_after_pull = true;
            return;
        }
    }
    zip_settle(e);
}

/// Cancels every remaining input subscription, then terminates the zip.
fn zip_settle(e: &mut Engine) {
    loop {
        let next = {
            let st = e.process_state::<ZipState>();
            st.subs.iter().position(Option::is_some)
        };
        let Some(i) = next else { break };
        let sub = {
            let st = e.process_state::<ZipState>();
            st.live[i] = false;
            st.subs[i].take().expect("input subscription present")
        };
        e.unsubscribe(sub);
    }
    let terminate = {
        let st = e.process_state::<ZipState>();
        if st.terminated {
            false
        } else {
            st.terminated = true;
            true
        }
    };
    if terminate {
        e.each_waiting(|e| e.done());
        e.each_pending(|e| e.done());
        e.resolve();
    }
}

fn zip_accept(e: &mut Engine, combine: &CombineFn, log: &EventLog) -> riptide::Result<Value> {
    e.process_state::<ZipState>().pulling = true;
    let n = e.process_state::<ZipState>().subs.len();
    let mut vals = Vec::with_capacity(n);
    let mut failure = None;
    for i in 0..n {
        let sub = e.process_state::<ZipState>().subs[i];
        let Some(sub) = sub else {
            failure = Some(riptide::Error::cancelled());
            break;
        };
        match e.pull(sub) {
            Ok(v) => {
                e.process_state::<ZipState>().ready[i] = false;
                vals.push(v);
            }
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }
    let result = match failure {
        None => {
            log.push("combine");
            combine(e, vals)
        }
        Some(err) => Err(err),
    };
    let deferred = {
        let st = e.process_state::<ZipState>();
        st.pulling = false;
        std::mem::take(&mut st.cancel_after_pull)
    };
    if result.is_err() || deferred {
        zip_settle(e);
    }
    result
}

struct ZipHandle;

impl ProcessHandle for ZipHandle {
    fn transfer(&mut self, _e: &mut Engine) -> riptide::Result<Value> {
        Err(riptide::Error::user("zip does not transfer"))
    }

    fn cancel(&mut self, e: &mut Engine) {
        zip_settle(e);
    }
}

/// Builds a zip-of-flows publisher over `inputs`.
///
/// The zip notifies its consumers once every input holds a value; a pull
/// transfers one value from each input in order and combines them. Any
/// input terminating terminates the zip after the in-flight pull cycle, if
/// any, completes; the remaining inputs are cancelled.
pub fn zip(
    engine: &mut Engine,
    inputs: &[PublisherId],
    combine: impl Fn(&mut Engine, Vec<Value>) -> riptide::Result<Value> + 'static,
    log: &EventLog,
) -> PublisherId {
    let n = inputs.len();
    let inputs: Rc<[PublisherId]> = Rc::from(inputs);
    let combine: CombineFn = Rc::new(combine);
    let log = log.clone();

    FlowBuilder::new(move |_e, _left, _right| Box::new(ZipHandle) as Box<dyn ProcessHandle>)
        .init_process(move || Box::new(ZipState::new(n)))
        .perform({
            let inputs = inputs.clone();
            move |e| {
                for i in 0..inputs.len() {
                    if e.process_state::<ZipState>().terminated {
                        break;
                    }
                    let sub = e.subscribe_flow(
                        inputs[i],
                        move |e, _s| zip_on_step(e, i),
                        move |e, _s| zip_on_done(e, i),
                    );
                    let st = e.process_state::<ZipState>();
                    if st.live[i] {
                        st.subs[i] = Some(sub);
                    }
                }
            }
        })
        .subscribe(|e| {
            if e.process_state::<ZipState>().terminated {
                e.done();
            }
        })
        .accept({
            let log = log.clone();
            move |e| zip_accept(e, &combine, &log)
        })
        .register(engine)
}

/// Default combiner: collects the string values into `[a b ...]`.
pub fn collect_combiner(_e: &mut Engine, vals: Vec<Value>) -> riptide::Result<Value> {
    let parts: Vec<String> = vals
        .into_iter()
        .map(|v| *v.downcast::<String>().expect("string value"))
        .collect();
    Ok(Box::new(format!("[{}]", parts.join(" "))))
}

// ============================================================================
// Consumer helpers
// ============================================================================

/// Subscribes a flow consumer that records notifications without pulling.
pub fn watching_consumer(
    engine: &mut Engine,
    publisher: PublisherId,
    name: impl Into<String>,
    log: &EventLog,
) -> SubscriptionId {
    let name = name.into();
    let step_name = name.clone();
    let step_log = log.clone();
    let done_log = log.clone();
    engine.subscribe_flow(
        publisher,
        move |_, _| step_log.push(format!("{step_name} notified")),
        move |_, _| done_log.push(format!("{name} done")),
    )
}

/// Subscribes a flow consumer that pulls every value eagerly, collecting
/// them, and records termination.
pub fn collecting_consumer(
    engine: &mut Engine,
    publisher: PublisherId,
    collected: Rc<RefCell<Vec<String>>>,
    done: Rc<Cell<bool>>,
) -> SubscriptionId {
    engine.subscribe_flow(
        publisher,
        move |e, s| match e.pull(s) {
            Ok(v) => collected
                .borrow_mut()
                .push(*v.downcast::<String>().expect("string value")),
            Err(err) => assert!(err.is_cancelled(), "unexpected pull error: {err}"),
        },
        move |_, _| done.set(true),
    )
}
