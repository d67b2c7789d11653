//! Riptide: a reactive propagator engine.
//!
//! # Overview
//!
//! Riptide is the scheduling and dispatch core of an asynchronous library:
//! a directed graph of computations that produce either a single value
//! (tasks) or a sequence of values (flows), with structured cancellation,
//! deterministic ordering, and at most one concurrent activation per node.
//! User-facing combinators are thin collaborators that implement a small
//! callback vtable and drive their consumers through the primitives the
//! engine exposes.
//!
//! # Core Guarantees
//!
//! - **At most one process per publisher**: subscribers share the running
//!   activation; the last one out cancels the underlying computation
//! - **Deterministic delivery**: notifications dispatched from one callback
//!   fire in LIFO order; ticks fire in ascending rank order per instant
//! - **Glitch-free instants**: work at or below the reaction cursor is
//!   deferred to the next logical instant, so every instant is one
//!   topological sweep of the DAG
//! - **Cancellation is a protocol**: cancel requests are synchronous and
//!   idempotent; terminations always flow back through notifications
//! - **Single writer**: the engine is single-threaded cooperative; all
//!   state is reached through `&mut Engine`, never ambient globals
//!
//! # Module Structure
//!
//! - [`engine`]: The propagator itself (frames, propagation, reactor)
//! - [`types`]: Identifier types, logical time, rank vectors
//! - [`error`]: Error types
//! - [`config`]: Engine configuration
//! - [`util`]: Internal utilities (record arenas)
//!
//! # Example
//!
//! ```
//! use riptide::{Engine, ProcessHandle, TaskBuilder, Value};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! struct Inert;
//!
//! impl ProcessHandle for Inert {
//!     fn transfer(&mut self, _: &mut Engine) -> riptide::Result<Value> {
//!         Err(riptide::Error::user("tasks do not transfer"))
//!     }
//!     fn cancel(&mut self, _: &mut Engine) {}
//! }
//!
//! let mut engine = Engine::new();
//! // A task that completes every subscriber immediately.
//! let task = TaskBuilder::new(|_, _, _| Box::new(Inert) as Box<dyn ProcessHandle>)
//!     .subscribe(|e| {
//!         e.success(Box::new(42i64));
//!         e.resolve();
//!     })
//!     .register(&mut engine);
//!
//! let seen = Rc::new(Cell::new(0i64));
//! let sink = seen.clone();
//! engine.subscribe_task(
//!     task,
//!     move |_, _, v| sink.set(*v.downcast::<i64>().unwrap()),
//!     |_, _, _| panic!("failed"),
//! );
//! assert_eq!(seen.get(), 42);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod engine;
pub mod error;
pub mod tracing_compat;
pub mod types;
pub mod util;

pub use config::EngineConfig;
pub use engine::publisher::{Notifier, Side, Value};
pub use engine::{Engine, FlowBuilder, ProcessHandle, TaskBuilder};
pub use error::{Error, ErrorKind, Result};
pub use types::{ProcessId, PublisherId, Rank, SubscriptionId, Time};
