//! Core types for the propagator engine.
//!
//! - [`id`]: Identifier types (`PublisherId`, `ProcessId`, `SubscriptionId`,
//!   `Time`)
//! - [`rank`]: Rank vectors and the tick order on the reactive DAG

pub mod id;
pub mod rank;

pub use id::{ProcessId, PublisherId, SubscriptionId, Time};
pub use rank::Rank;
