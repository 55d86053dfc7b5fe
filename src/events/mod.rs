//! Event merge, replay and change notifications.
//!
//! - `types`: chain events, channel messages and the merged replay event.
//! - `merge`: stable merges by chain position and by timestamp.
//! - `replay`: applies merged events to a `LedgerState`.
//! - `dispatcher`: `LedgerEvent` notifications and their handlers.

pub mod dispatcher;
pub mod merge;
pub mod replay;
pub mod types;

pub use dispatcher::{EventDispatcher, LedgerEvent, LedgerEventHandler, LoggingEventHandler};
pub use merge::{merge_by_timestamp, merge_ordered_event_lists};
pub use replay::{replay, replay_all};
pub use types::*;
