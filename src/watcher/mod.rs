//! Contract watching: playback of chain events and channel messages into a live ledger.
//!
//! - `message_cache`: timestamp-sorted join/part messages kept for playback.
//! - `playback`: replays one block range onto a ledger.
//! - `progress`: per-pass replay statistics.
//! - `service`: the `Watcher` lifecycle.

pub mod message_cache;
pub mod playback;
pub mod progress;
pub mod service;
pub mod types;

pub use message_cache::{MessageCache, SharedMessageCache};
pub use playback::{Playback, playback_until_block};
pub use progress::{SyncProgress, SyncReport};
pub use service::Watcher;
pub use types::*;
