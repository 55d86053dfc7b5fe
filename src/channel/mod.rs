//! Join/part channel integration
//!
//! `Channel` is the interface the watcher listens on. `MemoryChannel` is an in-process
//! implementation; `WsChannel` connects to a channel server over WebSocket.

mod memory;
mod types;
mod ws;

pub use memory::MemoryChannel;
pub use types::*;
pub use ws::WsChannel;
