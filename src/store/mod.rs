//! Persistence of snapshots and resumption metadata.
//!
//! `BlockStore` is the contract the ledger and watcher persist through; `FileBlockStore` keeps
//! one JSON file per snapshot, `MemoryBlockStore` keeps everything in process.

pub mod repositories;
pub mod types;

pub use repositories::*;
pub use types::*;
