//! Checkpointing ledger state on chain.
//!
//! - `publisher`: the serialized commit protocol over a finalized ledger copy.
//! - `service`: the per-unit `Operator` run loop and reconciliation of the live ledger.
//! - `pool`: concurrent start and supervision of several units.

pub mod pool;
pub mod publisher;
pub mod service;
pub mod types;

pub use pool::OperatorPool;
pub use publisher::Publisher;
pub use service::Operator;
pub use types::*;
