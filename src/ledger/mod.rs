//! Ledger State Module
//!
//! - `state`: the mutable `LedgerState`: membership, revenue distribution, snapshots and proofs.
//! - `tree_cache`: per-snapshot accumulators, evicted by hit count.
//! - `member_api`: read-only view handed to query handlers.
//! - `types`: members, snapshots, fee fractions and the ledger error type.

pub mod member_api;
pub mod state;
pub mod tree_cache;
pub mod types;

pub use member_api::MemberApi;
pub use state::LedgerState;
pub use tree_cache::TreeCache;
pub use types::*;
