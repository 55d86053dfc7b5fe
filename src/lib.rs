//! Off-chain revenue-sharing ledger.
//!
//! Watches a revenue-sharing contract and a join/part channel, keeps every member's cumulative
//! earnings, and periodically commits a Merkle root of the balances on chain so members can
//! prove and withdraw what they are owed.

pub mod chain;
pub mod channel;
pub mod config;
pub mod events;
pub mod ledger;
pub mod merkle;
pub mod operator;
pub mod store;
pub mod utils;
pub mod watcher;
