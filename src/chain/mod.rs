//! Chain integration module
//!
//! The ledger talks to the chain only through the `Chain` trait. `JsonRpcChainClient` implements
//! it over Ethereum JSON-RPC; `ChainReader` turns raw logs into ordered, timestamped
//! `ChainEvent`s for one contract.

pub mod abi;
/// JSON-RPC adapter
mod client;
mod reader;
/// Collaborator trait and data types
mod types;

pub use client::JsonRpcChainClient;
pub use reader::ChainReader;
pub use types::*;
