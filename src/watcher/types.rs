use crate::chain::ChainError;
use crate::channel::ChannelError;
use crate::ledger::LedgerError;
use crate::store::StoreError;

use ethereum_types::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherStatus {
	Uninitialized,
	Syncing,
	Live,
	Stopped,
}

/// Static configuration of one watched contract.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
	/// Label used in logs.
	pub name: String,
	pub contract_address: Address,
	/// First block to play back when nothing has been stored yet.
	pub start_block: u64,
	pub tree_cache_size: usize,
}

/// Error types for watching a contract
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
	#[error("Chain error: {0}")]
	ChainError(#[from] ChainError),

	#[error("Channel error: {0}")]
	ChannelError(#[from] ChannelError),

	#[error("Store error: {0}")]
	StoreError(#[from] StoreError),

	#[error("Ledger error: {0}")]
	LedgerError(#[from] LedgerError),

	#[error("No contract deployed at {0:?}")]
	NotAContract(Address),

	#[error("Messages since {requested} requested, but the cache was pruned up to {pruned_up_to}")]
	CachePruned { requested: u64, pruned_up_to: u64 },

	#[error("Watcher is {actual:?}, expected {expected:?}")]
	InvalidState {
		expected: WatcherStatus,
		actual: WatcherStatus,
	},
}
