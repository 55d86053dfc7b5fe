use crate::chain::ChainError;
use crate::ledger::{LedgerError, LedgerState};
use crate::store::StoreError;
use crate::watcher::WatcherError;

use ethereum_types::H256;
use std::time::Duration;

/// How an operator decides and performs commits.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
	/// Blocks that must pass after the last published block before the next publish.
	pub min_interval_blocks: u64,
	/// Blocks are assumed final after this long.
	pub finality_wait: Duration,
	/// Free-form string passed along with each commit.
	pub commit_aux: String,
	/// How often the chain head is polled for new blocks.
	pub poll_interval: Duration,
	/// Watch-only units never commit.
	pub publish_enabled: bool,
}

impl Default for OperatorConfig {
	fn default() -> Self {
		Self {
			min_interval_blocks: 1,
			finality_wait: Duration::ZERO,
			commit_aux: String::new(),
			poll_interval: Duration::from_secs(5),
			publish_enabled: true,
		}
	}
}

/// A finished commit, handed back to the operator for reconciliation.
pub struct PublishOutcome {
	pub block_number: u64,
	pub root_hash: H256,
	pub transaction_hash: H256,
	/// Fork of the finalized ledger right after the snapshot was stored.
	pub ledger: LedgerState,
}

/// Error types for committing ledger state
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
	#[error("Watcher error: {0}")]
	WatcherError(#[from] WatcherError),

	#[error("Ledger error: {0}")]
	LedgerError(#[from] LedgerError),

	#[error("Chain error: {0}")]
	ChainError(#[from] ChainError),

	#[error("Store error: {0}")]
	StoreError(#[from] StoreError),

	#[error("Block {block_number} not after last published block {last_published}")]
	AlreadyPublished {
		block_number: u64,
		last_published: u64,
	},

	#[error("Block {block_number} is behind the finalized ledger at block {finalized_block}")]
	BehindFinalized {
		block_number: u64,
		finalized_block: u64,
	},

	#[error("Operator {0} has not been started")]
	NotStarted(String),

	#[error("Publish task failed: {0}")]
	TaskFailed(String),

	#[error("All {0} ledger units failed to start")]
	AllUnitsFailed(usize),
}
