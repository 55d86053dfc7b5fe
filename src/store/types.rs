use ethereum_types::Address;
use serde::{Deserialize, Serialize};

/// What a watcher or operator needs to resume where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherStateRecord {
	pub contract_address: Address,
	pub token_address: Option<Address>,
	pub admin_address: Option<Address>,
	pub block_freeze_seconds: Option<u64>,
	pub last_block: u64,
	pub last_published_block: u64,
	/// RFC 3339 time of the save.
	pub saved_at: String,
}

impl WatcherStateRecord {
	pub fn new(contract_address: Address) -> Self {
		Self {
			contract_address,
			token_address: None,
			admin_address: None,
			block_freeze_seconds: None,
			last_block: 0,
			last_published_block: 0,
			saved_at: chrono::Utc::now().to_rfc3339(),
		}
	}
}

/// Error types for snapshot and state persistence
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Block {0} not found in store")]
	NotFound(u64),
}
