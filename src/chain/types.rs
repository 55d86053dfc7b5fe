//! Types for the chain collaborator and its JSON-RPC adapter

use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// `eth_getLogs` filter over an inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
	pub address: Address,
	pub from_block: u64,
	pub to_block: u64,
	/// Positional topic filter; `None` matches anything.
	pub topics: Vec<Option<H256>>,
}

/// An undecoded contract log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
	pub address: Address,
	pub topics: Vec<H256>,
	pub data: Vec<u8>,
	pub block_number: u64,
	pub transaction_index: u64,
	pub log_index: u64,
}

/// Contract parameters read at startup. They take precedence over persisted copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParams {
	pub token_address: Address,
	pub admin_address: Address,
	pub block_freeze_seconds: u64,
	/// Scaled by 10^18.
	pub admin_fee_fraction: U256,
}

/// Outcome of a mined commit transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
	pub transaction_hash: H256,
	pub block_number: u64,
}

/// What the ledger needs from a chain
#[async_trait::async_trait]
pub trait Chain: Send + Sync {
	async fn get_code(&self, address: Address) -> Result<Vec<u8>, ChainError>;

	/// Logs matching `filter`, in chain order.
	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ChainError>;

	/// Block time in seconds.
	async fn get_block_timestamp(&self, block_number: u64) -> Result<u64, ChainError>;

	async fn block_number(&self) -> Result<u64, ChainError>;

	async fn contract_params(&self, contract: Address) -> Result<ContractParams, ChainError>;

	/// Submit `commit(block_number, root_hash, aux)` and wait until it is mined.
	async fn send_commit(
		&self,
		contract: Address,
		block_number: u64,
		root_hash: H256,
		aux: &str,
	) -> Result<CommitReceipt, ChainError>;
}

/// Error types for chain access
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
	#[error("RPC error {code}: {message}")]
	RpcError { code: i64, message: String },

	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Invalid response: {0}")]
	InvalidResponse(String),

	#[error("Transaction {0:?} reverted")]
	TransactionFailed(H256),

	#[error("Transaction {0:?} not mined in time")]
	ReceiptTimeout(H256),

	#[error("No sender account configured for transactions")]
	MissingSender,
}
