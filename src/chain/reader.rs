use super::abi::{ADMIN_FEE_CHANGED_TOPIC, BLOCK_CREATED_TOPIC, TRANSFER_TOPIC, address_topic, decode_log};
use super::types::{Chain, ChainError, LogFilter, RawLog};
use crate::events::{ChainEvent, merge_ordered_event_lists};

use ethereum_types::{Address, H256};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Reads one contract's events, with block timestamps resolved.
///
/// Block timestamps never change once a block is mined, so they are fetched once per block.
pub struct ChainReader {
	chain: Arc<dyn Chain>,
	contract: Address,
	token: Address,
	timestamps: Mutex<HashMap<u64, u64>>,
}

impl ChainReader {
	pub fn new(chain: Arc<dyn Chain>, contract: Address, token: Address) -> Self {
		Self {
			chain,
			contract,
			token,
			timestamps: Mutex::new(HashMap::new()),
		}
	}

	pub fn chain(&self) -> &Arc<dyn Chain> {
		&self.chain
	}

	pub fn contract(&self) -> Address {
		self.contract
	}

	pub fn token(&self) -> Address {
		self.token
	}

	pub async fn current_block(&self) -> Result<u64, ChainError> {
		self.chain.block_number().await
	}

	/// Block time in milliseconds.
	pub async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
		let cached = self.timestamps.lock().get(&block_number).copied();
		if let Some(timestamp) = cached {
			return Ok(timestamp);
		}
		let timestamp = self
			.chain
			.get_block_timestamp(block_number)
			.await?
			.saturating_mul(1000);
		self.timestamps.lock().insert(block_number, timestamp);
		Ok(timestamp)
	}

	/// Admin fee changes, commits and incoming token transfers in `[from_block, to_block]`,
	/// in chain order and with timestamps.
	pub async fn fetch_events(
		&self,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<ChainEvent>, ChainError> {
		let fee_changes = self
			.fetch(self.contract, from_block, to_block, vec![Some(*ADMIN_FEE_CHANGED_TOPIC)])
			.await?;
		let commits = self
			.fetch(self.contract, from_block, to_block, vec![Some(*BLOCK_CREATED_TOPIC)])
			.await?;
		let transfers = self
			.fetch(
				self.token,
				from_block,
				to_block,
				vec![Some(*TRANSFER_TOPIC), None, Some(address_topic(&self.contract))],
			)
			.await?;
		debug!(
			"Blocks {}..={}: {} fee changes, {} commits, {} transfers",
			from_block,
			to_block,
			fee_changes.len(),
			commits.len(),
			transfers.len()
		);

		let mut events =
			merge_ordered_event_lists(merge_ordered_event_lists(fee_changes, commits), transfers);
		for event in &mut events {
			event.timestamp = self.block_timestamp(event.position.block_number).await?;
		}
		Ok(events)
	}

	async fn fetch(
		&self,
		address: Address,
		from_block: u64,
		to_block: u64,
		topics: Vec<Option<H256>>,
	) -> Result<Vec<ChainEvent>, ChainError> {
		let filter = LogFilter {
			address,
			from_block,
			to_block,
			topics,
		};
		let mut logs: Vec<RawLog> = self.chain.get_logs(&filter).await?;
		logs.sort_by_key(|log| (log.block_number, log.transaction_index, log.log_index));
		Ok(logs.iter().filter_map(decode_log).collect())
	}
}
