//! Commit protocol.
//!
//! The finalized ledger sits behind a `tokio::sync::Mutex`. Holding its guard is what makes a
//! publish "in flight", so at most one commit runs at a time. The mutex is fair, so queued
//! publishes run in the order they asked for the lock.

use super::types::{OperatorConfig, OperatorError, PublishOutcome};
use crate::chain::ChainReader;
use crate::ledger::LedgerState;
use crate::watcher::{SharedMessageCache, playback_until_block};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

struct FinalizedLedger {
	ledger: LedgerState,
	last_published_block: u64,
}

#[derive(Clone)]
pub struct Publisher {
	name: String,
	reader: Arc<ChainReader>,
	cache: SharedMessageCache,
	finalized: Arc<Mutex<FinalizedLedger>>,
	finality_wait: Duration,
	commit_aux: String,
}

impl Publisher {
	/// `ledger` becomes the finalized ledger; it must not run ahead of `last_published_block`'s state.
	pub fn new(
		name: impl Into<String>,
		reader: Arc<ChainReader>,
		cache: SharedMessageCache,
		ledger: LedgerState,
		last_published_block: u64,
		config: &OperatorConfig,
	) -> Self {
		Self {
			name: name.into(),
			reader,
			cache,
			finalized: Arc::new(Mutex::new(FinalizedLedger {
				ledger,
				last_published_block,
			})),
			finality_wait: config.finality_wait,
			commit_aux: config.commit_aux.clone(),
		}
	}

	/// Waits for any in-flight publish.
	pub async fn last_published_block(&self) -> u64 {
		self.finalized.lock().await.last_published_block
	}

	/// Finalized ledger position and timestamp. Waits for any in-flight publish.
	pub async fn finalized_position(&self) -> (u64, u64) {
		let finalized = self.finalized.lock().await;
		(
			finalized.ledger.current_block(),
			finalized.ledger.current_timestamp(),
		)
	}

	/// Commit the ledger state as of `block_number`.
	pub async fn publish_block(&self, block_number: u64) -> Result<PublishOutcome, OperatorError> {
		let mut finalized = self.finalized.lock().await;
		if block_number <= finalized.last_published_block {
			return Err(OperatorError::AlreadyPublished {
				block_number,
				last_published: finalized.last_published_block,
			});
		}
		if finalized.ledger.current_block() > block_number {
			return Err(OperatorError::BehindFinalized {
				block_number,
				finalized_block: finalized.ledger.current_block(),
			});
		}

		if !self.finality_wait.is_zero() {
			debug!(
				"[{}] Waiting {:?} for block {} to finalize",
				self.name, self.finality_wait, block_number
			);
			tokio::time::sleep(self.finality_wait).await;
		}

		playback_until_block(&self.reader, &self.cache, &mut finalized.ledger, block_number).await?;
		let root_hash = finalized.ledger.get_root_hash().await?;
		info!(
			"[{}] Committing block {} with root {:?}",
			self.name, block_number, root_hash
		);

		let receipt = self
			.reader
			.chain()
			.send_commit(self.reader.contract(), block_number, root_hash, &self.commit_aux)
			.await?;
		let timestamp = self.reader.block_timestamp(receipt.block_number).await?;
		finalized.ledger.store_block(block_number, timestamp).await?;
		finalized.last_published_block = block_number;

		info!(
			"[{}] Block {} committed in transaction {:?} (mined in block {})",
			self.name, block_number, receipt.transaction_hash, receipt.block_number
		);
		Ok(PublishOutcome {
			block_number,
			root_hash,
			transaction_hash: receipt.transaction_hash,
			ledger: finalized.ledger.fork(),
		})
	}
}
