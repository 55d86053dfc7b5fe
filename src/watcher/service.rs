//! Watcher for one ledger contract.
//!
//! A `Watcher` seeds its ledger from the newest published snapshot, plays back chain events and
//! cached channel messages up to the chain head, then stays live. New channel messages are cached
//! and reach the ledger through playback, so live and replayed ledgers see the same order.
//! `sync_to_head` catches up with new blocks.
//!
//! Status moves `Uninitialized -> Syncing -> Live -> Stopped`. Only a live watcher accepts
//! `sync_to_head`; stopping is allowed from any status.

use super::message_cache::{MessageCache, SharedMessageCache};
use super::playback::{Playback, playback_until_block};
use super::progress::SyncReport;
use super::types::{WatcherConfig, WatcherError, WatcherStatus};
use crate::chain::{Chain, ChainReader, ContractParams};
use crate::channel::{Channel, MessageReceiver};
use crate::events::{
	ChannelMessage, EventDispatcher, LedgerEvent, LedgerEventHandler, MergedEvent, replay,
};
use crate::ledger::{LedgerOptions, LedgerState, MemberApi, Snapshot};
use crate::merkle::TreeBuilder;
use crate::store::{BlockStore, WatcherStateRecord};
use crate::utils::to_checksum_address;

use ethereum_types::Address;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Watcher {
	config: WatcherConfig,
	status: WatcherStatus,
	chain: Arc<dyn Chain>,
	channel: Arc<dyn Channel>,
	store: Arc<dyn BlockStore>,
	builder: TreeBuilder,
	reader: Arc<ChainReader>,
	ledger: LedgerState,
	/// The ledger as seeded, before the first playback.
	seed: Option<LedgerState>,
	cache: SharedMessageCache,
	messages: Option<MessageReceiver>,
	dispatcher: EventDispatcher,
	params: Option<ContractParams>,
	state: WatcherStateRecord,
}

impl Watcher {
	pub fn new(
		config: WatcherConfig,
		chain: Arc<dyn Chain>,
		channel: Arc<dyn Channel>,
		store: Arc<dyn BlockStore>,
		builder: TreeBuilder,
	) -> Self {
		// placeholders until start() has read the contract
		let reader = Arc::new(ChainReader::new(
			chain.clone(),
			config.contract_address,
			Address::zero(),
		));
		let ledger = LedgerState::new(
			LedgerOptions {
				admin_address: Address::zero(),
				block_freeze_seconds: 0,
				tree_cache_size: config.tree_cache_size,
			},
			config.start_block,
			store.clone(),
			builder.clone(),
		);
		let state = WatcherStateRecord::new(config.contract_address);
		Self {
			config,
			status: WatcherStatus::Uninitialized,
			chain,
			channel,
			store,
			builder,
			reader,
			ledger,
			seed: None,
			cache: MessageCache::shared(),
			messages: None,
			dispatcher: EventDispatcher::new(),
			params: None,
			state,
		}
	}

	pub fn register_handler(&mut self, handler: Box<dyn LedgerEventHandler>) {
		self.dispatcher.register_handler(handler);
	}

	/// Connect, seed the ledger and play back to the chain head.
	pub async fn start(&mut self) -> Result<(), WatcherError> {
		self.expect_status(WatcherStatus::Uninitialized)?;
		self.status = WatcherStatus::Syncing;
		let contract = self.config.contract_address;
		info!(
			"[{}] Starting watcher for contract {}",
			self.config.name,
			to_checksum_address(&contract)
		);

		let code = self.chain.get_code(contract).await?;
		if code.is_empty() {
			self.status = WatcherStatus::Stopped;
			return Err(WatcherError::NotAContract(contract));
		}

		let persisted = self.store.load_state().await?;
		let params = self.chain.contract_params(contract).await?;
		if let Some(persisted) = &persisted {
			Self::warn_overridden(&self.config.name, persisted, &params);
			self.state.last_published_block = persisted.last_published_block;
		}

		let options = LedgerOptions {
			admin_address: params.admin_address,
			block_freeze_seconds: params.block_freeze_seconds,
			tree_cache_size: self.config.tree_cache_size,
		};
		self.reader = Arc::new(ChainReader::new(
			self.chain.clone(),
			contract,
			params.token_address,
		));
		self.ledger = self.seed_ledger(options).await?;
		self.seed = Some(self.ledger.fork());

		let mut receiver = self.channel.listen(self.ledger.current_timestamp()).await?;
		let mut buffered = 0;
		while let Ok(message) = receiver.try_recv() {
			self.cache.lock().insert(message);
			buffered += 1;
		}
		debug!("[{}] Buffered {} channel messages", self.config.name, buffered);
		self.messages = Some(receiver);

		self.state.token_address = Some(params.token_address);
		self.state.admin_address = Some(params.admin_address);
		self.state.block_freeze_seconds = Some(params.block_freeze_seconds);
		self.params = Some(params);

		let head = self.reader.current_block().await?;
		self.playback_to(head).await?;
		self.check_admin_fee();

		self.status = WatcherStatus::Live;
		self.save_state().await?;
		info!(
			"[{}] Live at block {} with {} active members",
			self.config.name,
			self.ledger.current_block(),
			self.ledger.get_member_count().active
		);
		Ok(())
	}

	/// Newest exact snapshot in the store, else an empty ledger at the configured start block.
	async fn seed_ledger(&self, options: LedgerOptions) -> Result<LedgerState, WatcherError> {
		match self.newest_exact_snapshot().await? {
			Some(snapshot) => {
				let block_timestamp = self.reader.block_timestamp(snapshot.block_number).await?;
				info!(
					"[{}] Resuming from stored block {} ({} members)",
					self.config.name,
					snapshot.block_number,
					snapshot.members.len()
				);
				Ok(LedgerState::from_snapshot(
					Arc::new(snapshot),
					block_timestamp,
					options,
					self.store.clone(),
					self.builder.clone(),
				))
			}
			None => {
				info!(
					"[{}] No published blocks stored, playing back from block {}",
					self.config.name, self.config.start_block
				);
				Ok(LedgerState::new(
					options,
					self.config.start_block,
					self.store.clone(),
					self.builder.clone(),
				))
			}
		}
	}

	async fn newest_exact_snapshot(&self) -> Result<Option<Snapshot>, WatcherError> {
		for block_number in self.store.list_block_numbers(usize::MAX).await? {
			let snapshot = self.store.load_block(block_number).await?;
			if snapshot.exact {
				return Ok(Some(snapshot));
			}
			debug!(
				"[{}] Stored block {} was recorded from a replayed commit, skipping",
				self.config.name, block_number
			);
		}
		Ok(None)
	}

	fn warn_overridden(name: &str, persisted: &WatcherStateRecord, params: &ContractParams) {
		if persisted.token_address.is_some_and(|a| a != params.token_address) {
			warn!("[{}] Stored token address differs from contract, using contract's", name);
		}
		if persisted.admin_address.is_some_and(|a| a != params.admin_address) {
			warn!("[{}] Stored admin address differs from contract, using contract's", name);
		}
		if persisted
			.block_freeze_seconds
			.is_some_and(|s| s != params.block_freeze_seconds)
		{
			warn!("[{}] Stored block freeze period differs from contract, using contract's", name);
		}
	}

	fn check_admin_fee(&self) {
		if let Some(params) = &self.params {
			if params.admin_fee_fraction != self.ledger.admin_fee_fraction() {
				warn!(
					"[{}] Admin fee after playback is {}, contract reports {}",
					self.config.name,
					self.ledger.admin_fee_fraction(),
					params.admin_fee_fraction
				);
			}
		}
	}

	async fn playback_to(&mut self, to_block: u64) -> Result<Option<SyncReport>, WatcherError> {
		let playback =
			playback_until_block(&self.reader, &self.cache, &mut self.ledger, to_block).await?;
		let Some(Playback { changes, report }) = playback else {
			return Ok(None);
		};
		self.dispatcher.dispatch_all(&changes).await;
		self.dispatcher
			.dispatch(&LedgerEvent::Synced {
				block_number: self.ledger.current_block(),
				timestamp: self.ledger.current_timestamp(),
			})
			.await;
		self.state.last_block = self.ledger.current_block();
		Ok(Some(report))
	}

	/// Play back new blocks up to the current chain head.
	pub async fn sync_to_head(&mut self) -> Result<Option<SyncReport>, WatcherError> {
		self.expect_status(WatcherStatus::Live)?;
		let head = self.reader.current_block().await?;
		let report = self.playback_to(head).await?;
		if report.is_some() {
			self.save_state().await?;
		}
		Ok(report)
	}

	/// Next live channel message. Pending forever once the subscription has ended.
	pub async fn next_message(&mut self) -> Option<ChannelMessage> {
		let message = match self.messages.as_mut() {
			Some(receiver) => receiver.recv().await,
			None => std::future::pending().await,
		};
		if message.is_none() {
			warn!("[{}] Channel subscription ended", self.config.name);
			self.messages = None;
		}
		message
	}

	/// Cache a live message and bring the ledger up to it.
	///
	/// The chain is played forward first, so the message lands after every chain event that
	/// precedes it. A message newer than the chain head stays cached until a later playback
	/// reaches its time. A message at or before the ledger's position arrived after playback had
	/// passed it and is applied on the spot.
	pub async fn handle_message(
		&mut self,
		message: ChannelMessage,
	) -> Result<Option<SyncReport>, WatcherError> {
		self.cache.lock().insert(message.clone());
		if self.status != WatcherStatus::Live {
			return Ok(None);
		}
		if message.timestamp > self.ledger.current_timestamp() {
			return self.sync_to_head().await;
		}

		warn!(
			"[{}] Channel message at {} arrived after playback reached {}, applying late",
			self.config.name,
			message.timestamp,
			self.ledger.current_timestamp()
		);
		let event = MergedEvent::from(message);
		if let Some(change) = replay(&mut self.ledger, &event).await? {
			self.dispatcher.dispatch(&change).await;
		}
		Ok(None)
	}

	/// Drop cached messages at or before `timestamp`. Returns how many were dropped.
	pub fn prune_cache_up_to(&self, timestamp: u64) -> usize {
		let pruned = self.cache.lock().prune_up_to(timestamp);
		debug!(
			"[{}] Pruned {} cached messages up to {}",
			self.config.name, pruned, timestamp
		);
		pruned
	}

	/// Drop cached messages already reflected in the current ledger.
	pub fn channel_prune_cache(&self) -> usize {
		self.prune_cache_up_to(self.ledger.current_timestamp())
	}

	/// The ledger as it was seeded at start, for building a finalized copy.
	pub fn take_seed_ledger(&mut self) -> Option<LedgerState> {
		self.seed.take()
	}

	/// Swap in a ledger rebuilt elsewhere, e.g. from a freshly finalized state.
	pub fn replace_ledger(&mut self, ledger: LedgerState) {
		self.ledger = ledger;
		self.state.last_block = self.ledger.current_block();
	}

	pub fn set_last_published_block(&mut self, block_number: u64) {
		self.state.last_published_block = block_number;
	}

	pub fn last_published_block(&self) -> u64 {
		self.state.last_published_block
	}

	pub async fn save_state(&mut self) -> Result<(), WatcherError> {
		self.state.saved_at = chrono::Utc::now().to_rfc3339();
		self.store.save_state(&self.state).await?;
		Ok(())
	}

	/// Close the channel and persist resumption state. Stopping twice is fine.
	pub async fn stop(&mut self) -> Result<(), WatcherError> {
		if self.status == WatcherStatus::Stopped {
			return Ok(());
		}
		let was_started = self.status != WatcherStatus::Uninitialized;
		self.status = WatcherStatus::Stopped;
		self.messages = None;
		self.channel.close().await?;
		if was_started {
			self.save_state().await?;
		}
		info!("[{}] Watcher stopped", self.config.name);
		Ok(())
	}

	fn expect_status(&self, expected: WatcherStatus) -> Result<(), WatcherError> {
		if self.status != expected {
			return Err(WatcherError::InvalidState {
				expected,
				actual: self.status,
			});
		}
		Ok(())
	}

	pub fn status(&self) -> WatcherStatus {
		self.status
	}

	pub fn name(&self) -> &str {
		&self.config.name
	}

	pub fn config(&self) -> &WatcherConfig {
		&self.config
	}

	pub fn contract_params(&self) -> Option<&ContractParams> {
		self.params.as_ref()
	}

	pub fn ledger(&self) -> &LedgerState {
		&self.ledger
	}

	pub fn ledger_mut(&mut self) -> &mut LedgerState {
		&mut self.ledger
	}

	pub fn member_api(&self) -> MemberApi<'_> {
		self.ledger.get_member_api()
	}

	pub fn reader(&self) -> Arc<ChainReader> {
		self.reader.clone()
	}

	pub fn message_cache(&self) -> SharedMessageCache {
		self.cache.clone()
	}

	pub fn store(&self) -> Arc<dyn BlockStore> {
		self.store.clone()
	}
}
