//! Operator for one ledger unit.
//!
//! The operator task owns the live `Watcher`. Publishes run on spawned tasks that share a
//! `Publisher`; their outcomes come back through a `JoinSet` and are reconciled on the operator
//! task, so the live ledger is never touched from two places.

use super::publisher::Publisher;
use super::types::{OperatorConfig, OperatorError, PublishOutcome};
use crate::events::ChannelMessage;
use crate::watcher::{SyncReport, Watcher};

use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

type PublishResult = Result<PublishOutcome, OperatorError>;

pub struct Operator {
	watcher: Watcher,
	config: OperatorConfig,
	publisher: Option<Publisher>,
	publishes: JoinSet<PublishResult>,
	/// Resolves when the most recently queued publish has finished.
	previous_publish: Option<oneshot::Receiver<()>>,
	/// Highest block a publish was requested for.
	last_requested_block: u64,
	accepting: bool,
}

impl Operator {
	pub fn new(watcher: Watcher, config: OperatorConfig) -> Self {
		Self {
			watcher,
			config,
			publisher: None,
			publishes: JoinSet::new(),
			previous_publish: None,
			last_requested_block: 0,
			accepting: false,
		}
	}

	/// Start the watcher and set up the finalized ledger from its seed.
	pub async fn start(&mut self) -> Result<(), OperatorError> {
		self.watcher.start().await?;
		let seed = match self.watcher.take_seed_ledger() {
			Some(seed) => seed,
			None => self.watcher.ledger().fork(),
		};
		let last_published = self.watcher.last_published_block();
		self.last_requested_block = last_published;
		self.publisher = Some(Publisher::new(
			self.watcher.name(),
			self.watcher.reader(),
			self.watcher.message_cache(),
			seed,
			last_published,
			&self.config,
		));
		self.accepting = true;
		info!(
			"[{}] Operator started, last published block {}, publishing {}",
			self.watcher.name(),
			last_published,
			if self.config.publish_enabled { "enabled" } else { "disabled" }
		);
		Ok(())
	}

	pub fn name(&self) -> &str {
		self.watcher.name()
	}

	pub fn watcher(&self) -> &Watcher {
		&self.watcher
	}

	pub fn watcher_mut(&mut self) -> &mut Watcher {
		&mut self.watcher
	}

	pub fn publisher(&self) -> Option<&Publisher> {
		self.publisher.as_ref()
	}

	pub fn pending_publishes(&self) -> usize {
		self.publishes.len()
	}

	/// Queue a commit of `block_number` behind any publish already in flight.
	pub fn publish_block(&mut self, block_number: u64) -> Result<(), OperatorError> {
		let publisher = self
			.publisher
			.clone()
			.ok_or_else(|| OperatorError::NotStarted(self.name().to_string()))?;
		if !self.accepting {
			return Err(OperatorError::NotStarted(self.name().to_string()));
		}
		debug!("[{}] Queueing publish of block {}", self.name(), block_number);
		self.last_requested_block = self.last_requested_block.max(block_number);

		// each task waits for its predecessor so the publisher lock is taken in submission order
		let (done_tx, done_rx) = oneshot::channel();
		let previous = self.previous_publish.replace(done_rx);
		self.publishes.spawn(async move {
			if let Some(previous) = previous {
				let _ = previous.await;
			}
			let result = publisher.publish_block(block_number).await;
			let _ = done_tx.send(());
			result
		});
		Ok(())
	}

	/// Publish `head` once enough blocks have passed since the last publish. Returns whether a
	/// publish was queued.
	pub fn maybe_publish(&mut self, head: u64) -> bool {
		if !self.config.publish_enabled || !self.accepting {
			return false;
		}
		let threshold = self
			.last_requested_block
			.saturating_add(self.config.min_interval_blocks);
		if head < threshold {
			debug!(
				"[{}] Block {} below publish threshold {}",
				self.name(),
				head,
				threshold
			);
			return false;
		}
		match self.publish_block(head) {
			Ok(()) => true,
			Err(e) => {
				error!("[{}] Failed to queue publish: {}", self.name(), e);
				false
			}
		}
	}

	/// Wait for the next publish to finish. `None` when nothing is in flight.
	pub async fn next_outcome(&mut self) -> Option<PublishResult> {
		let joined = self.publishes.join_next().await?;
		Some(flatten(joined))
	}

	/// Rebase the live ledger on a freshly finalized one and catch up to the chain head.
	pub async fn reconcile(&mut self, outcome: PublishOutcome) -> Result<(), OperatorError> {
		let finalized_timestamp = outcome.ledger.current_timestamp();
		self.watcher.set_last_published_block(outcome.block_number);
		self.watcher.replace_ledger(outcome.ledger);
		self.watcher.sync_to_head().await?;
		self.watcher.prune_cache_up_to(finalized_timestamp);
		self.watcher.save_state().await?;
		debug!(
			"[{}] Live ledger rebased on block {}, now at block {}",
			self.name(),
			outcome.block_number,
			self.watcher.ledger().current_block()
		);
		Ok(())
	}

	async fn handle_outcome(&mut self, result: PublishResult) {
		match result {
			Ok(outcome) => {
				let block_number = outcome.block_number;
				if let Err(e) = self.reconcile(outcome).await {
					error!(
						"[{}] Failed to reconcile after publishing block {}: {}",
						self.name(),
						block_number,
						e
					);
				}
			}
			Err(OperatorError::AlreadyPublished {
				block_number,
				last_published,
			}) => {
				warn!(
					"[{}] Skipped publish of block {}, already at {}",
					self.name(),
					block_number,
					last_published
				);
			}
			Err(e) => {
				error!("[{}] Publish failed: {}", self.name(), e);
				// allow the next revenue to trigger a retry
				self.last_requested_block = self.watcher.last_published_block();
			}
		}
	}

	async fn handle_message(&mut self, message: ChannelMessage) {
		match self.watcher.handle_message(message).await {
			Ok(report) => self.publish_on_revenue(report),
			Err(e) => error!("[{}] Failed to apply channel message: {}", self.name(), e),
		}
	}

	async fn poll(&mut self) {
		match self.watcher.sync_to_head().await {
			Ok(report) => self.publish_on_revenue(report),
			Err(e) => warn!("[{}] Sync to chain head failed: {}", self.name(), e),
		}
	}

	fn publish_on_revenue(&mut self, report: Option<SyncReport>) {
		if let Some(report) = report.filter(SyncReport::has_revenue) {
			self.maybe_publish(report.to_block);
		}
	}

	/// Drive the unit until `shutdown` flips, then shut down.
	pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), OperatorError> {
		if self.publisher.is_none() {
			return Err(OperatorError::NotStarted(self.name().to_string()));
		}
		let mut ticker = tokio::time::interval(self.config.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		while !*shutdown.borrow() {
			tokio::select! {
				changed = shutdown.changed() => {
					if changed.is_err() {
						break;
					}
				}
				message = self.watcher.next_message() => {
					if let Some(message) = message {
						self.handle_message(message).await;
					}
				}
				_ = ticker.tick() => self.poll().await,
				Some(joined) = self.publishes.join_next() => {
					self.handle_outcome(flatten(joined)).await;
				}
			}
		}
		self.shutdown().await
	}

	/// Stop taking triggers, let queued commits finish, then stop the watcher.
	pub async fn shutdown(&mut self) -> Result<(), OperatorError> {
		self.accepting = false;
		if !self.publishes.is_empty() {
			info!(
				"[{}] Waiting for {} publishes to finish",
				self.name(),
				self.publishes.len()
			);
		}
		while let Some(result) = self.next_outcome().await {
			match result {
				Ok(outcome) => self.watcher.set_last_published_block(outcome.block_number),
				Err(e) => warn!("[{}] Publish during shutdown failed: {}", self.name(), e),
			}
		}
		self.watcher.stop().await?;
		info!("[{}] Operator stopped", self.name());
		Ok(())
	}
}

fn flatten(joined: Result<PublishResult, JoinError>) -> PublishResult {
	joined.map_err(|e| OperatorError::TaskFailed(e.to_string()))?
}
