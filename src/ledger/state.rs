//! The revenue-sharing ledger: who is owed what, and immutable snapshots of it.
//!
//! The member list lives behind an `Arc` that is only ever mutated through `Arc::make_mut`.
//! While a snapshot or the current-state accumulator holds a clone, a mutation copies the list,
//! so a new `Arc` always means new content. The accumulator uses that identity to decide when
//! its tree is stale.

use super::member_api::MemberApi;
use super::tree_cache::TreeCache;
use super::types::{
	FeeFraction, LedgerError, LedgerOptions, Member, MemberCount, RevenueSplit, Snapshot,
	fee_scale,
};
use crate::merkle::{MerkleAccumulator, TreeBuilder};
use crate::store::BlockStore;
use crate::utils::now_millis;

use ethereum_types::{Address, H256, U256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const ADMIN_MEMBER_NAME: &str = "admin";

pub struct LedgerState {
	members: Arc<Vec<Member>>,
	index: HashMap<Address, usize>,
	admin_address: Address,
	admin_fee_fraction: U256,
	total_earnings: U256,
	current_block: u64,
	current_timestamp: u64,
	block_freeze_ms: u64,
	/// Newest first.
	latest_blocks: Vec<Arc<Snapshot>>,
	store: Arc<dyn BlockStore>,
	builder: TreeBuilder,
	tree: MerkleAccumulator,
	tree_cache: TreeCache,
}

impl LedgerState {
	/// Empty ledger positioned just before `start_block`.
	pub fn new(
		options: LedgerOptions,
		start_block: u64,
		store: Arc<dyn BlockStore>,
		builder: TreeBuilder,
	) -> Self {
		let members = Arc::new(Vec::new());
		let mut ledger = Self {
			tree: MerkleAccumulator::new(builder.clone(), members.clone(), 0),
			members,
			index: HashMap::new(),
			admin_address: Address::zero(),
			admin_fee_fraction: U256::zero(),
			total_earnings: U256::zero(),
			current_block: start_block.saturating_sub(1),
			current_timestamp: 0,
			block_freeze_ms: options.block_freeze_seconds.saturating_mul(1000),
			latest_blocks: Vec::new(),
			store,
			builder,
			tree_cache: TreeCache::new(options.tree_cache_size),
		};
		ledger.set_admin_address(options.admin_address);
		ledger
	}

	/// Ledger seeded from a stored snapshot; the snapshot becomes the only retained block.
	///
	/// The position is the snapshot's block at `block_timestamp`, the mined time of that block.
	/// The snapshot's own timestamp is the commit time, which can be later. Only an exact
	/// snapshot describes the ledger at that position.
	pub fn from_snapshot(
		snapshot: Arc<Snapshot>,
		block_timestamp: u64,
		options: LedgerOptions,
		store: Arc<dyn BlockStore>,
		builder: TreeBuilder,
	) -> Self {
		let members = snapshot.members.clone();
		let index = members
			.iter()
			.enumerate()
			.map(|(i, m)| (m.address, i))
			.collect();
		let mut ledger = Self {
			tree: MerkleAccumulator::new(builder.clone(), members.clone(), snapshot.block_number),
			members,
			index,
			admin_address: Address::zero(),
			admin_fee_fraction: snapshot.admin_fee_fraction,
			total_earnings: snapshot.total_earnings,
			current_block: snapshot.block_number,
			current_timestamp: block_timestamp,
			block_freeze_ms: options.block_freeze_seconds.saturating_mul(1000),
			latest_blocks: vec![snapshot],
			store,
			builder,
			tree_cache: TreeCache::new(options.tree_cache_size),
		};
		ledger.set_admin_address(options.admin_address);
		ledger
	}

	/// Independent copy sharing only immutable data. Tree caches are not shared.
	pub fn fork(&self) -> Self {
		Self {
			members: self.members.clone(),
			index: self.index.clone(),
			admin_address: self.admin_address,
			admin_fee_fraction: self.admin_fee_fraction,
			total_earnings: self.total_earnings,
			current_block: self.current_block,
			current_timestamp: self.current_timestamp,
			block_freeze_ms: self.block_freeze_ms,
			latest_blocks: self.latest_blocks.clone(),
			store: self.store.clone(),
			builder: self.builder.clone(),
			tree: MerkleAccumulator::new(
				self.builder.clone(),
				self.members.clone(),
				self.current_block,
			),
			tree_cache: TreeCache::new(self.tree_cache.capacity()),
		}
	}

	pub fn options(&self) -> LedgerOptions {
		LedgerOptions {
			admin_address: self.admin_address,
			block_freeze_seconds: self.block_freeze_ms / 1000,
			tree_cache_size: self.tree_cache.capacity(),
		}
	}

	/// The admin always has a member entry; an implicit one stays inactive.
	pub fn set_admin_address(&mut self, address: Address) {
		self.admin_address = address;
		if !self.index.contains_key(&address) {
			let mut admin = Member::new(address, Some(ADMIN_MEMBER_NAME.to_string()));
			admin.active = false;
			self.push_member(admin);
		}
	}

	pub fn set_block_freeze_seconds(&mut self, seconds: u64) {
		self.block_freeze_ms = seconds.saturating_mul(1000);
	}

	pub fn set_admin_fee_fraction(&mut self, value: impl Into<FeeFraction>) -> Result<(), LedgerError> {
		self.admin_fee_fraction = value.into().to_scaled()?;
		debug!("Admin fee fraction set to {}", self.admin_fee_fraction);
		Ok(())
	}

	/// Move the high-water mark forward to `block_number` at `timestamp` (ms).
	pub fn set_position(&mut self, block_number: u64, timestamp: u64) {
		self.current_block = self.current_block.max(block_number);
		self.current_timestamp = self.current_timestamp.max(timestamp);
	}

	fn push_member(&mut self, member: Member) {
		let members = Arc::make_mut(&mut self.members);
		self.index.insert(member.address, members.len());
		members.push(member);
	}

	/// Returns true only if the member did not exist before.
	pub fn add_member(&mut self, address: Address, name: Option<String>) -> bool {
		let Some(&i) = self.index.get(&address) else {
			self.push_member(Member::new(address, name));
			return true;
		};
		let existing = &self.members[i];
		if existing.active && (name.is_none() || existing.name == name) {
			return false;
		}
		let member = &mut Arc::make_mut(&mut self.members)[i];
		member.active = true;
		if name.is_some() {
			member.name = name;
		}
		false
	}

	/// Returns the addresses that became active.
	pub fn add_members(&mut self, addresses: &[Address]) -> Vec<Address> {
		let mut joined = Vec::new();
		for address in addresses {
			let was_active = self.is_active(address);
			self.add_member(*address, None);
			if !was_active {
				joined.push(*address);
			}
		}
		joined
	}

	/// Returns true if the member had been active.
	pub fn remove_member(&mut self, address: &Address) -> bool {
		let Some(&i) = self.index.get(address) else {
			return false;
		};
		if !self.members[i].active {
			return false;
		}
		Arc::make_mut(&mut self.members)[i].active = false;
		true
	}

	/// Returns the addresses that were deactivated.
	pub fn remove_members(&mut self, addresses: &[Address]) -> Vec<Address> {
		addresses
			.iter()
			.filter(|address| self.remove_member(address))
			.copied()
			.collect()
	}

	fn is_active(&self, address: &Address) -> bool {
		self.index
			.get(address)
			.is_some_and(|&i| self.members[i].active)
	}

	/// Split `amount` between the admin fee and every active member.
	///
	/// The integer-division remainder is not credited to anyone, but still counts toward
	/// `total_earnings`. With no active members everything goes to the admin.
	pub fn add_revenue(&mut self, amount: U256) -> Result<RevenueSplit, LedgerError> {
		let active: Vec<usize> = self
			.members
			.iter()
			.enumerate()
			.filter(|(_, m)| m.active)
			.map(|(i, _)| i)
			.collect();

		let split = if active.is_empty() {
			RevenueSplit {
				admin_share: amount,
				member_share: U256::zero(),
				member_count: 0,
				remainder: U256::zero(),
			}
		} else {
			let admin_share = U256::try_from(
				amount.full_mul(self.admin_fee_fraction) / ethereum_types::U512::from(fee_scale()),
			)
			.map_err(|_| LedgerError::Overflow)?;
			let count = U256::from(active.len());
			let member_share = (amount - admin_share) / count;
			RevenueSplit {
				admin_share,
				member_share,
				member_count: active.len(),
				remainder: amount - admin_share - member_share * count,
			}
		};

		let total_earnings = self
			.total_earnings
			.checked_add(amount)
			.ok_or(LedgerError::Overflow)?;
		let admin_index = self.index.get(&self.admin_address).copied();

		// checked in full before anything is written, so an overflow leaves the ledger untouched
		let credits = active
			.iter()
			.map(|&i| (i, split.member_share))
			.chain(admin_index.map(|i| (i, split.admin_share)));
		let mut updated: HashMap<usize, U256> = HashMap::new();
		for (i, share) in credits {
			let current = updated.get(&i).copied().unwrap_or(self.members[i].earnings);
			let earnings = current.checked_add(share).ok_or(LedgerError::Overflow)?;
			updated.insert(i, earnings);
		}

		let members = Arc::make_mut(&mut self.members);
		for (i, earnings) in updated {
			members[i].earnings = earnings;
		}
		self.total_earnings = total_earnings;

		debug!(
			"Revenue {} split: admin {}, {} members x {}, remainder {}",
			amount, split.admin_share, split.member_count, split.member_share, split.remainder
		);
		Ok(split)
	}

	/// Snapshot the current members as block `block_number` and persist it.
	///
	/// The ledger must have been played back to exactly the end of `block_number`; the snapshot
	/// is marked exact and may seed a resumed ledger.
	pub async fn store_block(
		&mut self,
		block_number: u64,
		timestamp: u64,
	) -> Result<Arc<Snapshot>, LedgerError> {
		self.snapshot_block(block_number, timestamp, true).await
	}

	/// Record a commit of `block_number` seen on chain.
	///
	/// The ledger is usually past `block_number` by then, so the snapshot is not exact. A
	/// snapshot already persisted under `block_number` is kept.
	pub async fn observe_block(
		&mut self,
		block_number: u64,
		timestamp: u64,
	) -> Result<Arc<Snapshot>, LedgerError> {
		self.snapshot_block(block_number, timestamp, false).await
	}

	async fn snapshot_block(
		&mut self,
		block_number: u64,
		timestamp: u64,
		exact: bool,
	) -> Result<Arc<Snapshot>, LedgerError> {
		if block_number == 0 {
			return Err(LedgerError::InvalidBlockNumber(block_number));
		}
		if let Some(latest) = self.latest_blocks.first() {
			if block_number <= latest.block_number {
				return Err(LedgerError::BlockAlreadyStored {
					block_number,
					latest: latest.block_number,
				});
			}
		}

		let snapshot = Arc::new(Snapshot {
			block_number,
			members: self.members.clone(),
			timestamp,
			store_timestamp: now_millis(),
			total_earnings: self.total_earnings,
			owner: self.admin_address,
			admin_fee_fraction: self.admin_fee_fraction,
			exact,
		});
		if exact || !self.store.block_exists(block_number).await? {
			self.store.save_block(&snapshot).await?;
		} else {
			debug!("Block {} already persisted, keeping stored copy", block_number);
		}
		self.latest_blocks.insert(0, snapshot.clone());

		info!(
			"Stored block {} with {} members, total earnings {}",
			block_number,
			snapshot.members.len(),
			snapshot.total_earnings
		);
		Ok(snapshot)
	}

	pub fn latest_block(&self) -> Option<Arc<Snapshot>> {
		self.latest_blocks.first().cloned()
	}

	pub fn retained_block_numbers(&self) -> Vec<u64> {
		self.latest_blocks.iter().map(|b| b.block_number).collect()
	}

	pub fn get_latest_withdrawable_block(&mut self) -> Option<Arc<Snapshot>> {
		self.get_latest_withdrawable_block_at(now_millis())
	}

	/// Newest snapshot older than the freeze period at `now` (ms). Older snapshots are dropped
	/// from the in-memory window; they stay in the store.
	pub fn get_latest_withdrawable_block_at(&mut self, now: u64) -> Option<Arc<Snapshot>> {
		let position = self.withdrawable_position(now)?;
		if self.latest_blocks.len() > position + 1 {
			debug!(
				"Pruning {} snapshots older than block {}",
				self.latest_blocks.len() - position - 1,
				self.latest_blocks[position].block_number
			);
			self.latest_blocks.truncate(position + 1);
		}
		Some(self.latest_blocks[position].clone())
	}

	/// Same as `get_latest_withdrawable_block_at`, without pruning.
	pub fn find_latest_withdrawable_block(&self, now: u64) -> Option<Arc<Snapshot>> {
		self.withdrawable_position(now)
			.map(|position| self.latest_blocks[position].clone())
	}

	fn withdrawable_position(&self, now: u64) -> Option<usize> {
		self.latest_blocks
			.iter()
			.position(|block| now.saturating_sub(block.timestamp) > self.block_freeze_ms)
	}

	/// Snapshot from the in-memory window, or from the store.
	pub async fn get_block(&self, block_number: u64) -> Result<Arc<Snapshot>, LedgerError> {
		if let Some(block) = self
			.latest_blocks
			.iter()
			.find(|b| b.block_number == block_number)
		{
			return Ok(block.clone());
		}
		if !self.store.block_exists(block_number).await? {
			return Err(LedgerError::BlockNotFound(block_number));
		}
		Ok(Arc::new(self.store.load_block(block_number).await?))
	}

	pub async fn get_member_at(
		&self,
		address: &Address,
		block_number: u64,
	) -> Result<Member, LedgerError> {
		let block = self.get_block(block_number).await?;
		block
			.member(address)
			.cloned()
			.ok_or(LedgerError::MemberNotFound {
				address: *address,
				block_number,
			})
	}

	/// Proof of the member's balance in block `block_number`.
	pub async fn get_proof_at(
		&self,
		address: &Address,
		block_number: u64,
	) -> Result<Vec<H256>, LedgerError> {
		let block = self.get_block(block_number).await?;
		if block.member(address).is_none() {
			return Err(LedgerError::MemberNotFound {
				address: *address,
				block_number,
			});
		}
		Ok(self.tree_at(&block).get_path(address).await?)
	}

	pub async fn get_root_hash_at(&self, block_number: u64) -> Result<H256, LedgerError> {
		let block = self.get_block(block_number).await?;
		Ok(self.tree_at(&block).get_root_hash().await?)
	}

	fn tree_at(&self, block: &Snapshot) -> Arc<MerkleAccumulator> {
		self.tree_cache.get_or_insert_with(block.block_number, || {
			MerkleAccumulator::new(
				self.builder.clone(),
				block.members.clone(),
				block.block_number,
			)
		})
	}

	fn current_tree(&self) -> &MerkleAccumulator {
		if !self.tree.tracks(&self.members, self.current_block) {
			self.tree.update(self.members.clone(), self.current_block);
		}
		&self.tree
	}

	/// Root of the current (uncommitted) state, salted with the current block.
	pub async fn get_root_hash(&self) -> Result<H256, LedgerError> {
		Ok(self.current_tree().get_root_hash().await?)
	}

	pub async fn get_proof(&self, address: &Address) -> Result<Vec<H256>, LedgerError> {
		Ok(self.current_tree().get_path(address).await?)
	}

	/// Active members.
	pub fn get_members(&self) -> Vec<Member> {
		self.members.iter().filter(|m| m.active).cloned().collect()
	}

	pub fn get_member(&self, address: &Address) -> Option<Member> {
		self.index.get(address).map(|&i| self.members[i].clone())
	}

	/// Counts leave out the admin's implicit entry.
	pub fn get_member_count(&self) -> MemberCount {
		let active = self.members.iter().filter(|m| m.active).count();
		let implicit_admin = self
			.get_member(&self.admin_address)
			.is_some_and(|m| !m.active);
		let total = self.members.len() - usize::from(implicit_admin);
		MemberCount {
			active,
			inactive: total - active,
			total,
		}
	}

	pub fn members(&self) -> &Arc<Vec<Member>> {
		&self.members
	}

	pub fn get_total_earnings(&self) -> U256 {
		self.total_earnings
	}

	pub fn admin_address(&self) -> Address {
		self.admin_address
	}

	pub fn admin_fee_fraction(&self) -> U256 {
		self.admin_fee_fraction
	}

	pub fn current_block(&self) -> u64 {
		self.current_block
	}

	pub fn current_timestamp(&self) -> u64 {
		self.current_timestamp
	}

	pub fn block_freeze_seconds(&self) -> u64 {
		self.block_freeze_ms / 1000
	}

	pub fn tree_builder(&self) -> &TreeBuilder {
		&self.builder
	}

	pub fn get_member_api(&self) -> MemberApi<'_> {
		MemberApi::new(self)
	}
}
