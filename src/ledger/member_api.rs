use super::state::LedgerState;
use super::types::{LedgerError, Member, MemberCount, Snapshot};
use crate::utils::now_millis;

use ethereum_types::{Address, H256, U256};
use std::sync::Arc;

/// Read-only view of a ledger for query handlers.
#[derive(Clone, Copy)]
pub struct MemberApi<'a> {
	ledger: &'a LedgerState,
}

impl<'a> MemberApi<'a> {
	pub fn new(ledger: &'a LedgerState) -> Self {
		Self { ledger }
	}

	pub fn get_member(&self, address: &Address) -> Option<Member> {
		self.ledger.get_member(address)
	}

	pub fn get_members(&self) -> Vec<Member> {
		self.ledger.get_members()
	}

	pub fn get_member_count(&self) -> MemberCount {
		self.ledger.get_member_count()
	}

	pub fn get_total_earnings(&self) -> U256 {
		self.ledger.get_total_earnings()
	}

	pub fn get_latest_block(&self) -> Option<Arc<Snapshot>> {
		self.ledger.latest_block()
	}

	pub fn get_latest_withdrawable_block(&self) -> Option<Arc<Snapshot>> {
		self.ledger.find_latest_withdrawable_block(now_millis())
	}

	pub async fn get_member_at(
		&self,
		address: &Address,
		block_number: u64,
	) -> Result<Member, LedgerError> {
		self.ledger.get_member_at(address, block_number).await
	}

	pub async fn get_proof_at(
		&self,
		address: &Address,
		block_number: u64,
	) -> Result<Vec<H256>, LedgerError> {
		self.ledger.get_proof_at(address, block_number).await
	}

	pub async fn get_root_hash_at(&self, block_number: u64) -> Result<H256, LedgerError> {
		self.ledger.get_root_hash_at(block_number).await
	}
}
