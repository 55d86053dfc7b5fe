//! Flat binary Merkle tree.
//!
//! Hashes live in one array laid out like a binary heap: the root sits at index 1, the children
//! of node `i` at `2i` and `2i + 1`, and the leaf row starts at the row width stored in slot 0.
//! The leaf count is padded to an even number and the leaf row to a power of two; every padding
//! slot holds `ZERO_HASH`.

use super::hash::{combine, leaf_hash};
use super::types::{MerkleError, ZERO_HASH};

use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTree {
	hashes: Vec<H256>,
	leaf_index: HashMap<Address, usize>,
}

impl MerkleTree {
	/// Build the whole tree in one go.
	pub fn build(leaves: &[(Address, U256)], salt: u64) -> Result<Self, MerkleError> {
		let mut tree = Self::with_leaves(leaves, salt)?;
		let mut row = tree.leaf_start();
		while row > 1 {
			tree.hash_row(row);
			row /= 2;
		}
		Ok(tree)
	}

	/// Build row by row, yielding to the scheduler between rows.
	pub async fn build_yielding(leaves: &[(Address, U256)], salt: u64) -> Result<Self, MerkleError> {
		let mut tree = Self::with_leaves(leaves, salt)?;
		let mut row = tree.leaf_start();
		while row > 1 {
			tokio::task::yield_now().await;
			tree.hash_row(row);
			row /= 2;
		}
		Ok(tree)
	}

	fn with_leaves(leaves: &[(Address, U256)], salt: u64) -> Result<Self, MerkleError> {
		if leaves.is_empty() {
			return Err(MerkleError::EmptyTree);
		}
		let leaf_count = leaves.len() + leaves.len() % 2;
		let leaf_start = leaf_count.next_power_of_two();

		let mut hashes = vec![ZERO_HASH; 2 * leaf_start];
		hashes[0] = H256::from_low_u64_be(leaf_start as u64);

		let mut leaf_index = HashMap::with_capacity(leaves.len());
		for (i, (address, earnings)) in leaves.iter().enumerate() {
			hashes[leaf_start + i] = leaf_hash(address, *earnings, salt);
			leaf_index.insert(*address, i);
		}

		Ok(Self { hashes, leaf_index })
	}

	/// Fill the parents of the row that starts at `row_start`.
	fn hash_row(&mut self, row_start: usize) {
		for parent in row_start / 2..row_start {
			self.hashes[parent] = combine(&self.hashes[2 * parent], &self.hashes[2 * parent + 1]);
		}
	}

	fn leaf_start(&self) -> usize {
		self.hashes[0].to_low_u64_be() as usize
	}

	pub fn root_hash(&self) -> H256 {
		self.hashes[1]
	}

	pub fn leaf_count(&self) -> usize {
		self.leaf_index.len()
	}

	pub fn contains(&self, address: &Address) -> bool {
		self.leaf_index.contains_key(address)
	}

	/// Sibling hashes from the member's leaf up to the root, zero siblings omitted.
	pub fn path(&self, address: &Address) -> Result<Vec<H256>, MerkleError> {
		let leaf = self
			.leaf_index
			.get(address)
			.ok_or(MerkleError::MemberNotFound(*address))?;

		let mut path = Vec::new();
		let mut node = self.leaf_start() + leaf;
		while node > 1 {
			let sibling = self.hashes[node ^ 1];
			if sibling != ZERO_HASH {
				path.push(sibling);
			}
			node /= 2;
		}
		Ok(path)
	}

	pub fn leaf_hash_of(&self, address: &Address) -> Option<H256> {
		self.leaf_index
			.get(address)
			.map(|leaf| self.hashes[self.leaf_start() + leaf])
	}

	pub fn to_bytes(&self) -> Result<Vec<u8>, MerkleError> {
		Ok(bincode::serialize(self)?)
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, MerkleError> {
		Ok(bincode::deserialize(bytes)?)
	}
}
