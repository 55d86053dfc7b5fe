//! Lazily rebuilt Merkle tree over a `(members, salt)` source.
//!
//! `update` only swaps the source and marks the tree dirty; the rebuild happens on the next
//! `get_contents`. The finished tree is cached only if the source is still the same `Arc`
//! (and salt) it was built from, so an `update` that lands during a build never leaves a
//! tree for the old member list behind.

use super::tree::MerkleTree;
use super::types::MerkleError;
use super::worker::TreeBuilder;
use crate::ledger::Member;

use ethereum_types::{Address, H256};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

struct AccumulatorState {
	source: Arc<Vec<Member>>,
	salt: u64,
	dirty: bool,
	contents: Option<Arc<MerkleTree>>,
}

pub struct MerkleAccumulator {
	builder: TreeBuilder,
	state: Mutex<AccumulatorState>,
}

impl MerkleAccumulator {
	pub fn new(builder: TreeBuilder, members: Arc<Vec<Member>>, salt: u64) -> Self {
		Self {
			builder,
			state: Mutex::new(AccumulatorState {
				source: members,
				salt,
				dirty: true,
				contents: None,
			}),
		}
	}

	pub fn update(&self, members: Arc<Vec<Member>>, salt: u64) {
		let mut state = self.state.lock();
		state.source = members;
		state.salt = salt;
		state.dirty = true;
	}

	/// Whether this accumulator is already tracking exactly this source.
	pub fn tracks(&self, members: &Arc<Vec<Member>>, salt: u64) -> bool {
		let state = self.state.lock();
		Arc::ptr_eq(&state.source, members) && state.salt == salt
	}

	pub async fn get_contents(&self) -> Result<Arc<MerkleTree>, MerkleError> {
		let (source, salt) = {
			let state = self.state.lock();
			if !state.dirty {
				if let Some(contents) = &state.contents {
					return Ok(contents.clone());
				}
			}
			(state.source.clone(), state.salt)
		};

		let leaves = source.iter().map(|m| (m.address, m.earnings)).collect();
		let tree = Arc::new(self.builder.build(leaves, salt).await?);

		let mut state = self.state.lock();
		if Arc::ptr_eq(&state.source, &source) && state.salt == salt {
			debug!("Cached tree for {} members (salt {})", tree.leaf_count(), salt);
			state.contents = Some(tree.clone());
			state.dirty = false;
		} else {
			warn!("Member list changed during tree build (salt {}), result not cached", salt);
		}
		Ok(tree)
	}

	pub async fn get_root_hash(&self) -> Result<H256, MerkleError> {
		Ok(self.get_contents().await?.root_hash())
	}

	pub async fn get_path(&self, address: &Address) -> Result<Vec<H256>, MerkleError> {
		self.get_contents().await?.path(address)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ethereum_types::U256;

	fn members(earnings: &[u64]) -> Arc<Vec<Member>> {
		Arc::new(
			earnings
				.iter()
				.enumerate()
				.map(|(i, e)| {
					let mut member = Member::new(Address::from_low_u64_be(i as u64 + 1), None);
					member.earnings = U256::from(*e);
					member
				})
				.collect(),
		)
	}

	#[tokio::test]
	async fn rebuilds_only_when_dirty() {
		let builder = TreeBuilder::new(1, usize::MAX);
		let source = members(&[1, 2, 3]);
		let accumulator = MerkleAccumulator::new(builder.clone(), source.clone(), 1);

		let first = accumulator.get_root_hash().await.unwrap();
		let second = accumulator.get_root_hash().await.unwrap();
		assert_eq!(first, second);
		assert_eq!(builder.builds_started(), 1);

		assert!(accumulator.tracks(&source, 1));
		accumulator.update(members(&[1, 2, 4]), 1);
		let third = accumulator.get_root_hash().await.unwrap();
		assert_ne!(first, third);
		assert_eq!(builder.builds_started(), 2);
	}

	#[tokio::test]
	async fn update_during_build_is_not_lost() {
		let builder = TreeBuilder::new(1, usize::MAX);
		let accumulator = MerkleAccumulator::new(builder.clone(), members(&[1, 2, 3, 4, 5]), 0);
		let replacement = members(&[9, 9, 9]);
		let expected = MerkleTree::build(
			&replacement.iter().map(|m| (m.address, m.earnings)).collect::<Vec<_>>(),
			0,
		)
		.unwrap()
		.root_hash();

		let (built, ()) = tokio::join!(accumulator.get_contents(), async {
			tokio::task::yield_now().await;
			accumulator.update(replacement.clone(), 0);
		});
		built.unwrap();

		assert_eq!(accumulator.get_root_hash().await.unwrap(), expected);
	}

	#[tokio::test]
	async fn empty_source_fails() {
		let accumulator = MerkleAccumulator::new(TreeBuilder::default(), Arc::new(Vec::new()), 0);
		assert!(matches!(
			accumulator.get_root_hash().await,
			Err(MerkleError::EmptyTree)
		));
	}
}
