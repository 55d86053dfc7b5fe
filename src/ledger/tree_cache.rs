//! Per-snapshot Merkle accumulators, evicted by lowest hit count.
//!
//! This is a frequency cache, not an LRU: an old block that has been queried often outlives a
//! newer block that was queried once.

use crate::merkle::MerkleAccumulator;

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const MIN_TREE_CACHE_SIZE: usize = 2;

struct CacheEntry {
	hits: u64,
	accumulator: Arc<MerkleAccumulator>,
}

pub struct TreeCache {
	capacity: usize,
	entries: Mutex<BTreeMap<u64, CacheEntry>>,
}

impl TreeCache {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(MIN_TREE_CACHE_SIZE),
			entries: Mutex::new(BTreeMap::new()),
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn contains(&self, block_number: u64) -> bool {
		self.entries.lock().contains_key(&block_number)
	}

	pub fn hits(&self, block_number: u64) -> Option<u64> {
		self.entries.lock().get(&block_number).map(|e| e.hits)
	}

	/// Return the cached accumulator for `block_number`, creating it with `create` on a miss.
	pub fn get_or_insert_with(
		&self,
		block_number: u64,
		create: impl FnOnce() -> MerkleAccumulator,
	) -> Arc<MerkleAccumulator> {
		let mut entries = self.entries.lock();
		if let Some(entry) = entries.get_mut(&block_number) {
			entry.hits += 1;
			return entry.accumulator.clone();
		}

		if entries.len() >= self.capacity {
			// min_by_key keeps the first minimum, so ties evict the lowest block number
			let victim = entries
				.iter()
				.min_by_key(|(_, entry)| entry.hits)
				.map(|(block, _)| *block);
			if let Some(victim) = victim {
				debug!("Evicting tree of block {} from cache", victim);
				entries.remove(&victim);
			}
		}

		let accumulator = Arc::new(create());
		entries.insert(
			block_number,
			CacheEntry {
				hits: 1,
				accumulator: accumulator.clone(),
			},
		);
		accumulator
	}
}
