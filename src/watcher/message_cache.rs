//! Join/part messages kept for playback, sorted by timestamp.

use super::types::WatcherError;
use crate::events::ChannelMessage;

use parking_lot::Mutex;
use std::sync::Arc;

/// Cache shared by a watcher's live path and its operator's finalized path.
pub type SharedMessageCache = Arc<Mutex<MessageCache>>;

#[derive(Debug, Clone, Default)]
pub struct MessageCache {
	messages: Vec<ChannelMessage>,
	/// Everything at or before this timestamp has been dropped.
	pruned_up_to: Option<u64>,
}

impl MessageCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn shared() -> SharedMessageCache {
		Arc::new(Mutex::new(Self::new()))
	}

	pub fn len(&self) -> usize {
		self.messages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.messages.is_empty()
	}

	pub fn pruned_up_to(&self) -> Option<u64> {
		self.pruned_up_to
	}

	/// Insert after any message with the same timestamp, keeping arrival order for ties.
	pub fn insert(&mut self, message: ChannelMessage) {
		let at = self
			.messages
			.partition_point(|m| m.timestamp <= message.timestamp);
		self.messages.insert(at, message);
	}

	/// Fails if messages after `from` may already have been pruned.
	pub fn ensure_available(&self, from: u64) -> Result<(), WatcherError> {
		match self.pruned_up_to {
			Some(pruned_up_to) if from < pruned_up_to => Err(WatcherError::CachePruned {
				requested: from,
				pruned_up_to,
			}),
			_ => Ok(()),
		}
	}

	/// Messages with `from < timestamp <= to`.
	pub fn range(&self, from: u64, to: u64) -> Result<Vec<ChannelMessage>, WatcherError> {
		self.ensure_available(from)?;
		let start = self.messages.partition_point(|m| m.timestamp <= from);
		let end = self.messages.partition_point(|m| m.timestamp <= to);
		Ok(self.messages[start..end.max(start)].to_vec())
	}

	/// Drop messages with `timestamp <= up_to`. Returns how many were dropped.
	pub fn prune_up_to(&mut self, up_to: u64) -> usize {
		let end = self.messages.partition_point(|m| m.timestamp <= up_to);
		self.messages.drain(..end);
		self.pruned_up_to = Some(self.pruned_up_to.map_or(up_to, |p| p.max(up_to)));
		end
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::ChannelTopic;
	use ethereum_types::Address;

	fn message(timestamp: u64, address: u64) -> ChannelMessage {
		ChannelMessage {
			topic: ChannelTopic::Join,
			addresses: vec![Address::from_low_u64_be(address)],
			timestamp,
		}
	}

	#[test]
	fn keeps_messages_sorted_and_stable() {
		let mut cache = MessageCache::new();
		for (ts, id) in [(30, 1), (10, 2), (20, 3), (20, 4)] {
			cache.insert(message(ts, id));
		}
		let all = cache.range(0, 100).unwrap();
		let order: Vec<u64> = all.iter().map(|m| m.addresses[0].to_low_u64_be()).collect();
		assert_eq!(order, vec![2, 3, 4, 1]);
	}

	#[test]
	fn range_is_exclusive_then_inclusive() {
		let mut cache = MessageCache::new();
		for ts in [10, 20, 30, 40] {
			cache.insert(message(ts, ts));
		}
		let slice = cache.range(10, 30).unwrap();
		let timestamps: Vec<u64> = slice.iter().map(|m| m.timestamp).collect();
		assert_eq!(timestamps, vec![20, 30]);
		assert!(cache.range(40, 30).unwrap().is_empty());
	}

	#[test]
	fn pruned_history_cannot_be_requested() {
		let mut cache = MessageCache::new();
		for ts in [10, 20, 30] {
			cache.insert(message(ts, ts));
		}
		assert_eq!(cache.prune_up_to(20), 2);
		assert_eq!(cache.len(), 1);
		assert!(matches!(
			cache.range(15, 40),
			Err(WatcherError::CachePruned {
				requested: 15,
				pruned_up_to: 20
			})
		));
		assert_eq!(cache.range(20, 40).unwrap().len(), 1);

		// the floor never moves back
		cache.prune_up_to(5);
		assert_eq!(cache.pruned_up_to(), Some(20));
	}
}
