//! Stable merges of already-sorted event lists. No I/O.

use super::types::{ChainEvent, ChannelMessage, MergedEvent};

use itertools::Itertools;

/// Merge two lists sorted by chain position into one, keeping chain order.
/// On equal positions the element from `a` comes first.
pub fn merge_ordered_event_lists(a: Vec<ChainEvent>, b: Vec<ChainEvent>) -> Vec<ChainEvent> {
	a.into_iter()
		.merge_by(b, |x, y| x.position <= y.position)
		.collect()
}

/// Interleave chain events and channel messages by timestamp.
///
/// A chain event wins a tie: a block is taken to contain every join and part that happened
/// strictly before its timestamp.
pub fn merge_by_timestamp(
	events: Vec<ChainEvent>,
	messages: Vec<ChannelMessage>,
) -> Vec<MergedEvent> {
	events
		.into_iter()
		.map(MergedEvent::from)
		.merge_by(messages.into_iter().map(MergedEvent::from), |event, message| {
			event.timestamp() <= message.timestamp()
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::types::{ChainEventKind, ChannelTopic, EventPosition};
	use ethereum_types::{Address, U256};

	fn transfer(block: u64, log: u64, timestamp: u64, amount: u64) -> ChainEvent {
		ChainEvent {
			position: EventPosition::new(block, 0, log),
			timestamp,
			kind: ChainEventKind::Transfer {
				amount: U256::from(amount),
			},
		}
	}

	fn fee(block: u64, log: u64, timestamp: u64) -> ChainEvent {
		ChainEvent {
			position: EventPosition::new(block, 0, log),
			timestamp,
			kind: ChainEventKind::AdminFeeChanged {
				fraction: U256::zero(),
			},
		}
	}

	fn join(timestamp: u64, address: u64) -> ChannelMessage {
		ChannelMessage {
			topic: ChannelTopic::Join,
			addresses: vec![Address::from_low_u64_be(address)],
			timestamp,
		}
	}

	#[test]
	fn chain_merge_keeps_log_order() {
		let a = vec![transfer(1, 0, 10, 1), transfer(3, 2, 30, 2), transfer(5, 0, 50, 3)];
		let b = vec![fee(1, 1, 10), fee(3, 1, 30), fee(6, 0, 60)];
		let merged = merge_ordered_event_lists(a, b);
		let positions: Vec<_> = merged.iter().map(|e| e.position).collect();
		let mut sorted = positions.clone();
		sorted.sort();
		assert_eq!(positions, sorted);
		assert_eq!(merged.len(), 6);
	}

	#[test]
	fn chain_merge_prefers_first_list_on_equal_position() {
		let a = vec![transfer(2, 0, 20, 1)];
		let b = vec![fee(2, 0, 20)];
		let merged = merge_ordered_event_lists(a, b);
		assert!(matches!(merged[0].kind, ChainEventKind::Transfer { .. }));
	}

	#[test]
	fn timestamp_merge_is_sorted_and_stable() {
		let events = vec![transfer(1, 0, 100, 1), transfer(1, 1, 100, 2), transfer(2, 0, 300, 3)];
		let messages = vec![join(50, 1), join(100, 2), join(100, 3), join(400, 4)];
		let merged = merge_by_timestamp(events, messages);

		let timestamps: Vec<u64> = merged.iter().map(|e| e.timestamp()).collect();
		assert_eq!(timestamps, vec![50, 100, 100, 100, 100, 300, 400]);

		// chain events first on the tie at 100, each source in its own order
		assert!(matches!(merged[1], MergedEvent::Transfer { amount, .. } if amount == U256::from(1)));
		assert!(matches!(merged[2], MergedEvent::Transfer { amount, .. } if amount == U256::from(2)));
		assert!(matches!(&merged[3], MergedEvent::Join { addresses, .. } if addresses[0] == Address::from_low_u64_be(2)));
		assert!(matches!(&merged[4], MergedEvent::Join { addresses, .. } if addresses[0] == Address::from_low_u64_be(3)));
	}

	#[test]
	fn timestamp_merge_handles_empty_inputs() {
		assert!(merge_by_timestamp(Vec::new(), Vec::new()).is_empty());
		let only_messages = merge_by_timestamp(Vec::new(), vec![join(1, 1)]);
		assert_eq!(only_messages.len(), 1);
		assert!(!only_messages[0].is_chain_event());
	}
}
