//! Applying merged events to a ledger.

use super::dispatcher::LedgerEvent;
use super::merge::merge_by_timestamp;
use super::types::{ChainEvent, ChannelMessage, MergedEvent};
use crate::ledger::{FeeFraction, LedgerError, LedgerState};

use tracing::debug;

/// Apply one event. Returns what changed, if anything.
///
/// A commit for a block the ledger already holds (or has moved past) is skipped: the ledger
/// that published it stored the snapshot itself. A commit seen first here never overwrites a
/// snapshot the publishing ledger already persisted.
pub async fn replay(
	ledger: &mut LedgerState,
	event: &MergedEvent,
) -> Result<Option<LedgerEvent>, LedgerError> {
	match event {
		MergedEvent::Transfer {
			amount,
			block_number,
			..
		} => {
			let split = ledger.add_revenue(*amount)?;
			Ok(Some(LedgerEvent::RevenueReceived {
				amount: *amount,
				block_number: *block_number,
				split,
			}))
		}
		MergedEvent::Commit {
			block_number,
			timestamp,
			..
		} => {
			if let Some(latest) = ledger.latest_block() {
				if latest.block_number >= *block_number {
					debug!(
						"Commit of block {} skipped, latest stored is {}",
						block_number, latest.block_number
					);
					return Ok(None);
				}
			}
			ledger.observe_block(*block_number, *timestamp).await?;
			Ok(Some(LedgerEvent::BlockStored {
				block_number: *block_number,
				timestamp: *timestamp,
			}))
		}
		MergedEvent::AdminFeeChanged { fraction, .. } => {
			ledger.set_admin_fee_fraction(FeeFraction::Scaled(*fraction))?;
			Ok(Some(LedgerEvent::AdminFeeChanged {
				fraction: *fraction,
			}))
		}
		MergedEvent::Join {
			addresses,
			timestamp,
		} => {
			let joined = ledger.add_members(addresses);
			debug!("Join of {} addresses, {} new", addresses.len(), joined.len());
			Ok((!joined.is_empty()).then(|| LedgerEvent::MembersJoined {
				addresses: joined,
				timestamp: *timestamp,
			}))
		}
		MergedEvent::Part {
			addresses,
			timestamp,
		} => {
			let parted = ledger.remove_members(addresses);
			debug!("Part of {} addresses, {} left", addresses.len(), parted.len());
			Ok((!parted.is_empty()).then(|| LedgerEvent::MembersParted {
				addresses: parted,
				timestamp: *timestamp,
			}))
		}
	}
}

/// Merge both sources by timestamp and replay the result in order.
pub async fn replay_all(
	ledger: &mut LedgerState,
	events: Vec<ChainEvent>,
	messages: Vec<ChannelMessage>,
) -> Result<Vec<LedgerEvent>, LedgerError> {
	let mut changes = Vec::new();
	for event in merge_by_timestamp(events, messages) {
		if let Some(change) = replay(ledger, &event).await? {
			changes.push(change);
		}
	}
	Ok(changes)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::types::{ChainEventKind, ChannelTopic, EventPosition};
	use crate::ledger::LedgerOptions;
	use crate::merkle::TreeBuilder;
	use crate::store::MemoryBlockStore;
	use ethereum_types::{Address, H256, U256};
	use std::sync::Arc;

	fn ledger() -> LedgerState {
		LedgerState::new(
			LedgerOptions {
				admin_address: Address::repeat_byte(0xad),
				block_freeze_seconds: 0,
				tree_cache_size: 2,
			},
			1,
			Arc::new(MemoryBlockStore::new()),
			TreeBuilder::default(),
		)
	}

	fn address(i: u64) -> Address {
		Address::from_low_u64_be(i)
	}

	fn chain(block: u64, timestamp: u64, kind: ChainEventKind) -> ChainEvent {
		ChainEvent {
			position: EventPosition::new(block, 0, 0),
			timestamp,
			kind,
		}
	}

	fn message(topic: ChannelTopic, timestamp: u64, addresses: &[u64]) -> ChannelMessage {
		ChannelMessage {
			topic,
			addresses: addresses.iter().copied().map(address).collect(),
			timestamp,
		}
	}

	#[tokio::test]
	async fn replays_in_timestamp_order() {
		let mut ledger = ledger();
		let events = vec![
			chain(1, 100, ChainEventKind::Transfer {
				amount: U256::from(10),
			}),
			chain(2, 200, ChainEventKind::Transfer {
				amount: U256::from(10),
			}),
			chain(3, 300, ChainEventKind::Commit {
				block_number: 3,
				root_hash: H256::zero(),
			}),
		];
		// member 2 joins exactly at the second transfer's time, so it misses that transfer
		let messages = vec![
			message(ChannelTopic::Join, 50, &[1]),
			message(ChannelTopic::Join, 200, &[2]),
			message(ChannelTopic::Part, 250, &[1]),
		];

		let changes = replay_all(&mut ledger, events, messages).await.unwrap();

		assert_eq!(ledger.get_member(&address(1)).unwrap().earnings, U256::from(20));
		assert_eq!(ledger.get_member(&address(2)).unwrap().earnings, U256::zero());
		assert!(!ledger.get_member(&address(1)).unwrap().active);
		assert_eq!(ledger.latest_block().unwrap().timestamp, 300);
		assert!(matches!(changes.last(), Some(LedgerEvent::BlockStored { block_number: 3, .. })));
	}

	#[tokio::test]
	async fn repeated_membership_messages_change_nothing() {
		let mut ledger = ledger();
		let join = MergedEvent::Join {
			addresses: vec![address(1)],
			timestamp: 1,
		};
		assert!(replay(&mut ledger, &join).await.unwrap().is_some());
		assert!(replay(&mut ledger, &join).await.unwrap().is_none());

		let part = MergedEvent::Part {
			addresses: vec![address(1)],
			timestamp: 2,
		};
		assert!(replay(&mut ledger, &part).await.unwrap().is_some());
		assert!(replay(&mut ledger, &part).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn commit_of_retained_block_is_skipped() {
		let mut ledger = ledger();
		ledger.add_member(address(1), None);
		ledger.store_block(5, 10).await.unwrap();
		let commit = MergedEvent::Commit {
			block_number: 5,
			root_hash: H256::zero(),
			timestamp: 20,
		};
		assert!(replay(&mut ledger, &commit).await.unwrap().is_none());
		assert_eq!(ledger.retained_block_numbers(), vec![5]);
	}

	#[tokio::test]
	async fn fee_change_applies_to_later_revenue() {
		let mut ledger = ledger();
		ledger.add_member(address(1), None);
		let half = U256::exp10(17) * 5;
		let events = vec![
			chain(1, 10, ChainEventKind::AdminFeeChanged { fraction: half }),
			chain(2, 20, ChainEventKind::Transfer {
				amount: U256::from(100),
			}),
		];
		replay_all(&mut ledger, events, Vec::new()).await.unwrap();
		assert_eq!(ledger.get_member(&address(1)).unwrap().earnings, U256::from(50));
		assert_eq!(
			ledger.get_member(&Address::repeat_byte(0xad)).unwrap().earnings,
			U256::from(50)
		);
	}
}
