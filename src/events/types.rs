use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Chain order of a log: block, then transaction, then log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EventPosition {
	pub block_number: u64,
	pub transaction_index: u64,
	pub log_index: u64,
}

impl EventPosition {
	pub fn new(block_number: u64, transaction_index: u64, log_index: u64) -> Self {
		Self {
			block_number,
			transaction_index,
			log_index,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEventKind {
	/// Tokens sent to the contract.
	Transfer { amount: U256 },
	/// A checkpoint committed for `block_number`.
	Commit { block_number: u64, root_hash: H256 },
	/// New admin fee, scaled by 10^18.
	AdminFeeChanged { fraction: U256 },
}

/// A decoded contract log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
	pub position: EventPosition,
	/// Block time in milliseconds; zero until resolved.
	pub timestamp: u64,
	pub kind: ChainEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelTopic {
	Join,
	Part,
}

impl std::fmt::Display for ChannelTopic {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ChannelTopic::Join => write!(f, "join"),
			ChannelTopic::Part => write!(f, "part"),
		}
	}
}

/// A join or part notification from the off-chain channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
	pub topic: ChannelTopic,
	pub addresses: Vec<Address>,
	/// Milliseconds since the epoch.
	pub timestamp: u64,
}

/// One step of replay, from either source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergedEvent {
	Transfer {
		amount: U256,
		block_number: u64,
		timestamp: u64,
	},
	Commit {
		block_number: u64,
		root_hash: H256,
		timestamp: u64,
	},
	AdminFeeChanged {
		fraction: U256,
		timestamp: u64,
	},
	Join {
		addresses: Vec<Address>,
		timestamp: u64,
	},
	Part {
		addresses: Vec<Address>,
		timestamp: u64,
	},
}

impl MergedEvent {
	pub fn timestamp(&self) -> u64 {
		match self {
			MergedEvent::Transfer { timestamp, .. }
			| MergedEvent::Commit { timestamp, .. }
			| MergedEvent::AdminFeeChanged { timestamp, .. }
			| MergedEvent::Join { timestamp, .. }
			| MergedEvent::Part { timestamp, .. } => *timestamp,
		}
	}

	pub fn is_chain_event(&self) -> bool {
		!matches!(self, MergedEvent::Join { .. } | MergedEvent::Part { .. })
	}
}

impl From<ChainEvent> for MergedEvent {
	fn from(event: ChainEvent) -> Self {
		let timestamp = event.timestamp;
		match event.kind {
			ChainEventKind::Transfer { amount } => MergedEvent::Transfer {
				amount,
				block_number: event.position.block_number,
				timestamp,
			},
			ChainEventKind::Commit {
				block_number,
				root_hash,
			} => MergedEvent::Commit {
				block_number,
				root_hash,
				timestamp,
			},
			ChainEventKind::AdminFeeChanged { fraction } => {
				MergedEvent::AdminFeeChanged { fraction, timestamp }
			}
		}
	}
}

impl From<ChannelMessage> for MergedEvent {
	fn from(message: ChannelMessage) -> Self {
		match message.topic {
			ChannelTopic::Join => MergedEvent::Join {
				addresses: message.addresses,
				timestamp: message.timestamp,
			},
			ChannelTopic::Part => MergedEvent::Part {
				addresses: message.addresses,
				timestamp: message.timestamp,
			},
		}
	}
}

/// Error returned by change-notification handlers
#[derive(Debug, thiserror::Error)]
pub enum EventError {
	#[error("Handler error: {0}")]
	HandlerError(String),
}
