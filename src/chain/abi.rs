//! Contract ABI: event topics, call selectors, log decoding and commit encoding.

use super::types::RawLog;
use crate::events::{ChainEvent, ChainEventKind, EventPosition};

use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use std::sync::LazyLock;
use tracing::warn;

pub const BLOCK_CREATED_EVENT: &str = "BlockCreated(uint256,bytes32,string)";
pub const ADMIN_FEE_CHANGED_EVENT: &str = "AdminFeeChanged(uint256)";
pub const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";

pub const COMMIT_CALL: &str = "commit(uint256,bytes32,string)";
pub const TOKEN_CALL: &str = "token()";
pub const OWNER_CALL: &str = "owner()";
pub const BLOCK_FREEZE_SECONDS_CALL: &str = "blockFreezeSeconds()";
pub const ADMIN_FEE_CALL: &str = "adminFee()";

pub static BLOCK_CREATED_TOPIC: LazyLock<H256> = LazyLock::new(|| event_topic(BLOCK_CREATED_EVENT));
pub static ADMIN_FEE_CHANGED_TOPIC: LazyLock<H256> =
	LazyLock::new(|| event_topic(ADMIN_FEE_CHANGED_EVENT));
pub static TRANSFER_TOPIC: LazyLock<H256> = LazyLock::new(|| event_topic(TRANSFER_EVENT));

const WORD: usize = 32;

pub fn event_topic(signature: &str) -> H256 {
	H256(keccak(signature.as_bytes()).0)
}

pub fn selector(signature: &str) -> [u8; 4] {
	let hash = keccak(signature.as_bytes());
	[hash.0[0], hash.0[1], hash.0[2], hash.0[3]]
}

/// An address left-padded to a 32-byte topic.
pub fn address_topic(address: &Address) -> H256 {
	let mut topic = [0u8; WORD];
	topic[12..].copy_from_slice(address.as_bytes());
	H256(topic)
}

pub fn word(data: &[u8], index: usize) -> Option<&[u8]> {
	data.get(index * WORD..(index + 1) * WORD)
}

pub fn u256_word(data: &[u8], index: usize) -> Option<U256> {
	word(data, index).map(U256::from_big_endian)
}

pub fn address_word(data: &[u8], index: usize) -> Option<Address> {
	word(data, index).map(|w| Address::from_slice(&w[12..]))
}

fn u64_word(data: &[u8], index: usize) -> Option<u64> {
	let value = u256_word(data, index)?;
	(value <= U256::from(u64::MAX)).then(|| value.as_u64())
}

/// Decode a contract log. Logs with an unknown topic or malformed data are logged and skipped.
pub fn decode_log(log: &RawLog) -> Option<ChainEvent> {
	let position = EventPosition::new(log.block_number, log.transaction_index, log.log_index);
	let Some(topic) = log.topics.first() else {
		warn!("Log without topics at {:?}, skipping", position);
		return None;
	};

	let kind = if *topic == *TRANSFER_TOPIC {
		u256_word(&log.data, 0).map(|amount| ChainEventKind::Transfer { amount })
	} else if *topic == *BLOCK_CREATED_TOPIC {
		u64_word(&log.data, 0)
			.zip(word(&log.data, 1))
			.map(|(block_number, root)| ChainEventKind::Commit {
				block_number,
				root_hash: H256::from_slice(root),
			})
	} else if *topic == *ADMIN_FEE_CHANGED_TOPIC {
		u256_word(&log.data, 0).map(|fraction| ChainEventKind::AdminFeeChanged { fraction })
	} else {
		warn!("Unknown event topic {:?} at {:?}, skipping", topic, position);
		return None;
	};

	if kind.is_none() {
		warn!("Malformed log data for topic {:?} at {:?}, skipping", topic, position);
	}
	kind.map(|kind| ChainEvent {
		position,
		timestamp: 0,
		kind,
	})
}

/// Calldata for `commit(uint256 blockNumber, bytes32 rootHash, string aux)`.
pub fn encode_commit(block_number: u64, root_hash: H256, aux: &str) -> Vec<u8> {
	let aux = aux.as_bytes();
	let padded_len = aux.len().div_ceil(WORD) * WORD;

	let mut data = Vec::with_capacity(4 + 4 * WORD + padded_len);
	data.extend_from_slice(&selector(COMMIT_CALL));
	data.extend_from_slice(&U256::from(block_number).to_big_endian());
	data.extend_from_slice(root_hash.as_bytes());
	data.extend_from_slice(&U256::from(3 * WORD).to_big_endian());
	data.extend_from_slice(&U256::from(aux.len()).to_big_endian());
	data.extend_from_slice(aux);
	data.resize(4 + 4 * WORD + padded_len, 0);
	data
}

#[cfg(test)]
mod tests {
	use super::*;

	fn log(topics: Vec<H256>, data: Vec<u8>) -> RawLog {
		RawLog {
			address: Address::repeat_byte(1),
			topics,
			data,
			block_number: 7,
			transaction_index: 1,
			log_index: 2,
		}
	}

	#[test]
	fn known_signatures_hash_as_expected() {
		assert_eq!(
			format!("{:?}", *TRANSFER_TOPIC),
			"0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
		);
		assert_eq!(selector(TRANSFER_EVENT), [0xdd, 0xf2, 0x52, 0xad]);
	}

	#[test]
	fn decodes_transfer_and_commit() {
		let contract = Address::repeat_byte(0xcc);
		let amount = U256::from(12345);
		let transfer = log(
			vec![*TRANSFER_TOPIC, address_topic(&Address::repeat_byte(2)), address_topic(&contract)],
			amount.to_big_endian().to_vec(),
		);
		let event = decode_log(&transfer).unwrap();
		assert_eq!(event.kind, ChainEventKind::Transfer { amount });
		assert_eq!(event.position, EventPosition::new(7, 1, 2));

		let root = H256::repeat_byte(0x42);
		let calldata = encode_commit(99, root, "aux");
		let commit = log(vec![*BLOCK_CREATED_TOPIC], calldata[4..].to_vec());
		assert_eq!(
			decode_log(&commit).unwrap().kind,
			ChainEventKind::Commit {
				block_number: 99,
				root_hash: root
			}
		);
	}

	#[test]
	fn skips_unknown_and_malformed_logs() {
		assert!(decode_log(&log(vec![H256::repeat_byte(9)], vec![0; 32])).is_none());
		assert!(decode_log(&log(vec![*ADMIN_FEE_CHANGED_TOPIC], vec![0; 5])).is_none());
		assert!(decode_log(&log(Vec::new(), Vec::new())).is_none());
	}

	#[test]
	fn commit_calldata_is_word_aligned() {
		let data = encode_commit(1, H256::zero(), "");
		assert_eq!(data.len(), 4 + 4 * 32);
		let data = encode_commit(1, H256::zero(), "a longer auxiliary string, 40 bytes long");
		assert_eq!((data.len() - 4) % 32, 0);
		assert_eq!(u256_word(&data[4..], 3), Some(U256::from(40)));
	}
}
