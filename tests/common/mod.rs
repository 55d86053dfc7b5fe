#![allow(dead_code)]

use revenue_ledger::chain::abi::{
	ADMIN_FEE_CHANGED_TOPIC, BLOCK_CREATED_TOPIC, TRANSFER_TOPIC, address_topic,
};
use revenue_ledger::chain::{Chain, ChainError, CommitReceipt, ContractParams, LogFilter, RawLog};
use revenue_ledger::channel::MemoryChannel;
use revenue_ledger::merkle::TreeBuilder;
use revenue_ledger::store::MemoryBlockStore;
use revenue_ledger::watcher::{Watcher, WatcherConfig};

use ethereum_types::{Address, H256, U256};
use parking_lot::Mutex;
use std::sync::Arc;

pub const BLOCK_TIME_SECONDS: u64 = 10;

pub fn contract() -> Address {
	Address::repeat_byte(0xcc)
}

pub fn token() -> Address {
	Address::repeat_byte(0x70)
}

pub fn admin() -> Address {
	Address::repeat_byte(0xad)
}

pub fn member(i: u64) -> Address {
	Address::from_low_u64_be(i)
}

/// Timestamp of `block` in milliseconds, as the ledger sees it.
pub fn block_ms(block: u64) -> u64 {
	block * BLOCK_TIME_SECONDS * 1000
}

struct MockState {
	head: u64,
	code: Vec<u8>,
	params: ContractParams,
	logs: Vec<RawLog>,
	commits: Vec<(u64, H256)>,
	fail_commits: bool,
}

/// Chain whose blocks are `BLOCK_TIME_SECONDS` apart and whose logs are pushed by the test.
pub struct MockChain {
	state: Mutex<MockState>,
}

impl MockChain {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(MockState {
				head: 1,
				code: vec![0x60, 0x80],
				params: ContractParams {
					token_address: token(),
					admin_address: admin(),
					block_freeze_seconds: 0,
					admin_fee_fraction: U256::zero(),
				},
				logs: Vec::new(),
				commits: Vec::new(),
				fail_commits: false,
			}),
		}
	}

	/// A chain with nothing deployed at the contract address.
	pub fn without_contract() -> Self {
		let chain = Self::new();
		chain.state.lock().code.clear();
		chain
	}

	pub fn set_block(&self, block: u64) {
		self.state.lock().head = block;
	}

	pub fn head(&self) -> u64 {
		self.state.lock().head
	}

	pub fn set_fail_commits(&self, fail: bool) {
		self.state.lock().fail_commits = fail;
	}

	pub fn commits(&self) -> Vec<(u64, H256)> {
		self.state.lock().commits.clone()
	}

	fn push_log(state: &mut MockState, address: Address, topics: Vec<H256>, data: Vec<u8>, block: u64) {
		let transaction_index = state.logs.iter().filter(|l| l.block_number == block).count() as u64;
		state.logs.push(RawLog {
			address,
			topics,
			data,
			block_number: block,
			transaction_index,
			log_index: 0,
		});
		state.head = state.head.max(block);
	}

	pub fn push_transfer(&self, block: u64, amount: u64) {
		let mut state = self.state.lock();
		Self::push_log(
			&mut state,
			token(),
			vec![
				*TRANSFER_TOPIC,
				address_topic(&Address::repeat_byte(0x55)),
				address_topic(&contract()),
			],
			U256::from(amount).to_big_endian().to_vec(),
			block,
		);
	}

	pub fn push_fee(&self, block: u64, fraction: U256) {
		let mut state = self.state.lock();
		state.params.admin_fee_fraction = fraction;
		Self::push_log(
			&mut state,
			contract(),
			vec![*ADMIN_FEE_CHANGED_TOPIC],
			fraction.to_big_endian().to_vec(),
			block,
		);
	}

	/// A `BlockCreated` log mined in `mined_in` for `committed_block`.
	pub fn push_commit(&self, mined_in: u64, committed_block: u64, root_hash: H256) {
		let mut state = self.state.lock();
		let data = commit_log_data(committed_block, root_hash);
		Self::push_log(&mut state, contract(), vec![*BLOCK_CREATED_TOPIC], data, mined_in);
	}
}

fn commit_log_data(committed_block: u64, root_hash: H256) -> Vec<u8> {
	let mut data = Vec::with_capacity(128);
	data.extend_from_slice(&U256::from(committed_block).to_big_endian());
	data.extend_from_slice(root_hash.as_bytes());
	data.extend_from_slice(&U256::from(96).to_big_endian());
	data.extend_from_slice(&U256::zero().to_big_endian());
	data
}

fn topics_match(filter: &LogFilter, log: &RawLog) -> bool {
	filter
		.topics
		.iter()
		.enumerate()
		.all(|(i, wanted)| match wanted {
			Some(topic) => log.topics.get(i) == Some(topic),
			None => true,
		})
}

#[async_trait::async_trait]
impl Chain for MockChain {
	async fn get_code(&self, _address: Address) -> Result<Vec<u8>, ChainError> {
		Ok(self.state.lock().code.clone())
	}

	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ChainError> {
		Ok(self
			.state
			.lock()
			.logs
			.iter()
			.filter(|log| {
				log.address == filter.address
					&& log.block_number >= filter.from_block
					&& log.block_number <= filter.to_block
					&& topics_match(filter, log)
			})
			.cloned()
			.collect())
	}

	async fn get_block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
		Ok(block_number * BLOCK_TIME_SECONDS)
	}

	async fn block_number(&self) -> Result<u64, ChainError> {
		Ok(self.state.lock().head)
	}

	async fn contract_params(&self, _contract: Address) -> Result<ContractParams, ChainError> {
		Ok(self.state.lock().params.clone())
	}

	async fn send_commit(
		&self,
		contract: Address,
		block_number: u64,
		root_hash: H256,
		_aux: &str,
	) -> Result<CommitReceipt, ChainError> {
		let mut state = self.state.lock();
		let mined_in = state.head + 1;
		let transaction_hash = H256::from_low_u64_be(mined_in);
		if state.fail_commits {
			return Err(ChainError::TransactionFailed(transaction_hash));
		}
		let data = commit_log_data(block_number, root_hash);
		Self::push_log(&mut state, contract, vec![*BLOCK_CREATED_TOPIC], data, mined_in);
		state.commits.push((block_number, root_hash));
		Ok(CommitReceipt {
			transaction_hash,
			block_number: mined_in,
		})
	}
}

pub struct Harness {
	pub chain: Arc<MockChain>,
	/// Publishes into the same hub the watcher listens on.
	pub channel: MemoryChannel,
	pub store: Arc<MemoryBlockStore>,
}

impl Harness {
	pub fn new() -> Self {
		Self::with_chain(MockChain::new())
	}

	pub fn with_chain(chain: MockChain) -> Self {
		Self {
			chain: Arc::new(chain),
			channel: MemoryChannel::new(),
			store: Arc::new(MemoryBlockStore::new()),
		}
	}

	pub fn join(&self, addresses: &[Address], timestamp: u64) {
		self.channel.publish_at(
			revenue_ledger::events::ChannelTopic::Join,
			addresses.to_vec(),
			timestamp,
		);
	}

	pub fn part(&self, addresses: &[Address], timestamp: u64) {
		self.channel.publish_at(
			revenue_ledger::events::ChannelTopic::Part,
			addresses.to_vec(),
			timestamp,
		);
	}

	pub fn watcher(&self, name: &str) -> Watcher {
		Watcher::new(
			WatcherConfig {
				name: name.to_string(),
				contract_address: contract(),
				start_block: 1,
				tree_cache_size: 2,
			},
			self.chain.clone(),
			Arc::new(self.channel.connect()),
			self.store.clone(),
			TreeBuilder::default(),
		)
	}
}
