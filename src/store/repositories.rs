use super::types::{StoreError, WatcherStateRecord};
use crate::ledger::Snapshot;

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STATE_FILENAME: &str = "state.json";
const BLOCK_PREFIX: &str = "block_";
const BLOCK_SUFFIX: &str = ".json";

/// Repository for snapshots and resumption metadata
#[async_trait::async_trait]
pub trait BlockStore: Send + Sync {
	async fn load_state(&self) -> Result<Option<WatcherStateRecord>, StoreError>;
	async fn save_state(&self, state: &WatcherStateRecord) -> Result<(), StoreError>;
	async fn block_exists(&self, block_number: u64) -> Result<bool, StoreError>;
	async fn load_block(&self, block_number: u64) -> Result<Snapshot, StoreError>;
	async fn save_block(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
	/// The newest `max_latest` stored block numbers, newest first.
	async fn list_block_numbers(&self, max_latest: usize) -> Result<Vec<u64>, StoreError>;
}

/// File-based implementation of BlockStore
pub struct FileBlockStore {
	data_dir: PathBuf,
}

impl FileBlockStore {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn get_block_filename(&self, block_number: u64) -> PathBuf {
		self.data_dir
			.join(format!("{}{}{}", BLOCK_PREFIX, block_number, BLOCK_SUFFIX))
	}

	async fn write_json<T: serde::Serialize>(
		&self,
		path: &Path,
		value: &T,
	) -> Result<(), StoreError> {
		tokio::fs::create_dir_all(&self.data_dir).await?;
		let content = serde_json::to_string_pretty(value)?;
		tokio::fs::write(path, content).await?;
		Ok(())
	}
}

#[async_trait::async_trait]
impl BlockStore for FileBlockStore {
	async fn load_state(&self) -> Result<Option<WatcherStateRecord>, StoreError> {
		let filename = self.data_dir.join(STATE_FILENAME);
		if !tokio::fs::try_exists(&filename).await? {
			return Ok(None);
		}
		let content = tokio::fs::read_to_string(&filename).await?;
		let state: WatcherStateRecord = serde_json::from_str(&content)?;
		info!(
			"Loaded state from {:?} at block {} (saved {})",
			filename, state.last_block, state.saved_at
		);
		Ok(Some(state))
	}

	async fn save_state(&self, state: &WatcherStateRecord) -> Result<(), StoreError> {
		let filename = self.data_dir.join(STATE_FILENAME);
		let mut record = state.clone();
		record.saved_at = chrono::Utc::now().to_rfc3339();
		self.write_json(&filename, &record).await?;
		debug!("Saved state to {:?} at block {}", filename, record.last_block);
		Ok(())
	}

	async fn block_exists(&self, block_number: u64) -> Result<bool, StoreError> {
		Ok(tokio::fs::try_exists(self.get_block_filename(block_number)).await?)
	}

	async fn load_block(&self, block_number: u64) -> Result<Snapshot, StoreError> {
		let filename = self.get_block_filename(block_number);
		let content = match tokio::fs::read_to_string(&filename).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StoreError::NotFound(block_number));
			}
			Err(e) => return Err(e.into()),
		};
		Ok(serde_json::from_str(&content)?)
	}

	async fn save_block(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
		let filename = self.get_block_filename(snapshot.block_number);
		self.write_json(&filename, snapshot).await?;
		info!(
			"Snapshot of {} members saved to {:?}",
			snapshot.members.len(),
			filename
		);
		Ok(())
	}

	async fn list_block_numbers(&self, max_latest: usize) -> Result<Vec<u64>, StoreError> {
		if !tokio::fs::try_exists(&self.data_dir).await? {
			return Ok(Vec::new());
		}
		let mut entries = tokio::fs::read_dir(&self.data_dir).await?;

		let mut blocks = Vec::new();
		while let Some(entry) = entries.next_entry().await? {
			let path = entry.path();
			let block_number = path
				.file_name()
				.and_then(|f| f.to_str())
				.and_then(|f| f.strip_prefix(BLOCK_PREFIX))
				.and_then(|s| s.strip_suffix(BLOCK_SUFFIX))
				.and_then(|s| s.parse::<u64>().ok());
			if let Some(block_number) = block_number {
				blocks.push(block_number);
			}
		}

		blocks.sort_by_key(|block| std::cmp::Reverse(*block));
		blocks.truncate(max_latest);
		Ok(blocks)
	}
}

#[derive(Default)]
struct MemoryContents {
	state: Option<WatcherStateRecord>,
	blocks: BTreeMap<u64, Snapshot>,
}

/// In-process implementation of BlockStore
#[derive(Default)]
pub struct MemoryBlockStore {
	contents: Mutex<MemoryContents>,
}

impl MemoryBlockStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl BlockStore for MemoryBlockStore {
	async fn load_state(&self) -> Result<Option<WatcherStateRecord>, StoreError> {
		Ok(self.contents.lock().state.clone())
	}

	async fn save_state(&self, state: &WatcherStateRecord) -> Result<(), StoreError> {
		let mut record = state.clone();
		record.saved_at = chrono::Utc::now().to_rfc3339();
		self.contents.lock().state = Some(record);
		Ok(())
	}

	async fn block_exists(&self, block_number: u64) -> Result<bool, StoreError> {
		Ok(self.contents.lock().blocks.contains_key(&block_number))
	}

	async fn load_block(&self, block_number: u64) -> Result<Snapshot, StoreError> {
		self.contents
			.lock()
			.blocks
			.get(&block_number)
			.cloned()
			.ok_or(StoreError::NotFound(block_number))
	}

	async fn save_block(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
		self.contents
			.lock()
			.blocks
			.insert(snapshot.block_number, snapshot.clone());
		Ok(())
	}

	async fn list_block_numbers(&self, max_latest: usize) -> Result<Vec<u64>, StoreError> {
		Ok(self
			.contents
			.lock()
			.blocks
			.keys()
			.rev()
			.take(max_latest)
			.copied()
			.collect())
	}
}
