//! Tree construction off the caller's task.
//!
//! Small trees are built inline, yielding between rows. Member sets at or above the worker
//! threshold are handed to tokio's blocking pool: the worker gets its own copy of the leaves and
//! sends back the bincode-encoded tree, so nothing is shared with the caller while it runs.

use super::tree::MerkleTree;
use super::types::MerkleError;

use ethereum_types::{Address, U256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Semaphore;
use tracing::debug;

pub const DEFAULT_WORKER_THRESHOLD: usize = 1000;
pub const DEFAULT_MAX_WORKERS: usize = 2;

/// Shared, cloneable handle for building trees.
#[derive(Clone)]
pub struct TreeBuilder {
	permits: Arc<Semaphore>,
	worker_threshold: usize,
	builds_started: Arc<AtomicU64>,
}

impl TreeBuilder {
	/// # Arguments
	/// * `max_workers` - Upper bound on concurrent worker builds.
	/// * `worker_threshold` - Member count from which builds go to a worker.
	pub fn new(max_workers: usize, worker_threshold: usize) -> Self {
		Self {
			permits: Arc::new(Semaphore::new(max_workers.max(1))),
			worker_threshold,
			builds_started: Arc::new(AtomicU64::new(0)),
		}
	}

	/// Number of builds requested through this builder or its clones.
	pub fn builds_started(&self) -> u64 {
		self.builds_started.load(Ordering::Relaxed)
	}

	pub async fn build(
		&self,
		leaves: Vec<(Address, U256)>,
		salt: u64,
	) -> Result<MerkleTree, MerkleError> {
		self.builds_started.fetch_add(1, Ordering::Relaxed);
		if leaves.is_empty() {
			return Err(MerkleError::EmptyTree);
		}
		if leaves.len() < self.worker_threshold {
			return MerkleTree::build_yielding(&leaves, salt).await;
		}
		self.build_on_worker(leaves, salt).await
	}

	async fn build_on_worker(
		&self,
		leaves: Vec<(Address, U256)>,
		salt: u64,
	) -> Result<MerkleTree, MerkleError> {
		let _permit = self
			.permits
			.acquire()
			.await
			.map_err(|e| MerkleError::WorkerCrashed(e.to_string()))?;

		debug!("Building tree for {} members on worker (salt {})", leaves.len(), salt);
		let worker = tokio::task::spawn_blocking(move || {
			MerkleTree::build(&leaves, salt).and_then(|tree| tree.to_bytes())
		});

		let bytes = match worker.await {
			Ok(result) => result?,
			Err(e) => return Err(MerkleError::WorkerCrashed(e.to_string())),
		};
		MerkleTree::from_bytes(&bytes)
	}
}

impl Default for TreeBuilder {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_WORKERS, DEFAULT_WORKER_THRESHOLD)
	}
}
