use ethereum_types::{Address, H256};

/// Placeholder for missing leaves and siblings. The verifier skips it.
pub const ZERO_HASH: H256 = H256([0u8; 32]);

/// Error types for tree construction and proofs
#[derive(Debug, thiserror::Error)]
pub enum MerkleError {
	#[error("Cannot build tree with zero members")]
	EmptyTree,

	#[error("Member not found: {0:?}")]
	MemberNotFound(Address),

	#[error("Tree worker exited: {0}")]
	WorkerCrashed(String),

	#[error("Tree serialization error: {0}")]
	SerializationError(#[from] bincode::Error),
}
