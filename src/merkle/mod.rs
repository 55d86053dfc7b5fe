//! Merkle commitments over ledger member balances.
//!
//! Leaves and branches are hashed exactly the way the on-chain verifier recomputes them, so a
//! path produced here lets a member prove their balance in a committed block.
//!
//! - `hash`: leaf and branch hashing primitives.
//! - `tree`: the flat binary tree and its inclusion paths.
//! - `worker`: builds trees off the caller's task, on the blocking pool for large member sets.
//! - `accumulator`: lazily rebuilt, cached tree for a changing `(members, salt)` source.

pub mod accumulator;
pub mod hash;
pub mod tree;
pub mod types;
pub mod worker;

pub use accumulator::MerkleAccumulator;
pub use hash::{branch_hash, leaf_hash, root_from_path};
pub use tree::MerkleTree;
pub use types::*;
pub use worker::TreeBuilder;
