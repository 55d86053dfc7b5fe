use super::types::ZERO_HASH;

use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;

/// `keccak256(address ‖ uint256(earnings) ‖ uint256(salt))`, tightly packed.
pub fn leaf_hash(address: &Address, earnings: U256, salt: u64) -> H256 {
	let mut packed = [0u8; 84];
	packed[..20].copy_from_slice(address.as_bytes());
	packed[20..52].copy_from_slice(&earnings.to_big_endian());
	packed[52..].copy_from_slice(&U256::from(salt).to_big_endian());
	H256(keccak(&packed[..]).0)
}

/// `keccak256(min(a, b) ‖ max(a, b))`, so a branch does not depend on child order.
pub fn branch_hash(a: &H256, b: &H256) -> H256 {
	let (low, high) = if a <= b { (a, b) } else { (b, a) };
	let mut packed = [0u8; 64];
	packed[..32].copy_from_slice(low.as_bytes());
	packed[32..].copy_from_slice(high.as_bytes());
	H256(keccak(&packed[..]).0)
}

/// Parent of two children where a zero child means "no sibling": the other one carries up.
pub(crate) fn combine(left: &H256, right: &H256) -> H256 {
	match (*left == ZERO_HASH, *right == ZERO_HASH) {
		(true, _) => *right,
		(false, true) => *left,
		(false, false) => branch_hash(left, right),
	}
}

/// Recompute a root from a leaf and its path, as the on-chain verifier does.
pub fn root_from_path(leaf: H256, path: &[H256]) -> H256 {
	path.iter().fold(leaf, |node, sibling| combine(&node, sibling))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn branch_hash_is_commutative() {
		let a = H256::from_low_u64_be(1);
		let b = H256::repeat_byte(0xab);
		assert_eq!(branch_hash(&a, &b), branch_hash(&b, &a));
		assert_ne!(branch_hash(&a, &b), branch_hash(&a, &a));
	}

	#[test]
	fn zero_sibling_carries_node_up() {
		let a = H256::repeat_byte(7);
		assert_eq!(combine(&a, &ZERO_HASH), a);
		assert_eq!(combine(&ZERO_HASH, &a), a);
		assert_eq!(root_from_path(a, &[ZERO_HASH]), a);
	}

	#[test]
	fn leaf_hash_depends_on_every_field() {
		let address = Address::repeat_byte(1);
		let base = leaf_hash(&address, U256::from(10u64), 3);
		assert_ne!(base, leaf_hash(&Address::repeat_byte(2), U256::from(10u64), 3));
		assert_ne!(base, leaf_hash(&address, U256::from(11u64), 3));
		assert_ne!(base, leaf_hash(&address, U256::from(10u64), 4));
		assert_eq!(base, leaf_hash(&address, U256::from(10u64), 3));
	}
}
