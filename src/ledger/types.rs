use crate::merkle::MerkleError;
use crate::store::StoreError;

use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Decimal places of the fixed-point admin fee fraction.
pub const FEE_DECIMALS: usize = 18;

/// `1.0` as a scaled fee fraction.
pub fn fee_scale() -> U256 {
	U256::exp10(FEE_DECIMALS)
}

/// One participant of the revenue split. Never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
	pub address: Address,
	pub name: Option<String>,
	pub earnings: U256,
	pub active: bool,
}

impl Member {
	pub fn new(address: Address, name: Option<String>) -> Self {
		Self {
			address,
			name,
			earnings: U256::zero(),
			active: true,
		}
	}
}

/// Immutable copy of the ledger at a committed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
	pub block_number: u64,
	pub members: Arc<Vec<Member>>,
	/// Chain time of the block, in milliseconds.
	pub timestamp: u64,
	/// Local wall-clock time the snapshot was taken, in milliseconds.
	pub store_timestamp: u64,
	pub total_earnings: U256,
	pub owner: Address,
	pub admin_fee_fraction: U256,
	/// Members reflect exactly the end of `block_number`. A snapshot recorded while replaying a
	/// commit mined in a later block also holds that later revenue, so it cannot seed a resume.
	#[serde(default)]
	pub exact: bool,
}

impl Snapshot {
	pub fn member(&self, address: &Address) -> Option<&Member> {
		self.members.iter().find(|m| m.address == *address)
	}
}

/// Admin fee as given by a caller: a plain fraction, or already scaled by 10^18.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeeFraction {
	Plain(f64),
	Scaled(U256),
}

impl FeeFraction {
	/// `"0.25"` is read as a plain fraction, `"250000000000000000"` as a scaled one.
	pub fn parse(text: &str) -> Result<Self, LedgerError> {
		let text = text.trim();
		if text.contains('.') {
			parse_decimal_fraction(text)
				.map(FeeFraction::Scaled)
				.ok_or_else(|| LedgerError::InvalidAdminFee(text.to_string()))
		} else {
			U256::from_dec_str(text)
				.map(FeeFraction::Scaled)
				.map_err(|_| LedgerError::InvalidAdminFee(text.to_string()))
		}
	}

	pub fn to_scaled(&self) -> Result<U256, LedgerError> {
		let scaled = match self {
			FeeFraction::Plain(value) => {
				if !value.is_finite() || *value < 0.0 || *value > 1.0 {
					return Err(LedgerError::InvalidAdminFee(value.to_string()));
				}
				// f64 Display never uses exponent notation; digits past 10^-18 are dropped
				let text = value.to_string();
				let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
				let fraction = &fraction[..fraction.len().min(FEE_DECIMALS)];
				parse_decimal_fraction(&format!("{}.{}", whole, fraction))
					.ok_or_else(|| LedgerError::InvalidAdminFee(value.to_string()))?
			}
			FeeFraction::Scaled(value) => *value,
		};
		if scaled > fee_scale() {
			return Err(LedgerError::InvalidAdminFee(scaled.to_string()));
		}
		Ok(scaled)
	}
}

impl From<f64> for FeeFraction {
	fn from(value: f64) -> Self {
		FeeFraction::Plain(value)
	}
}

impl From<U256> for FeeFraction {
	fn from(value: U256) -> Self {
		FeeFraction::Scaled(value)
	}
}

/// Exact decimal-to-fixed-point conversion, at most 18 fractional digits.
fn parse_decimal_fraction(text: &str) -> Option<U256> {
	let (whole, fraction) = text.split_once('.')?;
	if fraction.len() > FEE_DECIMALS
		|| !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())
		|| (whole.is_empty() && fraction.is_empty())
	{
		return None;
	}
	let whole = if whole.is_empty() {
		U256::zero()
	} else {
		U256::from_dec_str(whole).ok()?
	};
	let padded = format!("{:0<width$}", fraction, width = FEE_DECIMALS);
	let fraction = U256::from_dec_str(&padded).ok()?;
	whole.checked_mul(fee_scale())?.checked_add(fraction)
}

/// How one `add_revenue` call was divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevenueSplit {
	pub admin_share: U256,
	pub member_share: U256,
	pub member_count: usize,
	/// Integer-division leftover that nobody is credited with.
	pub remainder: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemberCount {
	pub active: usize,
	pub inactive: usize,
	pub total: usize,
}

/// Construction parameters that come from the contract rather than from history.
#[derive(Debug, Clone)]
pub struct LedgerOptions {
	pub admin_address: Address,
	pub block_freeze_seconds: u64,
	pub tree_cache_size: usize,
}

/// Error types for ledger state operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	#[error("Invalid address: {0}")]
	InvalidAddress(String),

	#[error("Admin fee fraction must be between 0 and 1, got {0}")]
	InvalidAdminFee(String),

	#[error("Invalid block number: {0}")]
	InvalidBlockNumber(u64),

	#[error("Block {block_number} already stored (latest stored is {latest})")]
	BlockAlreadyStored { block_number: u64, latest: u64 },

	#[error("Member {address:?} not found in block {block_number}")]
	MemberNotFound { address: Address, block_number: u64 },

	#[error("Block {0} not found")]
	BlockNotFound(u64),

	#[error("Earnings overflow")]
	Overflow,

	#[error("Merkle error: {0}")]
	MerkleError(#[from] MerkleError),

	#[error("Store error: {0}")]
	StoreError(#[from] StoreError),
}
