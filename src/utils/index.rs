use ethereum_types::{Address, U256};
use keccak_hash::keccak;

/// Number of decimal places of the revenue token.
pub const TOKEN_DECIMALS: u32 = 18;

pub fn format_token_amount(amount: U256, decimals: u32) -> String {
	if decimals == 0 {
		return amount.to_string();
	}
	let scale = U256::exp10(decimals as usize);
	format!(
		"{}.{:0>width$}",
		amount / scale,
		(amount % scale).to_string(),
		width = decimals as usize
	)
}

/// Render an address with EIP-55 mixed-case checksum.
pub fn to_checksum_address(address: &Address) -> String {
	let lower = hex::encode(address.as_bytes());
	let hash = keccak(lower.as_bytes());
	let mut out = String::with_capacity(42);
	out.push_str("0x");
	for (i, c) in lower.chars().enumerate() {
		let byte = hash.0[i / 2];
		let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
		if c.is_ascii_alphabetic() && nibble >= 8 {
			out.push(c.to_ascii_uppercase());
		} else {
			out.push(c);
		}
	}
	out
}

/// Parse a `0x`-prefixed 20-byte hex address in any letter case.
pub fn parse_address(text: &str) -> Option<Address> {
	let digits = text.trim().strip_prefix("0x").or_else(|| text.trim().strip_prefix("0X"))?;
	if digits.len() != 40 {
		return None;
	}
	let bytes = hex::decode(digits).ok()?;
	Some(Address::from_slice(&bytes))
}

/// Wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
	chrono::Utc::now().timestamp_millis().max(0) as u64
}
