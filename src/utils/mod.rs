//!
//! Utility module for the revenue ledger.
//!
//! Re-exports formatting helpers and address utilities used throughout the codebase.
/// Utility functions for formatting and display
pub mod index;

pub use index::{TOKEN_DECIMALS, format_token_amount, now_millis, parse_address, to_checksum_address};
