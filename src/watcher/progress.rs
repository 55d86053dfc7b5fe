//! Replay statistics for one playback pass.

use crate::events::LedgerEvent;
use crate::utils::{TOKEN_DECIMALS, format_token_amount};

use ethereum_types::U256;
use tracing::info;

/// Counts what a playback pass applied.
#[derive(Debug, Clone)]
pub struct SyncProgress {
	from_block: u64,
	transfers: usize,
	commits: usize,
	fee_changes: usize,
	joins: usize,
	parts: usize,
	revenue: U256,
}

impl SyncProgress {
	pub fn new(from_block: u64) -> Self {
		Self {
			from_block,
			transfers: 0,
			commits: 0,
			fee_changes: 0,
			joins: 0,
			parts: 0,
			revenue: U256::zero(),
		}
	}

	pub fn record(&mut self, event: &LedgerEvent) {
		match event {
			LedgerEvent::RevenueReceived { amount, .. } => {
				self.transfers += 1;
				self.revenue = self.revenue.saturating_add(*amount);
			}
			LedgerEvent::BlockStored { .. } => self.commits += 1,
			LedgerEvent::AdminFeeChanged { .. } => self.fee_changes += 1,
			LedgerEvent::MembersJoined { addresses, .. } => self.joins += addresses.len(),
			LedgerEvent::MembersParted { addresses, .. } => self.parts += addresses.len(),
			LedgerEvent::Synced { .. } => {}
		}
	}

	pub fn record_all(&mut self, events: &[LedgerEvent]) {
		for event in events {
			self.record(event);
		}
	}

	pub fn finish(&self, to_block: u64) -> SyncReport {
		let report = SyncReport {
			from_block: self.from_block,
			to_block,
			transfers: self.transfers,
			commits: self.commits,
			fee_changes: self.fee_changes,
			joins: self.joins,
			parts: self.parts,
			revenue: self.revenue,
		};
		if report.has_changes() {
			info!("{}", report.summary());
		}
		report
	}
}

/// Statistics about one playback pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
	pub from_block: u64,
	pub to_block: u64,
	pub transfers: usize,
	pub commits: usize,
	pub fee_changes: usize,
	pub joins: usize,
	pub parts: usize,
	pub revenue: U256,
}

impl SyncReport {
	pub fn has_revenue(&self) -> bool {
		self.transfers > 0
	}

	pub fn has_changes(&self) -> bool {
		self.transfers + self.commits + self.fee_changes + self.joins + self.parts > 0
	}

	pub fn summary(&self) -> String {
		format!(
			"Blocks {} to {}: {} transfers ({} tokens), {} commits, {} fee changes, {} joins, {} parts",
			self.from_block,
			self.to_block,
			self.transfers,
			format_token_amount(self.revenue, TOKEN_DECIMALS),
			self.commits,
			self.fee_changes,
			self.joins,
			self.parts
		)
	}
}
