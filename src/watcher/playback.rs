use super::message_cache::MessageCache;
use super::progress::{SyncProgress, SyncReport};
use super::types::WatcherError;
use crate::chain::ChainReader;
use crate::events::{LedgerEvent, replay_all};
use crate::ledger::LedgerState;

use parking_lot::Mutex;
use tracing::debug;

/// Result of one playback pass.
#[derive(Debug, Clone)]
pub struct Playback {
	pub changes: Vec<LedgerEvent>,
	pub report: SyncReport,
}

/// Replay chain events and cached channel messages onto `ledger` up to and including `to_block`.
///
/// Does nothing when the ledger is already at or past `to_block`. On success the ledger's
/// position is `to_block` at that block's timestamp. Fails if the message cache has already
/// dropped messages the range needs.
pub async fn playback_until_block(
	reader: &ChainReader,
	cache: &Mutex<MessageCache>,
	ledger: &mut LedgerState,
	to_block: u64,
) -> Result<Option<Playback>, WatcherError> {
	let from_block = ledger.current_block() + 1;
	if to_block < from_block {
		return Ok(None);
	}
	let from_timestamp = ledger.current_timestamp();
	cache.lock().ensure_available(from_timestamp)?;

	let events = reader.fetch_events(from_block, to_block).await?;
	let to_timestamp = reader.block_timestamp(to_block).await?;
	let messages = cache.lock().range(from_timestamp, to_timestamp)?;
	debug!(
		"Playing back blocks {}..={}: {} chain events, {} messages",
		from_block,
		to_block,
		events.len(),
		messages.len()
	);

	let mut progress = SyncProgress::new(from_block);
	let changes = replay_all(ledger, events, messages).await?;
	progress.record_all(&changes);
	ledger.set_position(to_block, to_timestamp);

	Ok(Some(Playback {
		changes,
		report: progress.finish(to_block),
	}))
}
