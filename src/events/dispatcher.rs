//! Change notifications for ledger observers.
//!
//! Replay produces `LedgerEvent`s describing what actually changed; the watcher hands them to an
//! `EventDispatcher`, which calls every registered handler in registration order.

use super::types::EventError;
use crate::ledger::RevenueSplit;
use crate::utils::{TOKEN_DECIMALS, format_token_amount, to_checksum_address};

use ethereum_types::{Address, U256};
use tracing::{error, info};

/// What changed in a ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
	MembersJoined {
		addresses: Vec<Address>,
		timestamp: u64,
	},
	MembersParted {
		addresses: Vec<Address>,
		timestamp: u64,
	},
	RevenueReceived {
		amount: U256,
		block_number: u64,
		split: RevenueSplit,
	},
	AdminFeeChanged {
		fraction: U256,
	},
	BlockStored {
		block_number: u64,
		timestamp: u64,
	},
	/// Playback reached `block_number`.
	Synced {
		block_number: u64,
		timestamp: u64,
	},
}

/// Trait for handling ledger change notifications.
#[async_trait::async_trait]
pub trait LedgerEventHandler: Send + Sync {
	async fn handle(&mut self, event: &LedgerEvent) -> Result<(), EventError>;

	/// Get the name of this handler for logging and diagnostics.
	fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
#[derive(Default)]
pub struct EventDispatcher {
	handlers: Vec<Box<dyn LedgerEventHandler>>,
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Handlers are called in the order they are registered.
	pub fn register_handler(&mut self, handler: Box<dyn LedgerEventHandler>) {
		self.handlers.push(handler);
	}

	pub fn handler_count(&self) -> usize {
		self.handlers.len()
	}

	/// Errors from handlers are logged and do not stop the remaining handlers.
	pub async fn dispatch(&mut self, event: &LedgerEvent) {
		for handler in &mut self.handlers {
			if let Err(e) = handler.handle(event).await {
				error!("Handler {} failed to process event: {}", handler.name(), e);
			}
		}
	}

	pub async fn dispatch_all(&mut self, events: &[LedgerEvent]) {
		for event in events {
			self.dispatch(event).await;
		}
	}
}

/// Logs every change under the unit's name.
pub struct LoggingEventHandler {
	unit: String,
}

impl LoggingEventHandler {
	pub fn new(unit: impl Into<String>) -> Self {
		Self { unit: unit.into() }
	}
}

#[async_trait::async_trait]
impl LedgerEventHandler for LoggingEventHandler {
	async fn handle(&mut self, event: &LedgerEvent) -> Result<(), EventError> {
		match event {
			LedgerEvent::MembersJoined { addresses, .. } => {
				for address in addresses {
					info!("[{}] Member joined: {}", self.unit, to_checksum_address(address));
				}
			}
			LedgerEvent::MembersParted { addresses, .. } => {
				for address in addresses {
					info!("[{}] Member parted: {}", self.unit, to_checksum_address(address));
				}
			}
			LedgerEvent::RevenueReceived {
				amount,
				block_number,
				split,
			} => {
				info!(
					"[{}] Revenue {} at block {} shared by {} members ({} each)",
					self.unit,
					format_token_amount(*amount, TOKEN_DECIMALS),
					block_number,
					split.member_count,
					format_token_amount(split.member_share, TOKEN_DECIMALS)
				);
			}
			LedgerEvent::AdminFeeChanged { fraction } => {
				info!(
					"[{}] Admin fee set to {}",
					self.unit,
					format_token_amount(*fraction, TOKEN_DECIMALS)
				);
			}
			LedgerEvent::BlockStored { block_number, .. } => {
				info!("[{}] Block {} stored", self.unit, block_number);
			}
			LedgerEvent::Synced { block_number, .. } => {
				info!("[{}] Synced to block {}", self.unit, block_number);
			}
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"LoggingEventHandler"
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Failing;

	#[async_trait::async_trait]
	impl LedgerEventHandler for Failing {
		async fn handle(&mut self, _event: &LedgerEvent) -> Result<(), EventError> {
			Err(EventError::HandlerError("boom".to_string()))
		}

		fn name(&self) -> &'static str {
			"Failing"
		}
	}

	struct Counting(Arc<AtomicUsize>);

	#[async_trait::async_trait]
	impl LedgerEventHandler for Counting {
		async fn handle(&mut self, _event: &LedgerEvent) -> Result<(), EventError> {
			self.0.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}

		fn name(&self) -> &'static str {
			"Counting"
		}
	}

	#[tokio::test]
	async fn failing_handler_does_not_stop_others() {
		let count = Arc::new(AtomicUsize::new(0));
		let mut dispatcher = EventDispatcher::new();
		dispatcher.register_handler(Box::new(Failing));
		dispatcher.register_handler(Box::new(Counting(count.clone())));
		dispatcher.register_handler(Box::new(LoggingEventHandler::new("test")));

		dispatcher
			.dispatch_all(&[
				LedgerEvent::AdminFeeChanged {
					fraction: U256::zero(),
				},
				LedgerEvent::Synced {
					block_number: 1,
					timestamp: 0,
				},
			])
			.await;
		assert_eq!(count.load(Ordering::SeqCst), 2);
		assert_eq!(dispatcher.handler_count(), 3);
	}
}
