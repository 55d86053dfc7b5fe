//! In-process join/part channel.
//!
//! Every `MemoryChannel` connected to the same hub sees the same message history. Listening
//! replays the retained history first, then forwards live messages from a broadcast channel.

use super::types::{Channel, ChannelError, MessageReceiver};
use crate::events::{ChannelMessage, ChannelTopic};
use crate::utils::now_millis;

use ethereum_types::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const BROADCAST_CAPACITY: usize = 1024;

struct Hub {
	history: Mutex<Vec<ChannelMessage>>,
	sender: broadcast::Sender<ChannelMessage>,
}

pub struct MemoryChannel {
	hub: Arc<Hub>,
	forwarders: Mutex<Vec<JoinHandle<()>>>,
	closed: AtomicBool,
}

impl MemoryChannel {
	/// A channel on a fresh hub.
	pub fn new() -> Self {
		let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
		Self::on_hub(Arc::new(Hub {
			history: Mutex::new(Vec::new()),
			sender,
		}))
	}

	fn on_hub(hub: Arc<Hub>) -> Self {
		Self {
			hub,
			forwarders: Mutex::new(Vec::new()),
			closed: AtomicBool::new(false),
		}
	}

	/// Another channel sharing this one's hub, with its own subscriptions.
	pub fn connect(&self) -> Self {
		Self::on_hub(self.hub.clone())
	}

	/// Publish with an explicit timestamp (ms).
	pub fn publish_at(&self, topic: ChannelTopic, addresses: Vec<Address>, timestamp: u64) {
		let message = ChannelMessage {
			topic,
			addresses,
			timestamp,
		};
		// history and broadcast are updated under one lock so a new listener sees each message once
		let mut history = self.hub.history.lock();
		history.push(message.clone());
		let _ = self.hub.sender.send(message);
	}

	pub fn history_len(&self) -> usize {
		self.hub.history.lock().len()
	}
}

impl Default for MemoryChannel {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl Channel for MemoryChannel {
	async fn listen(&self, since_ms: u64) -> Result<MessageReceiver, ChannelError> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(ChannelError::Closed);
		}
		let (tx, rx) = mpsc::unbounded_channel();

		let mut live = {
			let history = self.hub.history.lock();
			for message in history.iter().filter(|m| m.timestamp > since_ms) {
				let _ = tx.send(message.clone());
			}
			self.hub.sender.subscribe()
		};

		let forwarder = tokio::spawn(async move {
			loop {
				match live.recv().await {
					Ok(message) => {
						if tx.send(message).is_err() {
							break;
						}
					}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!("Channel listener lagged, {} messages dropped", skipped);
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
			debug!("Channel forwarder stopped");
		});
		self.forwarders.lock().push(forwarder);
		Ok(rx)
	}

	async fn publish(&self, topic: ChannelTopic, addresses: Vec<Address>) -> Result<(), ChannelError> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(ChannelError::Closed);
		}
		self.publish_at(topic, addresses, now_millis());
		Ok(())
	}

	async fn close(&self) -> Result<(), ChannelError> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		for forwarder in self.forwarders.lock().drain(..) {
			forwarder.abort();
		}
		Ok(())
	}
}
