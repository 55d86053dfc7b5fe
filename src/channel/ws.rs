//! WebSocket client for the join/part channel.
//!
//! Protocol (JSON text frames):
//! - `{"type": "subscribe", "since": <ms>}` asks for retained history newer than `since`, then live
//!   messages.
//! - `{"type": "publish", "topic": "join" | "part", "addresses": [...]}` publishes.
//! - Notifications arrive as `{"topic": ..., "addresses": [...], "timestamp": <ms>}`.

use super::types::{Channel, ChannelError, MessageReceiver};
use crate::events::{ChannelMessage, ChannelTopic};
use crate::utils::{parse_address, to_checksum_address};

use ethereum_types::Address;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

#[derive(Deserialize)]
struct Notification {
	topic: String,
	addresses: Vec<String>,
	timestamp: u64,
}

type ListenerSlot = Arc<Mutex<Option<mpsc::UnboundedSender<ChannelMessage>>>>;

struct Connection {
	outgoing: mpsc::UnboundedSender<Message>,
	writer: JoinHandle<()>,
	reader: JoinHandle<()>,
}

pub struct WsChannel {
	/// The WebSocket URL of the channel server.
	ws_url: String,
	listener: ListenerSlot,
	connection: Mutex<Option<Connection>>,
}

impl WsChannel {
	pub fn new(ws_url: String) -> Self {
		Self {
			ws_url,
			listener: Arc::new(Mutex::new(None)),
			connection: Mutex::new(None),
		}
	}

	/// Outgoing sender of the current connection, connecting first if needed.
	async fn outgoing(&self) -> Result<mpsc::UnboundedSender<Message>, ChannelError> {
		let existing = self.connection.lock().as_ref().map(|c| c.outgoing.clone());
		if let Some(outgoing) = existing {
			return Ok(outgoing);
		}

		debug!("Attempting WebSocket connection to: {}", self.ws_url);
		let (ws_stream, response) = connect_async(self.ws_url.as_str()).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();
		let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();

		let writer = tokio::spawn(async move {
			while let Some(message) = outgoing_rx.recv().await {
				if let Err(e) = ws_sender.send(message).await {
					error!("Failed to send channel message: {}", e);
					break;
				}
			}
			let _ = ws_sender.send(Message::Close(None)).await;
		});

		let listener = self.listener.clone();
		let reader = tokio::spawn(async move {
			while let Some(frame) = ws_receiver.next().await {
				match frame {
					Ok(Message::Text(text)) => {
						let tx = listener.lock().clone();
						if let (Some(message), Some(tx)) = (parse_notification(&text), tx) {
							let _ = tx.send(message);
						}
					}
					Ok(Message::Close(_)) => {
						info!("Channel server closed the connection");
						break;
					}
					Ok(_) => {}
					Err(e) => {
						error!("Channel connection error: {}", e);
						break;
					}
				}
			}
			// dropping the sender ends the listener's stream
			listener.lock().take();
		});

		let mut slot = self.connection.lock();
		if let Some(existing) = slot.as_ref() {
			// lost a connect race; keep the first connection
			writer.abort();
			reader.abort();
			return Ok(existing.outgoing.clone());
		}
		*slot = Some(Connection {
			outgoing: outgoing.clone(),
			writer,
			reader,
		});
		Ok(outgoing)
	}
}

fn parse_notification(text: &str) -> Option<ChannelMessage> {
	let notification: Notification = match serde_json::from_str(text) {
		Ok(notification) => notification,
		Err(e) => {
			warn!("Ignoring unreadable channel payload: {}", e);
			return None;
		}
	};
	let topic = match notification.topic.as_str() {
		"join" => ChannelTopic::Join,
		"part" => ChannelTopic::Part,
		other => {
			warn!("Ignoring channel message with unknown topic {}", other);
			return None;
		}
	};
	let addresses = notification
		.addresses
		.iter()
		.filter_map(|text| {
			let address = parse_address(text);
			if address.is_none() {
				warn!("Ignoring invalid address {} in {} message", text, topic);
			}
			address
		})
		.collect();
	Some(ChannelMessage {
		topic,
		addresses,
		timestamp: notification.timestamp,
	})
}

#[async_trait::async_trait]
impl Channel for WsChannel {
	async fn listen(&self, since_ms: u64) -> Result<MessageReceiver, ChannelError> {
		let outgoing = self.outgoing().await?;
		let (tx, rx) = mpsc::unbounded_channel();
		*self.listener.lock() = Some(tx);

		let subscribe = json!({ "type": "subscribe", "since": since_ms });
		outgoing
			.send(Message::Text(subscribe.to_string()))
			.map_err(|_| ChannelError::Closed)?;
		info!("Listening to {} since {}", self.ws_url, since_ms);
		Ok(rx)
	}

	async fn publish(&self, topic: ChannelTopic, addresses: Vec<Address>) -> Result<(), ChannelError> {
		let outgoing = self.outgoing().await?;
		let addresses: Vec<String> = addresses.iter().map(to_checksum_address).collect();
		let publish = json!({
			"type": "publish",
			"topic": topic,
			"addresses": addresses,
		});
		outgoing
			.send(Message::Text(publish.to_string()))
			.map_err(|_| ChannelError::Closed)
	}

	async fn close(&self) -> Result<(), ChannelError> {
		let connection = self.connection.lock().take();
		self.listener.lock().take();
		if let Some(connection) = connection {
			let Connection {
				outgoing,
				writer,
				reader,
			} = connection;
			// the writer sends a close frame and exits once its queue is dropped
			drop(outgoing);
			drop(writer);
			reader.abort();
			debug!("Channel {} closed", self.ws_url);
		}
		Ok(())
	}
}
