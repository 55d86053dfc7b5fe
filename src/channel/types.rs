use crate::events::{ChannelMessage, ChannelTopic};

use ethereum_types::Address;
use tokio::sync::mpsc;

/// Incoming join/part messages for one subscription.
pub type MessageReceiver = mpsc::UnboundedReceiver<ChannelMessage>;

/// The off-chain join/part channel
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
	/// Subscribe, first receiving every retained message newer than `since_ms`.
	async fn listen(&self, since_ms: u64) -> Result<MessageReceiver, ChannelError>;

	async fn publish(&self, topic: ChannelTopic, addresses: Vec<Address>) -> Result<(), ChannelError>;

	/// Ends every subscription of this channel. Closing twice is fine.
	async fn close(&self) -> Result<(), ChannelError>;
}

/// Error types for channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
	#[error("WebSocket error: {0}")]
	WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Channel is closed")]
	Closed,
}
