use crate::{
    error::{CourierError, GatewayError},
    message::{AttachmentRef, ChannelEvent, SendRequest},
};
use async_trait::async_trait;

/// Inbound event source — the monitored platform.
///
/// Yields single messages and aggregated albums from the chats it is
/// subscribed to; the chat allow-list is enforced at the subscription.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Human-readable source name.
    fn name(&self) -> &str;

    /// Start listening. Returns a receiver that yields channel events.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<ChannelEvent>, CourierError>;
}

/// Downloads attachment bytes from the source platform.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, CourierError>;
}

/// Outbound messaging gateway — accepts one structured send at a time.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Human-readable gateway name.
    fn name(&self) -> &str;

    /// Attempt one send. Rejections carry the gateway's numeric error code.
    async fn send(&self, request: &SendRequest) -> Result<(), GatewayError>;
}
