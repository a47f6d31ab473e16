use async_trait::async_trait;

use crate::{
    domain::{ChatId, MediaRef, MessageRef},
    messaging::types::MessagingCapabilities,
    Result,
};

/// Outbound side of the messaging platform.
///
/// The relay only ever posts to its destination, so the port is two sends.
/// Both may fail; the delivery queue logs the failure and moves on.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    async fn send_photo(
        &self,
        chat_id: ChatId,
        media: &MediaRef,
        caption: Option<&str>,
    ) -> Result<MessageRef>;
}
