use crate::domain::{ChatId, MediaRef};

/// A fully formatted message waiting for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundItem {
    pub destination: ChatId,
    pub payload: OutboundPayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundPayload {
    Text(String),
    Photo {
        media: MediaRef,
        caption: Option<String>,
    },
}

impl OutboundItem {
    pub fn kind(&self) -> &'static str {
        match self.payload {
            OutboundPayload::Text(_) => "text",
            OutboundPayload::Photo { .. } => "photo",
        }
    }

    /// Text body or caption.
    pub fn text(&self) -> &str {
        match &self.payload {
            OutboundPayload::Text(t) => t,
            OutboundPayload::Photo { caption, .. } => caption.as_deref().unwrap_or(""),
        }
    }
}

/// Limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
    pub max_caption_len: usize,
}

impl Default for MessagingCapabilities {
    fn default() -> Self {
        // Telegram Bot API limits.
        Self {
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }
}
