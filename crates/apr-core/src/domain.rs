use chrono::{DateTime, Utc};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Opaque media handle (a Telegram `file_id`). The core never looks inside.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaRef(pub String);

/// Body of an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Photo {
        media: MediaRef,
        caption: Option<String>,
    },
}

/// A message observed on the monitored source.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub sender: Option<UserId>,
    pub received_at: DateTime<Utc>,
    pub body: MessageBody,
}

impl InboundMessage {
    /// The text that carries links: message text, or the photo caption.
    pub fn text(&self) -> &str {
        match &self.body {
            MessageBody::Text(t) => t,
            MessageBody::Photo { caption, .. } => caption.as_deref().unwrap_or(""),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.body {
            MessageBody::Text(_) => "text",
            MessageBody::Photo { .. } => "photo",
        }
    }
}
