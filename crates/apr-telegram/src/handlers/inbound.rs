use teloxide::types::Message;

use apr_core::domain::{ChatId, InboundMessage, MediaRef, MessageBody, UserId};

/// Text messages and photos (largest size + caption). Anything else is `None`.
pub fn to_inbound(msg: &Message) -> Option<InboundMessage> {
    let body = if let Some(text) = msg.text() {
        MessageBody::Text(text.to_string())
    } else if let Some(sizes) = msg.photo() {
        let best = sizes.last()?;
        MessageBody::Photo {
            media: MediaRef(best.file.id.clone()),
            caption: msg.caption().map(str::to_string),
        }
    } else {
        return None;
    };

    Some(InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        sender: msg.from().map(|u| UserId(u.id.0 as i64)),
        received_at: msg.date,
        body,
    })
}
