//! Telegram update handlers.
//!
//! Updates are mapped to the platform-neutral `InboundMessage` and handed to the
//! relay. Nothing is ever replied to the source chat.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

mod inbound;

pub use inbound::to_inbound;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(inbound) = to_inbound(&msg) else {
        tracing::debug!(chat_id = msg.chat.id.0, "ignoring unsupported message kind");
        return Ok(());
    };

    // Delivery is queued, so the dispatcher is never held up by pacing.
    state.relay.handle(&inbound).await;
    Ok(())
}
