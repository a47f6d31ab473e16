use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio_util::sync::CancellationToken;

use apr_core::pipeline::Relay;

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

/// Long-poll Telegram until `shutdown` fires.
pub async fn run_polling(
    bot: Bot,
    relay: Arc<Relay>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "apr started"),
        Err(e) => return Err(anyhow::anyhow!("telegram getMe failed: {e}")),
    }
    for rule in relay.merchants() {
        tracing::info!(merchant = %rule.name, domains = ?rule.domains, "merchant rule active");
    }

    let state = Arc::new(AppState { relay });

    // Source chats may be groups or channels.
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_channel_post().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .build();

    let token = dispatcher.shutdown_token();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        match token.shutdown() {
            Ok(done) => {
                done.await;
                tracing::info!("dispatcher stopped");
            }
            Err(e) => tracing::debug!("dispatcher shutdown: {e}"),
        }
    });

    dispatcher.dispatch().await;
    Ok(())
}
