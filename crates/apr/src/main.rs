use std::sync::Arc;

use teloxide::Bot;
use tokio_util::sync::CancellationToken;

use apr_core::{
    config::RelayConfig,
    delivery_log::DeliveryLog,
    messaging::{port::MessagingPort, queue::delivery_queue},
    pipeline::Relay,
    resolver::{HttpResolver, UrlResolver},
};
use apr_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> Result<(), apr_core::Error> {
    apr_core::logging::init("apr")?;

    let cfg = RelayConfig::load()?;
    tracing::info!(
        destination = cfg.destination().0,
        interval_secs = cfg.delivery_interval.as_secs(),
        merchants = cfg.rules.len(),
        "configuration loaded"
    );

    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let resolver: Arc<dyn UrlResolver> = Arc::new(HttpResolver::new(&cfg.resolver)?);

    let log = cfg
        .delivery_log_path
        .as_ref()
        .map(|path| DeliveryLog::new(path, cfg.delivery_log_json));
    let (queue, worker) = delivery_queue(messenger, cfg.delivery_interval, log);

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(worker.run(shutdown.clone()));

    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let relay = Arc::new(Relay::from_config(&cfg, resolver, queue));
    let polled = apr_telegram::router::run_polling(bot, relay, shutdown.clone()).await;
    shutdown.cancel();

    match worker.await {
        Ok(stats) => tracing::info!(sent = stats.sent, failed = stats.failed, "delivery worker stopped"),
        Err(e) => tracing::error!("delivery worker panicked: {e}"),
    }

    polled.map_err(|e| apr_core::Error::External(format!("telegram bot failed: {e}")))
}

/// Ctrl-C everywhere, plus SIGTERM on unix.
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown requested");
    shutdown.cancel();
}
