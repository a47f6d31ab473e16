//! Paced delivery to the destination.
//!
//! Producers push into an unbounded channel and return immediately. One worker
//! owns the receiving end, sends one item at a time and keeps at least
//! `interval` between consecutive sends. A failed send is logged and dropped.

use std::{sync::Arc, time::Duration};

use tokio::sync::{
    mpsc::{self, error::TryRecvError},
    watch,
};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    delivery_log::{DeliveryEvent, DeliveryLog},
    domain::{ChatId, MediaRef, MessageRef},
    errors::Error,
    formatting::split_text,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, OutboundItem, OutboundPayload},
    },
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Draining,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// Producer handle. Cheap to clone; enqueue never blocks.
#[derive(Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<OutboundItem>,
    state: watch::Receiver<QueueState>,
}

impl DeliveryQueue {
    /// Returns `false` once the worker is gone (shutdown).
    pub fn enqueue(&self, item: OutboundItem) -> bool {
        self.tx.send(item).is_ok()
    }

    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }
}

/// The single consumer of the queue.
pub struct DeliveryWorker {
    rx: mpsc::UnboundedReceiver<OutboundItem>,
    messenger: Arc<dyn MessagingPort>,
    interval: Duration,
    log: Option<DeliveryLog>,
    state: watch::Sender<QueueState>,
    stats: DeliveryStats,
}

pub fn delivery_queue(
    messenger: Arc<dyn MessagingPort>,
    interval: Duration,
    log: Option<DeliveryLog>,
) -> (DeliveryQueue, DeliveryWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(QueueState::Idle);
    (
        DeliveryQueue {
            tx,
            state: state_rx,
        },
        DeliveryWorker {
            rx,
            messenger,
            interval,
            log,
            state: state_tx,
            stats: DeliveryStats::default(),
        },
    )
}

impl DeliveryWorker {
    /// Drain until cancelled or every producer handle is dropped.
    ///
    /// Items still queued at cancellation are abandoned.
    pub async fn run(mut self, cancel: CancellationToken) -> DeliveryStats {
        let mut limiter = IntervalLimiter::new(self.interval);

        loop {
            let item = match self.rx.try_recv() {
                Ok(item) => item,
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {
                    self.set_state(QueueState::Idle);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        next = self.rx.recv() => match next {
                            Some(item) => item,
                            None => break,
                        },
                    }
                }
            };
            self.set_state(QueueState::Draining);

            if !self.deliver(item, &mut limiter, &cancel).await {
                break;
            }
        }

        let abandoned = self.rx.len();
        if abandoned > 0 {
            tracing::warn!(abandoned, "delivery queue stopped with items pending");
        }
        self.set_state(QueueState::Idle);
        tracing::info!(sent = self.stats.sent, failed = self.stats.failed, "delivery queue stopped");
        self.stats
    }

    fn set_state(&self, state: QueueState) {
        self.state.send_replace(state);
    }

    /// Send every part of `item`, each in its own limiter slot.
    /// Returns `false` when cancelled while waiting for a slot.
    async fn deliver(
        &mut self,
        item: OutboundItem,
        limiter: &mut IntervalLimiter,
        cancel: &CancellationToken,
    ) -> bool {
        let parts = split_parts(&item.payload, self.messenger.capabilities());

        let mut outcome: Result<MessageRef> =
            Err(Error::External("refusing to send an empty message".to_string()));
        for (sent_parts, part) in parts.iter().enumerate() {
            let wait = limiter.reserve();
            if !wait.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        if sent_parts > 0 {
                            tracing::warn!(
                                destination = item.destination.0,
                                sent_parts,
                                "delivery interrupted between parts"
                            );
                        }
                        return false;
                    }
                    _ = sleep(wait) => {}
                }
            }

            outcome = self.send_part(item.destination, part).await;
            if outcome.is_err() {
                break;
            }
        }

        let event = match outcome {
            Ok(msg) => {
                self.stats.sent += 1;
                tracing::info!(
                    destination = item.destination.0,
                    kind = item.kind(),
                    message_id = msg.message_id.0,
                    parts = parts.len(),
                    "delivered"
                );
                DeliveryEvent::sent(&item, msg)
            }
            Err(e) => {
                self.stats.failed += 1;
                tracing::error!(
                    destination = item.destination.0,
                    kind = item.kind(),
                    error = %e,
                    "delivery failed, dropping item"
                );
                DeliveryEvent::failed(&item, &e.to_string())
            }
        };

        if let Some(log) = &self.log {
            if let Err(e) = log.write(&event) {
                tracing::warn!(path = %log.path().display(), error = %e, "failed to write delivery log");
            }
        }
        true
    }

    async fn send_part(&self, chat_id: ChatId, part: &Part) -> Result<MessageRef> {
        match part {
            Part::Text(text) => self.messenger.send_text(chat_id, text).await,
            Part::Photo { media, caption } => {
                self.messenger
                    .send_photo(chat_id, media, caption.as_deref())
                    .await
            }
        }
    }
}

/// One platform send.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Part {
    Text(String),
    Photo {
        media: MediaRef,
        caption: Option<String>,
    },
}

/// Texts over the message limit become several texts; a caption over the
/// caption limit becomes a bare photo followed by the caption as text.
fn split_parts(payload: &OutboundPayload, caps: MessagingCapabilities) -> Vec<Part> {
    let texts = |t: &str| {
        split_text(t, caps.max_message_len)
            .into_iter()
            .map(Part::Text)
            .collect::<Vec<_>>()
    };

    match payload {
        OutboundPayload::Text(text) => texts(text),
        OutboundPayload::Photo { media, caption } => match caption {
            Some(c) if c.chars().count() > caps.max_caption_len => {
                let mut out = vec![Part::Photo {
                    media: media.clone(),
                    caption: None,
                }];
                out.extend(texts(c));
                out
            }
            c => vec![Part::Photo {
                media: media.clone(),
                caption: c.clone(),
            }],
        },
    }
}
