//! The relay pipeline: authorize, extract, resolve, rewrite, gate, format, enqueue.

use std::sync::Arc;

use futures::future::join_all;

use crate::{
    affiliate::{MerchantRule, RuleSet},
    config::RelayConfig,
    domain::InboundMessage,
    formatting::MessageFormatter,
    gate::{ContentGate, DropReason, GateDecision},
    links::{extract_links, CandidateUrl, ResolvedUrl, RewrittenLink},
    messaging::{queue::DeliveryQueue, types::OutboundItem},
    resolver::{Resolution, UrlResolver},
    security::{is_authorized, SourcePolicy},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prepared {
    Ready(OutboundItem),
    Dropped(DropReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    Unauthorized,
    Dropped(DropReason),
    Enqueued,
    /// The delivery worker has shut down.
    QueueClosed,
}

pub struct Relay {
    source: SourcePolicy,
    resolver: Arc<dyn UrlResolver>,
    rules: RuleSet,
    gate: ContentGate,
    formatter: MessageFormatter,
    queue: DeliveryQueue,
}

impl Relay {
    pub fn new(
        source: SourcePolicy,
        resolver: Arc<dyn UrlResolver>,
        rules: RuleSet,
        gate: ContentGate,
        formatter: MessageFormatter,
        queue: DeliveryQueue,
    ) -> Self {
        Self {
            source,
            resolver,
            rules,
            gate,
            formatter,
            queue,
        }
    }

    pub fn from_config(
        cfg: &RelayConfig,
        resolver: Arc<dyn UrlResolver>,
        queue: DeliveryQueue,
    ) -> Self {
        Self::new(
            cfg.source.clone(),
            resolver,
            RuleSet::new(cfg.rules.clone()),
            ContentGate::new(cfg.allowlist.clone(), cfg.unrecognized_links),
            MessageFormatter::new(cfg.destination(), cfg.template.clone()),
            queue,
        )
    }

    pub fn merchants(&self) -> &[MerchantRule] {
        self.rules.rules()
    }

    /// Entry point for every inbound message. Never blocks on delivery.
    pub async fn handle(&self, msg: &InboundMessage) -> RelayOutcome {
        if !is_authorized(msg, &self.source) {
            tracing::debug!(chat_id = msg.chat_id.0, "ignoring message from unauthorized source");
            return RelayOutcome::Unauthorized;
        }

        match self.prepare(msg).await {
            Prepared::Dropped(reason) => {
                tracing::info!(chat_id = msg.chat_id.0, kind = msg.kind(), ?reason, "message dropped");
                RelayOutcome::Dropped(reason)
            }
            Prepared::Ready(item) => {
                if self.queue.enqueue(item) {
                    tracing::info!(chat_id = msg.chat_id.0, kind = msg.kind(), "promotion queued");
                    RelayOutcome::Enqueued
                } else {
                    tracing::warn!("delivery queue closed; message lost");
                    RelayOutcome::QueueClosed
                }
            }
        }
    }

    /// Transform a message without authorizing or enqueueing it.
    pub async fn prepare(&self, msg: &InboundMessage) -> Prepared {
        let candidates = extract_links(msg.text());
        if candidates.is_empty() {
            return Prepared::Dropped(DropReason::NoLinks);
        }

        let resolved = join_all(candidates.into_iter().map(|c| self.resolve(c))).await;
        let links: Vec<RewrittenLink> = resolved
            .into_iter()
            .map(|resolved| {
                let rewrite = self.rules.rewrite(resolved.canonical());
                RewrittenLink { resolved, rewrite }
            })
            .collect();

        match self.gate.evaluate(&links) {
            GateDecision::Drop(reason) => Prepared::Dropped(reason),
            GateDecision::Accept => {
                let subs = self.gate.substitutions(&links);
                Prepared::Ready(self.formatter.format(msg, &subs))
            }
        }
    }

    /// Links whose host matches a merchant rule skip the network. Allowlist-only
    /// domains are always resolved; they may be shorteners.
    async fn resolve(&self, candidate: CandidateUrl) -> ResolvedUrl {
        let url = candidate.absolute();
        let resolution = if self.rules.find(&url).is_some() {
            Resolution::Resolved(url)
        } else {
            self.resolver.resolve(&url).await
        };
        ResolvedUrl {
            candidate,
            resolution,
        }
    }
}
