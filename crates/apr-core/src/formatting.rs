//! Outbound formatting: span substitution and the promotional wrapper.

use std::ops::Range;

use crate::{
    domain::{ChatId, InboundMessage, MessageBody},
    messaging::types::{OutboundItem, OutboundPayload},
};

pub const DEFAULT_HEADER: &str = "🔥 Promoção encontrada! 🔥";

/// Replace `span` (byte range of the original text) with `replacement`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Substitution {
    pub span: Range<usize>,
    pub replacement: String,
}

/// Apply substitutions right to left so earlier offsets stay valid.
///
/// Spans that overlap an already applied one, fall outside the text or split a
/// UTF-8 character are skipped.
pub fn apply_substitutions(text: &str, subs: &[Substitution]) -> String {
    let mut ordered: Vec<&Substitution> = subs.iter().collect();
    ordered.sort_by(|a, b| b.span.start.cmp(&a.span.start));

    let mut out = text.to_string();
    let mut floor = text.len();
    for sub in ordered {
        let Range { start, end } = sub.span;
        if start > end
            || end > floor
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            tracing::warn!(start, end, "skipping invalid substitution span");
            continue;
        }
        out.replace_range(start..end, &sub.replacement);
        floor = start;
    }
    out
}

/// Header/footer wrapped around every relayed body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromoTemplate {
    pub header: Option<String>,
    pub footer: Option<String>,
}

impl Default for PromoTemplate {
    fn default() -> Self {
        Self {
            header: Some(DEFAULT_HEADER.to_string()),
            footer: None,
        }
    }
}

impl PromoTemplate {
    pub fn wrap(&self, body: &str) -> String {
        [self.header.as_deref(), Some(body), self.footer.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Clone, Debug)]
pub struct MessageFormatter {
    destination: ChatId,
    template: PromoTemplate,
}

impl MessageFormatter {
    pub fn new(destination: ChatId, template: PromoTemplate) -> Self {
        Self {
            destination,
            template,
        }
    }

    pub fn format(&self, msg: &InboundMessage, subs: &[Substitution]) -> OutboundItem {
        let body = tidy(&apply_substitutions(msg.text(), subs));
        let text = self.template.wrap(&body);

        let payload = match &msg.body {
            MessageBody::Text(_) => OutboundPayload::Text(text),
            MessageBody::Photo { media, .. } => OutboundPayload::Photo {
                media: media.clone(),
                caption: (!text.is_empty()).then_some(text),
            },
        };

        OutboundItem {
            destination: self.destination,
            payload,
        }
    }
}

/// Split `text` into chunks of at most `max_chars` characters, breaking at
/// newlines where possible. Empty chunks are dropped.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0usize;
    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if cur_len + line_len > max_chars && !cur.is_empty() {
            out.push(std::mem::take(&mut cur));
            cur_len = 0;
        }
        if line_len <= max_chars {
            cur.push_str(line);
            cur_len += line_len;
            continue;
        }
        // A single overlong line is cut on char boundaries.
        for ch in line.chars() {
            if cur_len == max_chars {
                out.push(std::mem::take(&mut cur));
                cur_len = 0;
            }
            cur.push(ch);
            cur_len += 1;
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }

    out.into_iter()
        .map(|c| c.trim_end().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn tidy(text: &str) -> String {
    let mut out = text.trim().to_string();
    while out.contains("\n\n\n") {
        out = out.replace("\n\n\n", "\n\n");
    }
    out
}
