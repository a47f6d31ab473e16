use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{
    domain::MessageRef, errors::Error, messaging::types::OutboundItem, Result,
};

const PREVIEW_MAX_TEXT: usize = 200;

/// RFC3339 timestamp in UTC.
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// One line of the delivery log.
#[derive(Clone, Debug, Serialize)]
pub struct DeliveryEvent {
    pub timestamp: String,
    pub destination: i64,
    pub kind: String,
    pub outcome: DeliveryOutcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl DeliveryEvent {
    pub fn sent(item: &OutboundItem, msg: MessageRef) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            destination: item.destination.0,
            kind: item.kind().to_string(),
            outcome: DeliveryOutcome::Sent,
            message_id: Some(msg.message_id.0),
            error: None,
            preview: preview(item),
        }
    }

    pub fn failed(item: &OutboundItem, error: &str) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            destination: item.destination.0,
            kind: item.kind().to_string(),
            outcome: DeliveryOutcome::Failed,
            message_id: None,
            error: Some(error.to_string()),
            preview: preview(item),
        }
    }
}

fn preview(item: &OutboundItem) -> Option<String> {
    let text = item.text();
    (!text.is_empty()).then(|| truncate_text(text, PREVIEW_MAX_TEXT))
}

/// Append-only delivery log (JSON lines or a readable block format).
#[derive(Clone, Debug)]
pub struct DeliveryLog {
    path: PathBuf,
    json: bool,
}

impl DeliveryLog {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, event: &DeliveryEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "delivery event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            match v {
                serde_json::Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}
