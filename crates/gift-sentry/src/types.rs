//! Core data types for the discovery engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Position inside a sequence's index space. Index 0 is never populated.
pub type Index = u64;

/// Opaque identifier of a tracked sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(pub u32);

impl SequenceId {
    /// The id that follows this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One independently tracked, unbounded index space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Stable identifier, used as the checkpoint key.
    pub id: SequenceId,
    /// URL prefix; the index is appended verbatim.
    pub base_url: String,
    /// Human-readable name used in logs and notifications.
    pub label: String,
}

impl Sequence {
    /// Create a new sequence.
    pub fn new(id: SequenceId, base_url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id,
            base_url: base_url.into(),
            label: label.into(),
        }
    }

    /// URL of the page at `index`.
    pub fn url_for(&self, index: Index) -> String {
        format!("{}{}", self.base_url, index)
    }
}

/// "issued of total" counter printed on every gift page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCount {
    pub issued: u64,
    pub total: u64,
}

/// A trait row from the gift table (model, backdrop, symbol, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub kind: String,
    pub value: String,
    /// Rarity in percent, when the page prints one.
    pub rarity_percent: Option<f64>,
}

/// Current owner of a gift instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub href: String,
}

impl Owner {
    /// Public profile link, preferring the numeric id form.
    pub fn profile_url(&self) -> Option<String> {
        if let Some(id) = &self.user_id {
            Some(format!("https://t.me/id{id}"))
        } else {
            self.username
                .as_ref()
                .map(|name| format!("https://t.me/{name}"))
        }
    }
}

/// Market price snapshot for a gift collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceInfo {
    pub ton: Option<f64>,
    pub usdt: Option<f64>,
    pub rub: Option<f64>,
    /// Page the prices were read from.
    pub source_url: String,
}

impl PriceInfo {
    /// True when no currency was found.
    pub fn is_empty(&self) -> bool {
        self.ton.is_none() && self.usdt.is_none() && self.rub.is_none()
    }
}

/// Structured content extracted from one gift page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GiftRecord {
    /// Page URL the record was read from.
    pub url: String,
    /// Page title.
    pub title: String,
    pub attributes: Vec<Attribute>,
    pub issued: Option<IssuedCount>,
    pub owner: Option<Owner>,
    pub price: Option<PriceInfo>,
}

/// A confirmed, content-bearing result at a given index, pending dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub sequence: SequenceId,
    /// Label of the sequence at discovery time.
    pub label: String,
    pub index: Index,
    pub record: GiftRecord,
    pub found_at: DateTime<Utc>,
}

impl Discovery {
    /// Wrap a probe hit for `sequence` at `index`.
    pub fn new(sequence: &Sequence, index: Index, record: GiftRecord) -> Self {
        Self {
            sequence: sequence.id,
            label: sequence.label.clone(),
            index,
            record,
            found_at: Utc::now(),
        }
    }
}

/// Failure of a single page fetch.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("fetch gate closed")]
    GateClosed,
}

/// Failure of a single delivery attempt.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected by sink: {0}")]
    Rejected(String),
}

/// Errors surfaced by the engine.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no sender could be initialized")]
    NoSenders,

    #[error("fetch gate closed")]
    GateClosed,

    #[error("event channel closed: {0}")]
    ChannelClosed(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience result type.
pub type EngineResult<T> = Result<T, EngineError>;

/// Cut `message` to at most `max` characters for log lines.
pub fn truncate_message(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((cut, _)) => message[..cut].to_string(),
        None => message.to_string(),
    }
}
