//! Message bus adapter
//!
//! Producers (the ingestion gateway, scrapers) publish encoded batches on a
//! subject; consumers subscribe as members of a named queue group.
//!
//! ## Delivery
//!
//! - Every group subscribed to a subject receives its own copy of each message
//! - Within a group exactly one member receives a given message (round-robin)
//! - No ordering guarantee across messages
//! - At-least-once: consumers must tolerate duplicates
//!
//! The storage worker and the alert worker each join their own group on the
//! ingest subject, so both observe every batch without coordinating.

pub mod codec;
pub mod memory;

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

pub use memory::{BusStats, InProcessBus};

/// Subject carrying every ingested batch
pub const INGEST_SUBJECT: &str = "metrics.upload";

/// Queue group of the persistence workers
pub const STORAGE_GROUP: &str = "storage-workers";

/// Queue group of the alert evaluation workers
pub const ALERT_GROUP: &str = "alert-workers";

/// A message as seen by a subscriber
#[derive(Debug, Clone)]
pub struct Message {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Bus errors
#[derive(Debug)]
pub enum BusError {
    /// The bus could not accept the message in time
    Unavailable(String),

    /// The bus has been shut down
    Closed,

    /// Payload could not be encoded or decoded
    Codec(serde_json::Error),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Unavailable(msg) => write!(f, "Bus unavailable: {}", msg),
            BusError::Closed => write!(f, "Bus closed"),
            BusError::Codec(e) => write!(f, "Payload codec error: {}", e),
        }
    }
}

impl std::error::Error for BusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BusError::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Codec(err)
    }
}

/// Publish/subscribe transport with queue groups
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Hand a payload to every group subscribed to `subject`.
    ///
    /// Returns once each group has accepted the message, or fails with
    /// [`BusError::Unavailable`] when a group cannot take it in time.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Join `group` on `subject` as a competing consumer.
    async fn subscribe_queue_group(
        &self,
        subject: &str,
        group: &str,
    ) -> Result<Subscription, BusError>;
}

/// Receiving end of a queue group membership
///
/// The stream ends once the bus is closed or the member is dropped from its group.
#[derive(Debug)]
pub struct Subscription {
    subject: String,
    group: String,
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    pub(crate) fn new(subject: &str, group: &str, rx: mpsc::Receiver<Message>) -> Self {
        Self {
            subject: subject.to_string(),
            group: group.to_string(),
            rx,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
