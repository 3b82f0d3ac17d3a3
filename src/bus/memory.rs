//! In-process bus for single-process deployments
//!
//! Each group member owns a bounded queue. A publish offers the message to
//! one live member per group, starting at the round-robin member and moving
//! on to the next one whose queue has room. When every queue of the group is
//! full it waits on the round-robin member, up to the publish timeout. A
//! group that stays full makes the publish fail with `Unavailable`; groups
//! served before it keep their copy, which is the at-least-once half of the
//! contract.
//!
//! A subject nobody subscribed to accepts the message and drops it, like a
//! broker would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, instrument, trace, warn};

use super::{BusError, Message, MessageBus, Subscription};

/// Queue capacity per group member
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// How long a publish waits for a full queue
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct Group {
    members: Vec<mpsc::Sender<Message>>,
    next: usize,
}

impl Group {
    /// Live members in delivery order, starting at the round-robin member.
    ///
    /// Members whose subscription was dropped are pruned. `None` for an empty group.
    fn candidates(&mut self) -> Option<Vec<mpsc::Sender<Message>>> {
        self.members.retain(|tx| !tx.is_closed());
        if self.members.is_empty() {
            return None;
        }
        let start = self.next % self.members.len();
        self.next = self.next.wrapping_add(1);

        let mut ordered = self.members.clone();
        ordered.rotate_left(start);
        Some(ordered)
    }
}

/// Counters exposed for diagnostics and tests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub subscribers: usize,
}

pub struct InProcessBus {
    /// subject -> group name -> members
    subjects: Mutex<HashMap<String, HashMap<String, Group>>>,
    capacity: usize,
    publish_timeout: Duration,
    closed: AtomicBool,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl InProcessBus {
    pub fn new(capacity: usize, publish_timeout: Duration) -> Self {
        Self {
            subjects: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            publish_timeout,
            closed: AtomicBool::new(false),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Stop accepting publishes and end every subscription.
    ///
    /// Messages already queued are still handed out before the streams end.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.subjects.lock().await.clear();
        debug!("in-process bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Hand `message` to one member of `group`
    async fn deliver(
        &self,
        group: &str,
        members: &[mpsc::Sender<Message>],
        message: Message,
    ) -> Result<(), BusError> {
        let mut message = message;
        for tx in members {
            match tx.try_send(message) {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(TrySendError::Full(back) | TrySendError::Closed(back)) => message = back,
            }
        }

        // every queue is full, wait on the round-robin member
        let Some(tx) = members.iter().find(|tx| !tx.is_closed()) else {
            warn!(group = %group, "group members went away, message dropped");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        match tokio::time::timeout(self.publish_timeout, tx.send(message)).await {
            Ok(Ok(())) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(_)) => {
                warn!(group = %group, "group member went away, message dropped");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => Err(BusError::Unavailable(format!(
                "group '{}' did not accept message within {:?}",
                group, self.publish_timeout
            ))),
        }
    }

    pub async fn stats(&self) -> BusStats {
        let subscribers = self
            .subjects
            .lock()
            .await
            .values()
            .flat_map(|groups| groups.values())
            .map(|group| group.members.iter().filter(|tx| !tx.is_closed()).count())
            .sum();

        BusStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            subscribers,
        }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_PUBLISH_TIMEOUT)
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        // pick targets under the lock, send after releasing it
        let targets: Vec<(String, Vec<mpsc::Sender<Message>>)> = {
            let mut subjects = self.subjects.lock().await;
            match subjects.get_mut(subject) {
                Some(groups) => groups
                    .iter_mut()
                    .filter_map(|(name, group)| group.candidates().map(|txs| (name.clone(), txs)))
                    .collect(),
                None => Vec::new(),
            }
        };

        self.published.fetch_add(1, Ordering::Relaxed);

        if targets.is_empty() {
            trace!("no subscribers on {subject}, dropping message");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let message = Message {
            subject: subject.to_string(),
            payload,
        };

        for (group, members) in targets {
            self.deliver(&group, &members, message.clone()).await?;
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe_queue_group(
        &self,
        subject: &str,
        group: &str,
    ) -> Result<Subscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let (tx, rx) = mpsc::channel(self.capacity);

        self.subjects
            .lock()
            .await
            .entry(subject.to_string())
            .or_default()
            .entry(group.to_string())
            .or_default()
            .members
            .push(tx);

        debug!("joined queue group {group} on {subject}");
        Ok(Subscription::new(subject, group, rx))
    }
}
