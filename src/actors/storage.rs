//! StorageActor - Persists batches delivered by the bus
//!
//! One member of the storage queue group. Every message is decoded into a
//! [`Batch`] and appended to the backend as a single transaction.
//!
//! ## Message Flow
//!
//! ```text
//! Bus (storage-workers) -> decode -> StorageBackend::append_batch
//!                             |
//!                        malformed: logged and dropped
//! ```
//!
//! Duplicate deliveries are appended again; nothing is deduplicated here.

use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument, trace, warn};

use crate::bus::{BusError, Message, MessageBus, Subscription, codec};
use crate::storage::StorageBackend;

use super::messages::{StorageCommand, StorageStats};

pub struct StorageActor {
    backend: Arc<dyn StorageBackend>,

    /// Queue group membership on the ingest subject
    subscription: Subscription,

    command_rx: mpsc::Receiver<StorageCommand>,

    stats: StorageStats,
}

impl StorageActor {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        subscription: Subscription,
        command_rx: mpsc::Receiver<StorageCommand>,
    ) -> Self {
        Self {
            backend,
            subscription,
            command_rx,
            stats: StorageStats::default(),
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command arrives, the handle is dropped, or the
    /// bus ends the subscription.
    #[instrument(skip(self), fields(group = %self.subscription.group()))]
    pub async fn run(mut self) {
        debug!("starting storage actor");

        loop {
            tokio::select! {
                message = self.subscription.next() => {
                    match message {
                        Some(message) => self.persist(message).await,
                        None => {
                            warn!("bus subscription ended, shutting down");
                            break;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        StorageCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats.clone());
                        }
                        StorageCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("storage actor stopped");
    }

    async fn persist(&mut self, message: Message) {
        let batch = match codec::decode_batch(&message.payload) {
            Ok(batch) => batch,
            Err(e) => {
                error!("dropping malformed payload on {}: {}", message.subject, e);
                self.stats.decode_failures += 1;
                return;
            }
        };

        match self.backend.append_batch(&batch).await {
            Ok(count) => {
                self.stats.batches_persisted += 1;
                self.stats.samples_persisted += count as u64;
                trace!("persisted {count} samples for user {}", batch.user_id);
            }
            Err(e) => {
                // no requeue: the sample is lost unless the bus redelivers it
                error!("failed to persist batch for user {}: {}", batch.user_id, e);
                self.stats.write_failures += 1;
            }
        }
    }
}

/// Handle for controlling a StorageActor
#[derive(Clone)]
pub struct StorageHandle {
    sender: mpsc::Sender<StorageCommand>,
}

impl StorageHandle {
    /// Join `group` on `subject` and spawn a worker persisting into `backend`
    pub async fn spawn(
        backend: Arc<dyn StorageBackend>,
        bus: &dyn MessageBus,
        subject: &str,
        group: &str,
    ) -> Result<Self, BusError> {
        let subscription = bus.subscribe_queue_group(subject, group).await?;
        Ok(Self::spawn_with_subscription(backend, subscription))
    }

    pub fn spawn_with_subscription(
        backend: Arc<dyn StorageBackend>,
        subscription: Subscription,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = StorageActor::new(backend, subscription, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Get storage worker statistics
    pub async fn get_stats(&self) -> Option<StorageStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StorageCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Whether the actor task is still running
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.sender
            .send(StorageCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
