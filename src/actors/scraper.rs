//! ScraperActor - Polls an exposition feed and publishes it on the bus
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick -> GET feed -> parse exposition -> tag source -> publish Batch
//!     ^
//!     +--- Commands (PollNow, Shutdown)
//! ```
//!
//! A failed request, a non-2xx answer or a failed publish skips the tick;
//! the next tick tries again.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::bus::{MessageBus, codec};
use crate::config::ScraperConfig;
use crate::exposition::parse_exposition;
use crate::util::unix_now;
use crate::Batch;

use super::messages::ScraperCommand;

/// Actor that scrapes a single feed
pub struct ScraperActor {
    config: ScraperConfig,

    /// HTTP client (reused across requests)
    client: reqwest::Client,

    bus: Arc<dyn MessageBus>,
    subject: String,
    command_rx: mpsc::Receiver<ScraperCommand>,
}

impl ScraperActor {
    pub fn new(
        config: ScraperConfig,
        bus: Arc<dyn MessageBus>,
        subject: impl Into<String>,
        command_rx: mpsc::Receiver<ScraperCommand>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            config,
            client,
            bus,
            subject: subject.into(),
            command_rx,
        })
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(scraper = %self.config.name))]
    pub async fn run(mut self) {
        debug!("starting scraper actor");

        let mut ticker = interval(Duration::from_secs(self.config.interval.max(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scrape().await {
                        error!("scrape failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ScraperCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let result = self.scrape().await;
                            let _ = respond_to.send(result);
                        }
                        ScraperCommand::Shutdown => {
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

        debug!("scraper actor stopped");
    }

    /// Fetch, parse and publish one round of samples.
    ///
    /// Returns the number of samples published.
    async fn scrape(&self) -> Result<usize> {
        trace!("requesting feed from {}", self.config.url);

        let response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .context("failed to send HTTP request")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let body = response
            .bytes()
            .await
            .context("failed to read response body")?;

        let series = parse_exposition(Cursor::new(body), unix_now())
            .context("failed to parse exposition feed")?
            .into_iter()
            .map(|mut series| {
                series.metric.labels.insert("source".to_string(), self.config.name.clone());
                series
            })
            .collect::<Vec<_>>();

        if series.is_empty() {
            trace!("feed contained no samples");
            return Ok(0);
        }

        let batch = Batch::new(self.config.user_id, series);
        let count = batch.sample_count();

        self.bus
            .publish(&self.subject, codec::encode_batch(&batch)?)
            .await
            .context("failed to publish scraped batch")?;

        trace!("published {count} samples");
        Ok(count)
    }
}

/// Handle for controlling a ScraperActor
#[derive(Clone)]
pub struct ScraperHandle {
    sender: mpsc::Sender<ScraperCommand>,

    pub name: String,
}

impl ScraperHandle {
    /// Spawn a scraper publishing on `subject`
    pub fn spawn(
        config: ScraperConfig,
        bus: Arc<dyn MessageBus>,
        subject: impl Into<String>,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let name = config.name.clone();

        let actor = ScraperActor::new(config, bus, subject, cmd_rx)?;
        tokio::spawn(actor.run());

        Ok(Self {
            sender: cmd_tx,
            name,
        })
    }

    /// Trigger an immediate scrape, returning the number of samples published
    pub async fn poll_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ScraperCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ScraperCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
