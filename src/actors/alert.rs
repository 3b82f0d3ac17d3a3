//! AlertActor - Evaluates live batches against the rule cache
//!
//! One member of the alert queue group. Work is split across two tasks:
//!
//! - **Refresher**: rebuilds the rule cache from the rule source, once eagerly at
//!   startup and then every refresh interval. It runs beside the actor so a slow
//!   source never holds up evaluation
//! - **Actor**: evaluates every delivered batch against the current snapshot and,
//!   optionally, polls the newest stored sample of each rule's metric, reporting
//!   breaches and explicit "rule ok" lines
//!
//! A failed refresh is logged and counted; evaluation keeps using the last
//! good snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, error, instrument, warn};

use crate::alerting::{AlertEngine, RuleCache, RuleSource};
use crate::bus::{BusError, Message, MessageBus, Subscription, codec};
use crate::config::AlertingSettings;
use crate::storage::StorageBackend;

use super::messages::{AlertCommand, AlertStats};

/// Timing of the alert worker
#[derive(Debug, Clone)]
pub struct AlertSchedule {
    pub refresh_interval: Duration,
    pub refresh_timeout: Duration,
    pub poll_interval: Option<Duration>,
}

impl From<&AlertingSettings> for AlertSchedule {
    fn from(settings: &AlertingSettings) -> Self {
        Self {
            refresh_interval: settings.refresh_interval(),
            refresh_timeout: settings.refresh_timeout(),
            poll_interval: settings.poll_interval(),
        }
    }
}

impl Default for AlertSchedule {
    fn default() -> Self {
        Self::from(&AlertingSettings::default())
    }
}

#[derive(Debug, Default)]
struct RefreshCounters {
    refreshes: AtomicU64,
    failures: AtomicU64,
}

/// Reloads a rule cache from its source, independently of batch evaluation
#[derive(Clone)]
struct RuleRefresher {
    cache: RuleCache,
    source: Arc<dyn RuleSource>,
    timeout: Duration,
    counters: Arc<RefreshCounters>,
}

impl RuleRefresher {
    async fn refresh(&self) -> anyhow::Result<usize> {
        let result = self.cache.refresh(self.source.as_ref(), self.timeout).await;

        let counter = match &result {
            Ok(_) => &self.counters.refreshes,
            Err(_) => &self.counters.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }

    async fn run(self, period: Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let _ = self.refresh().await;
        }
    }
}

pub struct AlertActor {
    engine: AlertEngine,
    refresher: RuleRefresher,

    /// Store read by the polling variant
    poll_store: Option<Arc<dyn StorageBackend>>,

    subscription: Subscription,
    command_rx: mpsc::Receiver<AlertCommand>,
    schedule: AlertSchedule,
    stats: AlertStats,
}

impl AlertActor {
    pub fn new(
        engine: AlertEngine,
        source: Arc<dyn RuleSource>,
        subscription: Subscription,
        command_rx: mpsc::Receiver<AlertCommand>,
        schedule: AlertSchedule,
    ) -> Self {
        let refresher = RuleRefresher {
            cache: engine.cache().clone(),
            source,
            timeout: schedule.refresh_timeout,
            counters: Arc::new(RefreshCounters::default()),
        };

        Self {
            engine,
            refresher,
            poll_store: None,
            subscription,
            command_rx,
            schedule,
            stats: AlertStats::default(),
        }
    }

    /// Enable the polling variant against `store`
    pub fn with_poll_store(mut self, store: Arc<dyn StorageBackend>) -> Self {
        self.poll_store = Some(store);
        self
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(group = %self.subscription.group()))]
    pub async fn run(mut self) {
        debug!("starting alert actor");

        // eager refresh so the first batches see rules
        let _ = self.refresher.refresh().await;
        let refresh_task: JoinHandle<()> =
            tokio::spawn(self.refresher.clone().run(self.schedule.refresh_interval));

        let poll_period = self.schedule.poll_interval.filter(|_| self.poll_store.is_some());
        let has_poll = poll_period.is_some();
        let mut poll_ticker = interval(poll_period.unwrap_or(Duration::from_secs(3600)));
        poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = self.subscription.next() => {
                    match message {
                        Some(message) => self.evaluate(message).await,
                        None => {
                            warn!("bus subscription ended, shutting down");
                            break;
                        }
                    }
                }

                _ = poll_ticker.tick(), if has_poll => {
                    self.poll().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        AlertCommand::RefreshNow { respond_to } => {
                            debug!("received RefreshNow command");
                            let refresher = self.refresher.clone();
                            tokio::spawn(async move {
                                let _ = respond_to.send(refresher.refresh().await);
                            });
                        }
                        AlertCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.current_stats().await);
                        }
                        AlertCommand::Shutdown => {
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

        refresh_task.abort();
        debug!("alert actor stopped");
    }

    async fn current_stats(&self) -> AlertStats {
        let counters = &self.refresher.counters;
        AlertStats {
            rules_cached: self.engine.cache().len().await,
            refreshes: counters.refreshes.load(Ordering::Relaxed),
            refresh_failures: counters.failures.load(Ordering::Relaxed),
            last_refresh: self.engine.cache().last_refreshed().await,
            ..self.stats.clone()
        }
    }

    async fn evaluate(&mut self, message: Message) {
        let batch = match codec::decode_batch(&message.payload) {
            Ok(batch) => batch,
            Err(e) => {
                error!("dropping malformed payload on {}: {}", message.subject, e);
                self.stats.decode_failures += 1;
                return;
            }
        };

        let fired = self.engine.evaluate(&batch).await;
        self.stats.batches_evaluated += 1;
        self.stats.alerts_fired += fired.len() as u64;
    }

    async fn poll(&mut self) {
        let Some(store) = self.poll_store.as_ref() else {
            return;
        };

        match self.engine.poll(store.as_ref()).await {
            Ok(fired) => self.stats.alerts_fired += fired.len() as u64,
            Err(e) => error!("alert poll failed: {}", e),
        }
    }
}

/// Handle for controlling an AlertActor
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    /// Join `group` on `subject` and spawn an alert worker
    ///
    /// Passing `poll_store` together with a schedule that has a poll interval
    /// enables the polling variant.
    pub async fn spawn(
        engine: AlertEngine,
        source: Arc<dyn RuleSource>,
        bus: &dyn MessageBus,
        subject: &str,
        group: &str,
        schedule: AlertSchedule,
        poll_store: Option<Arc<dyn StorageBackend>>,
    ) -> Result<Self, BusError> {
        let subscription = bus.subscribe_queue_group(subject, group).await?;
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let mut actor = AlertActor::new(engine, source, subscription, cmd_rx, schedule);
        if let Some(store) = poll_store {
            actor = actor.with_poll_store(store);
        }
        tokio::spawn(actor.run());

        Ok(Self { sender: cmd_tx })
    }

    pub async fn refresh_now(&self) -> anyhow::Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AlertCommand::RefreshNow { respond_to: tx })
            .await
            .context("failed to send RefreshNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn get_stats(&self) -> Option<AlertStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AlertCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.sender
            .send(AlertCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
