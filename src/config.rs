use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

use crate::UserId;

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./metricat.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    /// Owner of batches and queries that arrive with user id `0`
    #[serde(default = "default_user_id")]
    pub default_user_id: UserId,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub bus: BusSettings,

    #[serde(default)]
    pub alerting: AlertingSettings,

    #[serde(default)]
    pub scrapers: Vec<ScraperConfig>,

    /// First user and rules created at startup
    pub bootstrap: Option<BootstrapConfig>,
}

fn default_user_id() -> UserId {
    crate::storage::DEFAULT_USER_ID
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct BusSettings {
    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default = "default_storage_group")]
    pub storage_group: String,

    #[serde(default = "default_alert_group")]
    pub alert_group: String,

    /// Queue capacity per group member
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

impl BusSettings {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            storage_group: default_storage_group(),
            alert_group: default_alert_group(),
            queue_capacity: default_queue_capacity(),
            publish_timeout_ms: default_publish_timeout_ms(),
        }
    }
}

fn default_subject() -> String {
    crate::bus::INGEST_SUBJECT.to_string()
}

fn default_storage_group() -> String {
    crate::bus::STORAGE_GROUP.to_string()
}

fn default_alert_group() -> String {
    crate::bus::ALERT_GROUP.to_string()
}

fn default_queue_capacity() -> usize {
    crate::bus::memory::DEFAULT_QUEUE_CAPACITY
}

fn default_publish_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct AlertingSettings {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,

    /// Enables the polling evaluation variant when set
    pub poll_interval_secs: Option<u64>,
}

impl AlertingSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs
            .map(|secs| Duration::from_secs(secs.max(1)))
    }
}

impl Default for AlertingSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            refresh_timeout_secs: default_refresh_timeout(),
            poll_interval_secs: None,
        }
    }
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_refresh_timeout() -> u64 {
    5
}

/// An exposition feed polled by a scraper worker
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ScraperConfig {
    pub name: String,
    pub url: String,

    /// Seconds between polls
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Owner of the scraped samples (`0` = default tenant)
    #[serde(default)]
    pub user_id: UserId,

    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,
}

impl ScraperConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval: default_interval(),
            user_id: 0,
            timeout_secs: default_scrape_timeout(),
        }
    }
}

fn default_interval() -> u64 {
    5
}

fn default_scrape_timeout() -> u64 {
    2
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct BootstrapConfig {
    pub email: String,

    #[serde(default)]
    pub rules: Vec<BootstrapRule>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct BootstrapRule {
    pub metric: String,
    pub threshold: f64,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config file {path}"))?;
    serde_json::from_str(&file_content)
        .context("Invalid configuration file provided!")
        .inspect(|config| trace!("loaded config: {config:?}"))
}
