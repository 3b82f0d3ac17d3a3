//! Ingestion gateway
//!
//! Authenticates callers against the store's key lookup, wraps each admitted
//! sample into a one-series [`Batch`] and publishes it on the ingest subject.
//! The gateway never writes to the store itself; persistence happens in the
//! storage worker on the other side of the bus.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::bus::{BusError, INGEST_SUBJECT, MessageBus, codec};
use crate::storage::{StorageBackend, StorageError};
use crate::util::unix_now;
use crate::{Batch, Metric, Sample, TimeSeries, UserId};

/// Bound on the identity lookup during ingestion
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Body of an ingestion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub name: String,
    pub value: f64,

    /// Seconds since epoch; the gateway stamps receipt time when absent
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl IngestRequest {
    pub fn new(name: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp: Some(timestamp),
        }
    }
}

#[derive(Debug)]
pub enum GatewayError {
    /// Missing or unknown API key
    Unauthorized,

    /// Body could not be decoded or names no metric
    BadRequest(String),

    /// Bus or identity lookup did not answer in time
    Unavailable(String),

    /// Unexpected failure in the identity lookup
    Internal(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Unauthorized => write!(f, "Unauthorized"),
            GatewayError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            GatewayError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            GatewayError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<BusError> for GatewayError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Codec(e) => GatewayError::Internal(e.to_string()),
            other => GatewayError::Unavailable(other.to_string()),
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConnectionFailed(_) | StorageError::UnhealthyBackend(_) => {
                GatewayError::Unavailable(err.to_string())
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

/// Authenticating front door of the pipeline
#[derive(Clone)]
pub struct Gateway {
    identity: Arc<dyn StorageBackend>,
    bus: Arc<dyn MessageBus>,
    subject: String,
    auth_timeout: Duration,
}

impl Gateway {
    pub fn new(identity: Arc<dyn StorageBackend>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            identity,
            bus,
            subject: INGEST_SUBJECT.to_string(),
            auth_timeout: AUTH_TIMEOUT,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Resolve an API key to its owner.
    ///
    /// Empty and unknown keys are `Unauthorized`; a lookup that outlives the
    /// auth timeout is `Unavailable`.
    pub async fn authenticate(&self, api_key: &str) -> Result<UserId, GatewayError> {
        if api_key.is_empty() {
            return Err(GatewayError::Unauthorized);
        }

        let lookup = tokio::time::timeout(self.auth_timeout, self.identity.verify_key(api_key))
            .await
            .map_err(|_| GatewayError::Unavailable("key verification timed out".to_string()))?;

        match lookup? {
            Some(user_id) => Ok(user_id),
            None => {
                debug!("rejected unknown api key");
                Err(GatewayError::Unauthorized)
            }
        }
    }

    /// Full ingestion path: authenticate, decode, publish.
    ///
    /// The key is checked before the body is looked at, so an unauthenticated
    /// caller can never reach the bus.
    pub async fn ingest(&self, api_key: &str, body: &[u8]) -> Result<Batch, GatewayError> {
        let user_id = self.authenticate(api_key).await?;
        let request: IngestRequest = serde_json::from_slice(body)
            .map_err(|e| GatewayError::BadRequest(e.to_string()))?;
        self.admit(user_id, request).await
    }

    /// Publish a sample for an already authenticated user.
    ///
    /// Returns the batch that was handed to the bus. A failed publish drops
    /// the sample; retrying is up to the caller.
    #[instrument(skip(self, request), fields(metric = %request.name))]
    pub async fn admit(&self, user_id: UserId, request: IngestRequest) -> Result<Batch, GatewayError> {
        let batch = build_batch(user_id, request)?;
        let payload = codec::encode_batch(&batch)?;

        if let Err(e) = self.bus.publish(&self.subject, payload).await {
            warn!("failed to publish batch for user {}: {}", user_id, e);
            return Err(e.into());
        }

        debug!("published batch for user {}", user_id);
        Ok(batch)
    }
}

/// Wrap one sample into a provenance-tagged single-series batch
pub fn build_batch(user_id: UserId, request: IngestRequest) -> Result<Batch, GatewayError> {
    if request.name.trim().is_empty() {
        return Err(GatewayError::BadRequest("metric name must not be empty".to_string()));
    }

    let metric = Metric::new(request.name)
        .with_label("source", "agent")
        .with_label("auth", "verified");
    let sample = Sample::new(request.timestamp.unwrap_or_else(unix_now), request.value);

    Ok(Batch::new(user_id, vec![TimeSeries::single(metric, sample)]))
}
