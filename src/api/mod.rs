//! REST API of the hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Gateway** for ingestion and key verification
//! - **Store** for registration, rules and queries
//!
//! ## Endpoints
//!
//! - `POST /api/ingest` - Publish one sample (API key)
//! - `GET /api/metrics?name=` - Caller's series (API key)
//! - `POST /api/rules` - Create an alert rule (API key)
//! - `POST /api/register` - Create a user and API key
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/stats` - Worker statistics
//! - `GET /metrics/demo` - Simulated exposition feed
//!
//! Keyed routes sit behind [`middleware::auth::require_api_key`]; other
//! methods on a known path answer `405`.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod utils;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{HealthResponse, RegisterResponse, SeriesResponse, StatsResponse};

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tracing::info;

use crate::config::ApiSettings;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser clients
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from(&ApiSettings::default())
    }
}

impl From<&ApiSettings> for ApiConfig {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            bind_addr: settings.bind_addr,
            enable_cors: settings.enable_cors,
        }
    }
}

/// Build the router with every route and layer
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let keyed = Router::new()
        .route("/api/ingest", post(routes::ingest::ingest))
        .route("/api/metrics", get(routes::metrics::get_metrics))
        .route("/api/rules", post(routes::rules::create_rule))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api_key,
        ));

    let mut app = Router::new()
        .route("/api/register", post(routes::register::register))
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/stats", get(routes::stats::get_stats))
        .route("/metrics/demo", get(routes::demo::demo_feed))
        .merge(keyed)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
