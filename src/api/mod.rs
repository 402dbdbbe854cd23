//! REST API server.
//!
//! Provides HTTP endpoints for:
//! - Recording acquisition and combine
//! - Run status inspection
//! - Upload of finished recordings into remote storage
//!
//! Authentication is left to a fronting proxy.

pub mod error;
pub mod locks;
pub mod routes;

use crate::config::ApiConfig;
use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

pub use routes::AppState;

pub struct ApiServer {
    host: String,
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: &ApiConfig, state: AppState) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            state,
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = router(self.state);
        let address = format!("{}:{}", self.host, self.port);

        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {}", address))?;

        info!("API server listening on http://{}", address);
        info!("Endpoints:");
        info!("  GET  /                    - Service info");
        info!("  GET  /version             - Get version info");
        info!("  POST /recordings          - Download, combine and announce a recording");
        info!("  GET  /recordings/:run_key - Get run status");
        info!("  GET  /upload/recording    - Upload a recording to remote storage");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Every route of the service.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/version", get(version))
        .merge(routes::recordings::router(state.clone()))
        .merge(routes::upload::router(state))
        .layer(ServiceBuilder::new())
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "bbb-recording",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "bbb-recording"
    }))
}
