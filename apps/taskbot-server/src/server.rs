//! HTTP Server implementation

use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use taskbot_core::TaskbotConfig;
use taskbot_webhook::{create_webhook_router, InboundWebhookState};

pub struct Server {
    config: TaskbotConfig,
    state: Arc<InboundWebhookState>,
}

impl Server {
    pub fn new(config: TaskbotConfig, state: Arc<InboundWebhookState>) -> Self {
        Self { config, state }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let app = build_http_router(self.state, &self.config.server.webhook_path);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;

        info!(
            "HTTP server listening on {} (webhooks at {})",
            addr, self.config.server.webhook_path
        );

        axum::serve(listener, app.into_make_service())
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}

pub fn build_http_router(state: Arc<InboundWebhookState>, webhook_path: &str) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(create_webhook_router(state, webhook_path))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "taskbot",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
