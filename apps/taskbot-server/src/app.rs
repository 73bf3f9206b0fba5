//! Application state and initialization

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use taskbot_core::{Dispatcher, TaskbotConfig};
use taskbot_webhook::{InboundWebhookState, SignatureConfig, WebhookVerifier};

use crate::cli::Args;
use crate::handlers;
use crate::server::Server;

/// Main application
pub struct App {
    config: TaskbotConfig,
    state: Arc<InboundWebhookState>,
}

impl App {
    /// Load configuration and register every listener.
    pub fn build(args: Args) -> Result<Self> {
        args.validate().context("Invalid command line arguments")?;

        let mut config = match &args.config {
            Some(path) => TaskbotConfig::load_from_file(&path.to_string_lossy()),
            None => TaskbotConfig::load(),
        }
        .context("Failed to load configuration")?;

        if let Some(port) = args.port {
            config.server.port = port;
        }

        let state = build_state(&config)?;
        Ok(Self {
            config,
            state: Arc::new(state),
        })
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        info!("Starting server");
        Server::new(self.config, self.state).run().await
    }
}

/// Dispatcher plus optional signature verification, as configured.
pub fn build_state(config: &TaskbotConfig) -> Result<InboundWebhookState> {
    let mut dispatcher =
        Dispatcher::with_config(config.dispatch_config()).context("Invalid bot configuration")?;
    handlers::register(&mut dispatcher);

    info!(
        namespace = %config.bot.namespace,
        listeners = dispatcher.registry().len(),
        "Listeners registered"
    );

    let state = InboundWebhookState::new(Arc::new(dispatcher));
    let state = match config.webhook.secret() {
        Some(secret) => state.with_verifier(WebhookVerifier::with_config(
            secret,
            SignatureConfig::from(&config.webhook),
        )),
        None => {
            tracing::warn!("No webhook secret configured; signatures will not be verified");
            state
        }
    };
    Ok(state)
}
