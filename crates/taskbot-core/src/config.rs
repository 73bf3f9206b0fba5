use crate::dispatcher::{DispatchConfig, DEFAULT_NAMESPACE};
use crate::envelope::API_VERSION;
use crate::error::Result;
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TaskbotConfig {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub bot: BotConfig,
}

impl TaskbotConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_env("TASKBOT")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self> {
        let config = defaults()?.add_source(environment(prefix)).build()?;
        Self::finish(config)
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config = defaults()?
            .add_source(File::with_name(path))
            .add_source(environment("TASKBOT"))
            .build()?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let loaded: Self = config.try_deserialize()?;
        loaded.dispatch_config().validate()?;
        Ok(loaded)
    }

    /// Settings handed to the dispatcher.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            namespace: self.bot.namespace.clone(),
            api_version: self.bot.api_version.clone(),
            warn_on_conflicts: self.bot.warn_on_conflicts,
        }
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("server.webhook_path", "/webhooks")?
        .set_default("webhook.secret", "")?
        .set_default("webhook.signature_header", "X-Taskbot-Signature")?
        .set_default("webhook.timestamp_tolerance_seconds", 300)?
        .set_default("bot.namespace", DEFAULT_NAMESPACE)?
        .set_default("bot.api_version", API_VERSION)?
        .set_default("bot.warn_on_conflicts", false)?)
}

fn environment(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .separator("__")
        .try_parsing(true)
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Route receiving inbound webhooks.
    pub webhook_path: String,
}

/// Inbound webhook verification
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared signing secret. Empty disables signature verification.
    pub secret: String,
    pub signature_header: String,
    #[serde(default = "default_timestamp_tolerance")]
    pub timestamp_tolerance_seconds: i64,
}

impl WebhookConfig {
    pub fn secret(&self) -> Option<&str> {
        Some(self.secret.as_str()).filter(|s| !s.is_empty())
    }
}

fn default_timestamp_tolerance() -> i64 {
    300 // 5 minutes
}

/// Bot behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub namespace: String,
    pub api_version: String,
    #[serde(default)]
    pub warn_on_conflicts: bool,
}
