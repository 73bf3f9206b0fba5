//! Error types for taskbot core

use thiserror::Error;

/// Configuration and setup errors.
///
/// These are raised synchronously while the bot is being assembled and are
/// never produced while a webhook is being dispatched. Failures inside
/// registered handlers are reported through [`crate::HandlerError`] instead.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid trigger pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
