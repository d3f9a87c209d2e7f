//! Error types for inncheck-bot
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for inncheck-bot
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP client construction or transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors detected by the bot itself
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using inncheck-bot Error
pub type Result<T> = std::result::Result<T, Error>;
