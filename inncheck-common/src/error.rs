//! Common error types for inncheck

use thiserror::Error;

/// Common result type for inncheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the inncheck crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
