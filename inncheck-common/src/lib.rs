//! # inncheck Common Library
//!
//! Shared code for the inncheck bot including:
//! - INN identifier validation
//! - Source record and payload types
//! - Fetch outcome classification (FetchResult, ErrorKind)
//! - Event types (BotEvent) and the EventBus
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod identifier;
pub mod records;

pub use error::{Error, Result};
pub use fetch::{ErrorKind, FetchResult};
pub use identifier::Inn;
