//! inncheck-bot library interface
//!
//! Request admission and sequencing core of the INN lookup bot, plus the
//! Telegram channel and the two source adapters. Exposed as a library so the
//! integration tests can drive the worker and admission with mock channels and
//! adapters.

pub mod admission;
pub mod channel;
pub mod error;
pub mod fetch;
pub mod messages;
pub mod queue;
pub mod report;
pub mod utils;
pub mod worker;

pub use crate::error::{Error, Result};
