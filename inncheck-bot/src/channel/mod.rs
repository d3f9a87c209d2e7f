//! Requester channel
//!
//! The worker and the admission step talk to requesters only through
//! [`RequesterChannel`]. Transport details stay in the implementation
//! ([`telegram::TelegramChannel`]); callers only need to know that a delivery can
//! fail transiently (worth retrying) or permanently (not).

pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use inncheck_common::events::{BotEvent, EventBus};
use thiserror::Error;
use tracing::{error, warn};

use crate::utils::{retry_fixed, RetryPolicy};

/// Where a reply goes: the chat, and the inbound message being answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequesterRef {
    pub chat_id: i64,
    pub reply_to: Option<i64>,
}

impl RequesterRef {
    pub fn new(chat_id: i64, reply_to: Option<i64>) -> Self {
        Self { chat_id, reply_to }
    }
}

/// A message the bot has sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Delivery failure reported by a channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Timeouts, rate limits, server errors
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Blocked bot, unknown chat, rejected payload
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }
}

/// Outbound side of the requester channel
#[async_trait]
pub trait RequesterChannel: Send + Sync {
    /// Send one text message
    async fn send_text(&self, to: &RequesterRef, text: &str) -> Result<MessageRef, DeliveryError>;

    /// Remove a message previously sent by the bot
    async fn delete_message(&self, message: &MessageRef) -> Result<(), DeliveryError>;
}

/// Channel wrapper applying the bounded delivery retry discipline
///
/// Failures never propagate: an abandoned delivery is logged, reported on the
/// event bus, and surfaced to the caller only as `None`.
#[derive(Clone)]
pub struct Messenger {
    channel: Arc<dyn RequesterChannel>,
    policy: RetryPolicy,
    events: EventBus,
}

impl Messenger {
    pub fn new(channel: Arc<dyn RequesterChannel>, policy: RetryPolicy, events: EventBus) -> Self {
        Self {
            channel,
            policy,
            events,
        }
    }

    /// Send with retry; `None` when the message was abandoned
    pub async fn send(&self, to: &RequesterRef, text: &str) -> Option<MessageRef> {
        self.send_observed(to, text, |_| {}).await
    }

    /// Send with retry, reporting each attempt number to `on_attempt` before it starts
    pub async fn send_observed<F>(&self, to: &RequesterRef, text: &str, mut on_attempt: F) -> Option<MessageRef>
    where
        F: FnMut(u32),
    {
        let channel = self.channel.as_ref();
        let mut attempts = 0u32;
        let result = retry_fixed(
            "deliver message",
            &self.policy,
            |attempt| {
                attempts = attempt;
                on_attempt(attempt);
                channel.send_text(to, text)
            },
            DeliveryError::is_transient,
        )
        .await;

        match result {
            Ok(message) => {
                self.events.emit_lossy(BotEvent::MessageDelivered {
                    chat_id: to.chat_id,
                    attempts,
                    timestamp: chrono::Utc::now(),
                });
                Some(message)
            }
            Err(err) => {
                error!(
                    chat_id = to.chat_id,
                    attempts = err.attempts(),
                    error = %err,
                    "Message delivery abandoned"
                );
                self.events.emit_lossy(BotEvent::DeliveryAbandoned {
                    chat_id: to.chat_id,
                    attempts: err.attempts(),
                    error: err.into_inner().to_string(),
                    timestamp: chrono::Utc::now(),
                });
                None
            }
        }
    }

    /// Best-effort removal of a bot message; a single attempt, failures only logged
    pub async fn delete(&self, message: &MessageRef) {
        if let Err(e) = self.channel.delete_message(message).await {
            warn!(
                chat_id = message.chat_id,
                message_id = message.message_id,
                error = %e,
                "Failed to delete message"
            );
        }
    }
}
