//! Telegram Bot API channel
//!
//! Outbound: `sendMessage` / `deleteMessage`. Inbound: `getUpdates` long polling,
//! each text message handed to [`Admission`] on its own task so a slow reply to
//! one requester never delays reading the next update.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use inncheck_common::config::TelegramConfig;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DeliveryError, MessageRef, RequesterChannel, RequesterRef};
use crate::admission::{Admission, Inbound};
use crate::error::{Error, Result};

/// Pause after a failed getUpdates call
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Bot API envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

/// Incoming update (only message updates are requested)
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: Chat,
}

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
    allow_sending_without_reply: bool,
}

#[derive(Debug, Serialize)]
struct DeleteMessageBody {
    chat_id: i64,
    message_id: i64,
}

#[derive(Debug, Serialize)]
struct GetUpdatesBody<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

impl IncomingMessage {
    /// Convert a text message into a channel-neutral inbound request
    pub fn to_inbound(&self) -> Option<Inbound> {
        let text = self.text.as_ref()?;
        Some(Inbound {
            requester: RequesterRef::new(self.chat.id, Some(self.message_id)),
            user_id: self.from.as_ref().map(|u| u.id),
            text: text.clone(),
        })
    }
}

/// Telegram implementation of [`RequesterChannel`]
pub struct TelegramChannel {
    http: reqwest::Client,
    /// `{api_url}/bot{token}`; never logged
    base_url: String,
    request_timeout: Duration,
    poll_timeout_secs: u64,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(Error::Config("Telegram bot token is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), token.trim()),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> std::result::Result<T, DeliveryError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .http
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            // The URL carries the bot token
            .map_err(|e| DeliveryError::Transient(e.without_url().to_string()))?;

        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            undecodable_reply(method, status, format!("{} ({})", e.without_url(), status))
        })?;

        if envelope.ok {
            return envelope
                .result
                .ok_or_else(|| DeliveryError::Permanent(format!("{}: empty result", method)));
        }

        let code = envelope.error_code.unwrap_or_else(|| status.as_u16());
        let description = envelope
            .description
            .unwrap_or_else(|| "no description".to_string());
        let message = format!("{} failed ({}): {}", method, code, description);
        if is_transient_status(code) {
            Err(DeliveryError::Transient(message))
        } else {
            Err(DeliveryError::Permanent(message))
        }
    }

    /// Fetch the next batch of updates (long poll)
    pub async fn get_updates(&self, offset: i64) -> std::result::Result<Vec<Update>, DeliveryError> {
        let body = GetUpdatesBody {
            offset,
            timeout: self.poll_timeout_secs,
            allowed_updates: &["message"],
        };
        // Leave room for the server-side long poll on top of the request budget
        let timeout = Duration::from_secs(self.poll_timeout_secs) + self.request_timeout;
        self.call("getUpdates", &body, timeout).await
    }

    /// Read updates until `shutdown` fires, handing each text message to `admission`
    pub async fn run_polling(self: Arc<Self>, admission: Arc<Admission>, shutdown: CancellationToken) {
        info!("Telegram polling started");
        let mut offset = 0i64;

        loop {
            let batch = tokio::select! {
                _ = shutdown.cancelled() => break,
                batch = self.get_updates(offset) => batch,
            };

            let updates = match batch {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "getUpdates failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(inbound) = update.message.as_ref().and_then(IncomingMessage::to_inbound) else {
                    debug!(update_id = update.update_id, "Skipping non-text update");
                    continue;
                };

                let admission = Arc::clone(&admission);
                tokio::spawn(async move {
                    admission.handle(inbound).await;
                });
            }
        }

        info!("Telegram polling stopped");
    }
}

fn is_transient_status(code: u16) -> bool {
    code == 429 || code >= 500
}

/// Methods that are safe to repeat after an ambiguous outcome
fn is_idempotent(method: &str) -> bool {
    method != "sendMessage"
}

/// Classify a reply that arrived but could not be decoded
///
/// A success status means a `sendMessage` was most likely accepted, so repeating
/// it would duplicate the message.
fn undecodable_reply(method: &str, status: StatusCode, detail: String) -> DeliveryError {
    if is_idempotent(method) {
        return DeliveryError::Transient(detail);
    }
    if !status.is_success() && is_transient_status(status.as_u16()) {
        DeliveryError::Transient(detail)
    } else {
        DeliveryError::Permanent(detail)
    }
}

#[async_trait]
impl RequesterChannel for TelegramChannel {
    async fn send_text(&self, to: &RequesterRef, text: &str) -> std::result::Result<MessageRef, DeliveryError> {
        let body = SendMessageBody {
            chat_id: to.chat_id,
            text,
            reply_to_message_id: to.reply_to,
            allow_sending_without_reply: true,
        };
        let sent: SentMessage = self.call("sendMessage", &body, self.request_timeout).await?;
        Ok(MessageRef {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn delete_message(&self, message: &MessageRef) -> std::result::Result<(), DeliveryError> {
        let body = DeleteMessageBody {
            chat_id: message.chat_id,
            message_id: message.message_id,
        };
        let _: bool = self.call("deleteMessage", &body, self.request_timeout).await?;
        Ok(())
    }
}
