//! Admission: validate inbound text, queue it, acknowledge it
//!
//! Validation and queue-full rejections end here; nothing malformed or over
//! capacity ever reaches the worker. Every outcome is answered with a message.

use std::sync::Arc;

use inncheck_common::events::{BotEvent, EventBus, RejectReason};
use inncheck_common::Inn;
use tracing::{debug, info, warn};

use crate::channel::{Messenger, RequesterRef};
use crate::messages;
use crate::queue::{LookupRequest, QueueRejection, RequestQueue};

/// One inbound text message, independent of the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub requester: RequesterRef,
    pub user_id: Option<i64>,
    pub text: String,
}

/// What admission did with an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// `/start` or `/help` answered
    Greeted,
    /// Unknown command, no reply
    Ignored,
    /// Queued at `position`
    Admitted { position: usize },
    /// Refused at the boundary
    Rejected(RejectReason),
}

/// Admission step in front of the request queue
pub struct Admission {
    queue: Arc<RequestQueue>,
    messenger: Messenger,
    events: EventBus,
}

impl Admission {
    pub fn new(queue: Arc<RequestQueue>, messenger: Messenger, events: EventBus) -> Self {
        Self {
            queue,
            messenger,
            events,
        }
    }

    /// Route an inbound message: bot commands or an INN lookup
    pub async fn handle(&self, inbound: Inbound) -> AdmissionOutcome {
        let text = inbound.text.trim();
        if let Some(command) = text.strip_prefix('/') {
            return self.handle_command(&inbound.requester, command).await;
        }

        info!(
            chat_id = inbound.requester.chat_id,
            user_id = ?inbound.user_id,
            "Lookup requested"
        );
        self.handle_text(inbound.requester, text).await
    }

    async fn handle_command(&self, requester: &RequesterRef, command: &str) -> AdmissionOutcome {
        // "/start@SomeBot arg" -> "start"
        let name = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .split('@')
            .next()
            .unwrap_or_default();

        match name {
            "start" | "help" => {
                info!(chat_id = requester.chat_id, command = name, "Command received");
                self.messenger.send(requester, messages::GREETING).await;
                AdmissionOutcome::Greeted
            }
            other => {
                debug!(chat_id = requester.chat_id, command = other, "Ignoring unknown command");
                AdmissionOutcome::Ignored
            }
        }
    }

    /// Validate `raw` as an INN and queue a lookup for `requester`
    pub async fn handle_text(&self, requester: RequesterRef, raw: &str) -> AdmissionOutcome {
        let inn = match Inn::parse(raw) {
            Ok(inn) => inn,
            Err(e) => {
                info!(chat_id = requester.chat_id, error = %e, "Rejected malformed INN");
                self.reject(&requester, RejectReason::BadFormat);
                self.messenger.send(&requester, messages::INVALID_INN).await;
                return AdmissionOutcome::Rejected(RejectReason::BadFormat);
            }
        };

        let reservation = match self.queue.try_reserve() {
            Ok(reservation) => reservation,
            Err(QueueRejection::Full) => {
                warn!(
                    chat_id = requester.chat_id,
                    inn = %inn,
                    capacity = self.queue.capacity(),
                    "Queue full, request rejected"
                );
                self.reject(&requester, RejectReason::QueueFull);
                self.messenger
                    .send(&requester, &messages::queue_full(self.queue.capacity()))
                    .await;
                return AdmissionOutcome::Rejected(RejectReason::QueueFull);
            }
            Err(QueueRejection::Closed) => {
                self.reject(&requester, RejectReason::Closed);
                self.messenger.send(&requester, messages::SHUTTING_DOWN).await;
                return AdmissionOutcome::Rejected(RejectReason::Closed);
            }
        };

        let position = reservation.position();
        let acknowledgment = self
            .messenger
            .send(&requester, &messages::accepted(&inn, position))
            .await;

        let request = LookupRequest::new(inn.clone(), requester, acknowledgment);
        match reservation.commit(request) {
            Ok(_) => {
                info!(chat_id = requester.chat_id, inn = %inn, position, "Request queued");
                self.events.emit_lossy(BotEvent::RequestAdmitted {
                    inn: inn.to_string(),
                    chat_id: requester.chat_id,
                    position,
                    timestamp: chrono::Utc::now(),
                });
                AdmissionOutcome::Admitted { position }
            }
            Err(request) => {
                // Closed while the acknowledgment was in flight
                if let Some(ack) = request.acknowledgment {
                    self.messenger.delete(&ack).await;
                }
                self.reject(&requester, RejectReason::Closed);
                self.messenger.send(&requester, messages::SHUTTING_DOWN).await;
                AdmissionOutcome::Rejected(RejectReason::Closed)
            }
        }
    }

    fn reject(&self, requester: &RequesterRef, reason: RejectReason) {
        self.events.emit_lossy(BotEvent::RequestRejected {
            chat_id: requester.chat_id,
            reason,
            timestamp: chrono::Utc::now(),
        });
    }
}
