//! Sequential worker
//!
//! The only consumer of the request queue. Requests are processed strictly one
//! at a time: both sources are fetched in order through the single browser
//! session, the report is formatted and delivered, and only then is the next
//! request dequeued.
//!
//! A panic anywhere in the per-request pipeline is caught at the request
//! boundary. The requester gets an apology, the fault is logged with the stage
//! it happened in, and the loop moves on.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use inncheck_common::events::{BotEvent, EventBus, RequestStage, Source};
use inncheck_common::fetch::FetchFailure;
use inncheck_common::records::{BankruptcyRecords, CaseRecords};
use inncheck_common::{ErrorKind, FetchResult, Inn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::Messenger;
use crate::fetch::{BrowserSession, FetchAdapter};
use crate::messages;
use crate::queue::{LookupRequest, RequestQueue};
use crate::report::{format_report, TELEGRAM_MESSAGE_LIMIT};
use crate::utils::{retry_fixed, RetryPolicy};

/// Bankruptcy registry adapter as held by the worker
pub type BankruptcySource = Arc<dyn FetchAdapter<Payload = BankruptcyRecords>>;

/// Court case adapter as held by the worker
pub type CaseSource = Arc<dyn FetchAdapter<Payload = CaseRecords>>;

/// How one request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Report formatted and handed to the channel
    Completed,
    /// Pipeline panicked at `stage`; the requester got an apology
    Faulted { stage: RequestStage },
}

/// Last stage reached by the request in flight
struct StageTracker(Mutex<RequestStage>);

impl StageTracker {
    fn new() -> Self {
        Self(Mutex::new(RequestStage::Queued))
    }

    fn set(&self, stage: RequestStage) {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = stage;
    }

    fn get(&self) -> RequestStage {
        *self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Single consumer of the request queue
pub struct SequentialWorker {
    session: BrowserSession,
    bankruptcy: BankruptcySource,
    cases: CaseSource,
    messenger: Messenger,
    events: EventBus,
    fetch_policy: RetryPolicy,
    message_limit: usize,
}

impl SequentialWorker {
    pub fn new(
        session: BrowserSession,
        bankruptcy: BankruptcySource,
        cases: CaseSource,
        messenger: Messenger,
        events: EventBus,
        fetch_policy: RetryPolicy,
    ) -> Self {
        Self {
            session,
            bankruptcy,
            cases,
            messenger,
            events,
            fetch_policy,
            message_limit: TELEGRAM_MESSAGE_LIMIT,
        }
    }

    /// Override the per-message text limit used when splitting reports
    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit.max(1);
        self
    }

    /// Serve requests until the queue closes or `shutdown` fires
    ///
    /// A request already in progress is always finished before returning.
    pub async fn run(self, queue: Arc<RequestQueue>, shutdown: CancellationToken) {
        info!("Sequential worker started");

        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = queue.dequeue() => match next {
                    Some(request) => request,
                    None => break,
                },
            };
            self.process(request).await;
        }

        info!("Sequential worker stopped");
    }

    /// Run the full pipeline for one request, containing any panic
    pub async fn process(&self, request: LookupRequest) -> RequestOutcome {
        let started = Instant::now();
        let waited_ms = (chrono::Utc::now() - request.enqueued_at).num_milliseconds();
        info!(
            inn = %request.inn,
            chat_id = request.requester.chat_id,
            waited_ms,
            "Processing request"
        );
        self.events.emit_lossy(BotEvent::RequestStarted {
            inn: request.inn.to_string(),
            chat_id: request.requester.chat_id,
            waited_ms,
            timestamp: chrono::Utc::now(),
        });

        let stage = StageTracker::new();
        let outcome = match AssertUnwindSafe(self.pipeline(&request, &stage))
            .catch_unwind()
            .await
        {
            Ok(()) => RequestOutcome::Completed,
            Err(panic) => {
                let stage = stage.get();
                self.report_fault(&request, stage, panic_message(panic.as_ref()))
                    .await;
                RequestOutcome::Faulted { stage }
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as i64;
        let faulted = matches!(outcome, RequestOutcome::Faulted { .. });
        info!(
            inn = %request.inn,
            chat_id = request.requester.chat_id,
            elapsed_ms,
            faulted,
            "Request finished"
        );
        self.events.emit_lossy(BotEvent::RequestCompleted {
            inn: request.inn.to_string(),
            chat_id: request.requester.chat_id,
            elapsed_ms,
            faulted,
            timestamp: chrono::Utc::now(),
        });
        outcome
    }

    async fn pipeline(&self, request: &LookupRequest, stage: &StageTracker) {
        let bankruptcy = self
            .fetch_with_retry(self.bankruptcy.as_ref(), &request.inn, stage)
            .await;
        let cases = self
            .fetch_with_retry(self.cases.as_ref(), &request.inn, stage)
            .await;

        stage.set(RequestStage::Formatting);
        let report = format_report(&request.inn, &bankruptcy, &cases);
        let chunks = report.chunks(self.message_limit);
        debug!(inn = %request.inn, chunks = chunks.len(), "Report formatted");

        for (idx, chunk) in chunks.iter().enumerate() {
            let sent = self
                .messenger
                .send_observed(&request.requester, chunk, |attempt| {
                    stage.set(RequestStage::Delivering { attempt })
                })
                .await;
            if sent.is_none() {
                warn!(
                    inn = %request.inn,
                    chat_id = request.requester.chat_id,
                    undelivered = chunks.len() - idx,
                    "Report delivery abandoned"
                );
                break;
            }
        }

        if let Some(ack) = &request.acknowledgment {
            self.messenger.delete(ack).await;
        }
        stage.set(RequestStage::Done);
    }

    /// Query one source under the fetch retry policy
    ///
    /// Never fails: an exhausted budget becomes an `Unknown` failure result.
    async fn fetch_with_retry<P: Send>(
        &self,
        adapter: &dyn FetchAdapter<Payload = P>,
        inn: &Inn,
        stage: &StageTracker,
    ) -> FetchResult<P> {
        let source = adapter.source();
        let session = &self.session;
        let events = &self.events;
        let operation = format!("fetch {} for {}", source, inn);
        let mut attempts = 0u32;

        let outcome = retry_fixed(
            &operation,
            &self.fetch_policy,
            |attempt| {
                attempts = attempt;
                stage.set(RequestStage::Fetching { source, attempt });
                async move {
                    let result = adapter.fetch(session, inn).await.into_result();
                    if let Err(failure) = &result {
                        attempt_failed(events, inn, source, attempt, failure);
                    }
                    result
                }
            },
            |_: &FetchFailure| true,
        )
        .await;

        let result = match outcome {
            Ok(payload) => FetchResult::Success(payload),
            Err(err) => FetchResult::failure(
                ErrorKind::Unknown,
                format!("retrieval failed after {} attempts", err.attempts()),
            ),
        };

        self.events.emit_lossy(BotEvent::SourceCompleted {
            inn: inn.to_string(),
            source,
            attempts,
            failure: result.error_kind(),
            timestamp: chrono::Utc::now(),
        });
        result
    }

    async fn report_fault(&self, request: &LookupRequest, stage: RequestStage, error: String) {
        error!(
            inn = %request.inn,
            chat_id = request.requester.chat_id,
            stage = ?stage,
            error = %error,
            "Internal fault while processing request"
        );
        self.events.emit_lossy(BotEvent::InternalFault {
            inn: request.inn.to_string(),
            chat_id: request.requester.chat_id,
            stage,
            error,
            timestamp: chrono::Utc::now(),
        });

        self.messenger
            .send(&request.requester, &messages::internal_fault(&request.inn))
            .await;
        if let Some(ack) = &request.acknowledgment {
            self.messenger.delete(ack).await;
        }
    }
}

fn attempt_failed(events: &EventBus, inn: &Inn, source: Source, attempt: u32, failure: &FetchFailure) {
    debug!(
        inn = %inn,
        source = %source,
        attempt,
        kind = %failure.kind,
        message = %failure.message,
        "Fetch attempt failed"
    );
    events.emit_lossy(BotEvent::FetchAttemptFailed {
        inn: inn.to_string(),
        source,
        attempt,
        kind: failure.kind,
        message: failure.message.clone(),
        timestamp: chrono::Utc::now(),
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
