//! Test Helper Utilities
//!
//! Mock requester channel and scripted source adapters for driving the worker
//! and admission without network access.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use inncheck_bot::channel::{DeliveryError, MessageRef, Messenger, RequesterChannel, RequesterRef};
use inncheck_bot::fetch::{BrowserSession, FetchAdapter};
use inncheck_bot::queue::LookupRequest;
use inncheck_bot::utils::RetryPolicy;
use inncheck_common::config::BrowserConfig;
use inncheck_common::events::{EventBus, Source};
use inncheck_common::{FetchResult, Inn};

/// Retry policy with the production attempt budget but millisecond delays
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(5))
}

pub fn inn(raw: &str) -> Inn {
    Inn::parse(raw).unwrap()
}

pub fn requester(chat_id: i64) -> RequesterRef {
    RequesterRef::new(chat_id, Some(chat_id * 10))
}

pub fn lookup(raw_inn: &str, chat_id: i64) -> LookupRequest {
    LookupRequest::new(inn(raw_inn), requester(chat_id), None)
}

/// Session that never navigates (mock adapters ignore it)
pub fn test_session() -> BrowserSession {
    let config = BrowserConfig {
        min_navigation_interval_ms: 0,
        ..BrowserConfig::default()
    };
    BrowserSession::new(&config).unwrap()
}

pub fn messenger(channel: Arc<MockChannel>, events: &EventBus) -> Messenger {
    Messenger::new(channel, fast_policy(), events.clone())
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Run `future` with a generous upper bound so a hang fails the test instead of stalling it
pub async fn bounded<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("operation timed out")
}

// ============================================================================
// Mock requester channel
// ============================================================================

/// One successful send
#[derive(Debug, Clone)]
pub struct SentText {
    pub to: RequesterRef,
    pub text: String,
    pub message: MessageRef,
}

#[derive(Default)]
struct MockState {
    failures: VecDeque<DeliveryError>,
    sent: Vec<SentText>,
    deleted: Vec<MessageRef>,
    attempts: u32,
    next_message_id: i64,
}

/// Records every send; fails the first sends with scripted errors
#[derive(Default)]
pub struct MockChannel {
    state: Mutex<MockState>,
    slow_chat: Option<(i64, Duration)>,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Channel whose next sends fail with `errors`, in order
    pub fn failing_with(errors: Vec<DeliveryError>) -> Arc<Self> {
        let channel = Self::default();
        channel.state.lock().unwrap().failures = errors.into();
        Arc::new(channel)
    }

    /// Channel whose sends to `chat_id` take `delay` before completing
    pub fn slow_for(chat_id: i64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            slow_chat: Some((chat_id, delay)),
            ..Self::default()
        })
    }

    pub fn sent(&self) -> Vec<SentText> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|s| s.to.chat_id == chat_id)
            .map(|s| s.text)
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Sends attempted, failed ones included
    pub fn send_attempts(&self) -> u32 {
        self.state.lock().unwrap().attempts
    }
}

#[async_trait]
impl RequesterChannel for MockChannel {
    async fn send_text(&self, to: &RequesterRef, text: &str) -> Result<MessageRef, DeliveryError> {
        if let Some((chat_id, delay)) = self.slow_chat {
            if chat_id == to.chat_id {
                tokio::time::sleep(delay).await;
            }
        }

        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        state.next_message_id += 1;
        let message = MessageRef {
            chat_id: to.chat_id,
            message_id: state.next_message_id,
        };
        state.sent.push(SentText {
            to: *to,
            text: text.to_string(),
            message,
        });
        Ok(message)
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), DeliveryError> {
        self.state.lock().unwrap().deleted.push(*message);
        Ok(())
    }
}

// ============================================================================
// Scripted source adapter
// ============================================================================

/// What a scripted adapter does on one call
pub enum Step<P> {
    Return(FetchResult<P>),
    Panic(&'static str),
}

/// Adapter replaying a script, then repeating `fallback`
pub struct ScriptedAdapter<P> {
    source: Source,
    script: Mutex<VecDeque<Step<P>>>,
    fallback: FetchResult<P>,
    calls: AtomicU32,
    log: Option<Arc<Mutex<Vec<Source>>>>,
}

impl<P: Clone> ScriptedAdapter<P> {
    pub fn new(source: Source, fallback: FetchResult<P>) -> Self {
        Self {
            source,
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicU32::new(0),
            log: None,
        }
    }

    pub fn with_script(self, steps: Vec<Step<P>>) -> Self {
        *self.script.lock().unwrap() = steps.into();
        self
    }

    /// Append the source to `log` on every call
    pub fn with_log(mut self, log: Arc<Mutex<Vec<Source>>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<P> FetchAdapter for ScriptedAdapter<P>
where
    P: Clone + Send + Sync + 'static,
{
    type Payload = P;

    fn source(&self) -> Source {
        self.source
    }

    async fn fetch(&self, _session: &BrowserSession, _inn: &Inn) -> FetchResult<P> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.source);
        }

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Return(result)) => result,
            Some(Step::Panic(message)) => panic!("{}", message),
            None => self.fallback.clone(),
        }
    }
}
