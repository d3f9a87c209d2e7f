//! Shared browser session
//!
//! One handle to the remote headless browser and the HTTP client used for
//! direct source calls. The worker owns it and lends it to each adapter call.
//! Navigations are serialized through an internal gate and spaced by a minimum
//! interval, so two retrievals never overlap even if a caller forgets to await
//! sequentially.

use std::time::Duration;

use inncheck_common::config::BrowserConfig;
use inncheck_common::fetch::FetchFailure;
use inncheck_common::ErrorKind;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;

/// Longest slice of an error body kept in failure messages
const BODY_SNIPPET_CHARS: usize = 200;

/// Raw reply from a direct source call
#[derive(Debug, Clone)]
pub struct SourceResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions {
    wait_until: &'static str,
    timeout: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    url: &'a str,
    goto_options: GotoOptions,
    wait_for_timeout: u64,
}

/// Handle to the shared browser and source HTTP client
pub struct BrowserSession {
    http: reqwest::Client,
    render_endpoint: String,
    page_timeout: Duration,
    settle: Duration,
    min_interval: Duration,
    /// Held for the whole navigation; stores when the last one started
    last_navigation: Mutex<Option<Instant>>,
}

impl BrowserSession {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            render_endpoint: config.render_endpoint.trim_end_matches('/').to_string(),
            page_timeout: Duration::from_millis(config.page_timeout_ms),
            settle: Duration::from_millis(config.settle_ms),
            min_interval: Duration::from_millis(config.min_navigation_interval_ms),
            last_navigation: Mutex::new(None),
        })
    }

    /// Whole-request budget: page load plus the settle wait plus slack
    fn request_budget(&self) -> Duration {
        self.page_timeout + self.settle + Duration::from_secs(5)
    }

    /// Acquire the navigation gate, waiting out the minimum interval
    async fn navigation_slot(&self) -> MutexGuard<'_, Option<Instant>> {
        let mut last = self.last_navigation.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!("Navigation pacing: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
        last
    }

    /// Load `url` in the shared browser and return the rendered HTML
    pub async fn render(&self, url: &str) -> std::result::Result<String, FetchFailure> {
        let _slot = self.navigation_slot().await;
        debug!(url, "Rendering page");

        let request = RenderRequest {
            url,
            goto_options: GotoOptions {
                wait_until: "networkidle2",
                timeout: self.page_timeout.as_millis() as u64,
            },
            wait_for_timeout: self.settle.as_millis() as u64,
        };

        let response = self
            .http
            .post(format!("{}/content", self.render_endpoint))
            .json(&request)
            .timeout(self.request_budget())
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_failure(&e))?;
        if !status.is_success() {
            return Err(render_failure(status, &body));
        }
        Ok(body)
    }

    /// Plain GET through the session (picks up source cookies)
    pub async fn get(&self, url: &str) -> std::result::Result<SourceResponse, FetchFailure> {
        let _slot = self.navigation_slot().await;
        debug!(url, "Fetching page");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/html")
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;
        read_response(response).await
    }

    /// XHR-style JSON POST to a source endpoint
    pub async fn post_json<B>(&self, url: &str, body: &B) -> std::result::Result<SourceResponse, FetchFailure>
    where
        B: Serialize + ?Sized,
    {
        let _slot = self.navigation_slot().await;
        debug!(url, "Posting source query");

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(body)
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;
        read_response(response).await
    }
}

async fn read_response(response: reqwest::Response) -> std::result::Result<SourceResponse, FetchFailure> {
    let status = response.status();
    let body = response.text().await.map_err(|e| transport_failure(&e))?;
    Ok(SourceResponse { status, body })
}

/// Map a transport error onto a failure kind
pub fn transport_failure(err: &reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        return FetchFailure {
            kind: ErrorKind::Timeout,
            message: format!("Timeout: {}", err),
        };
    }

    let kind = if err.is_connect() {
        ErrorKind::ConnectionError
    } else if err.is_decode() || err.is_body() {
        ErrorKind::MalformedResponse
    } else {
        ErrorKind::NavigationError
    };
    FetchFailure {
        kind,
        message: err.to_string(),
    }
}

/// Failure for a non-success reply of the render endpoint, classified by its text
pub fn render_failure(status: StatusCode, body: &str) -> FetchFailure {
    let snippet: String = body.trim().chars().take(BODY_SNIPPET_CHARS).collect();
    FetchFailure {
        kind: ErrorKind::classify_or(body, ErrorKind::NavigationError),
        message: format!("render endpoint returned {}: {}", status, snippet),
    }
}
