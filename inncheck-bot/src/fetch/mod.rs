//! Source adapters
//!
//! Each adapter performs one retrieval against one source and reports the
//! outcome as a [`FetchResult`]; failures are values, never errors or panics.

pub mod efrsb;
pub mod kad;
pub mod session;

use async_trait::async_trait;
use inncheck_common::events::Source;
use inncheck_common::{FetchResult, Inn};
use scraper::{ElementRef, Selector};

use crate::error::{Error, Result};

pub use efrsb::EfrsbAdapter;
pub use kad::KadArbitrAdapter;
pub use session::BrowserSession;

/// One remote source
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    type Payload: Send;

    fn source(&self) -> Source;

    /// Retrieve everything the source knows about `inn`
    ///
    /// Navigation goes through `session`; the adapter keeps no state between calls.
    async fn fetch(&self, session: &BrowserSession, inn: &Inn) -> FetchResult<Self::Payload>;
}

/// Compile a CSS selector used by an adapter
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Internal(format!("bad selector '{}': {}", css, e)))
}

/// Normalized text of the first element under `scope` matching `sel`
pub(crate) fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope.select(sel).next().and_then(element_text)
}

pub(crate) fn element_text(element: ElementRef<'_>) -> Option<String> {
    inncheck_common::records::text_field(&element.text().collect::<String>())
}
