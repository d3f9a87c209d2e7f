//! EFRSB bankruptcy registry adapter
//!
//! The search page is a client-rendered application, so it goes through the
//! shared browser. Each hit is a `div.u-card-result` card; cards carrying an
//! OGRN describe legal entities, the rest individuals.

use async_trait::async_trait;
use inncheck_common::config::SourcesConfig;
use inncheck_common::events::Source;
use inncheck_common::records::{BankruptcyRecords, IndividualRecord, LegalEntityRecord};
use inncheck_common::{ErrorKind, FetchResult, Inn};
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use super::session::BrowserSession;
use super::{element_text, first_text, selector, FetchAdapter};
use crate::error::Result;

const POINT_CLASS: &str = "u-card-result__point";
const VALUE_CLASS: &str = "u-card-result__value";

struct CardSelectors {
    card: Selector,
    no_result: Selector,
    name: Selector,
    address: Selector,
    labeled: Selector,
    status: Selector,
    status_date: Selector,
    court_case: Selector,
    manager: Selector,
}

impl CardSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            card: selector("div.u-card-result")?,
            no_result: selector("div.no-result-msg__header")?,
            name: selector("div.u-card-result__name")?,
            address: selector("div.u-card-result__value_adr")?,
            labeled: selector("span.u-card-result__point, span.u-card-result__value")?,
            status: selector("div.u-card-result__value_item-property")?,
            status_date: selector("div.status-date")?,
            court_case: selector("div.u-card-result__court-case div.u-card-result__value")?,
            manager: selector("div.u-card-result__manager div.u-card-result__value")?,
        })
    }
}

pub struct EfrsbAdapter {
    base_url: String,
    selectors: CardSelectors,
}

impl EfrsbAdapter {
    pub fn new(sources: &SourcesConfig) -> Result<Self> {
        Ok(Self {
            base_url: sources.efrsb_url.trim_end_matches('/').to_string(),
            selectors: CardSelectors::new()?,
        })
    }

    pub fn search_url(&self, inn: &Inn) -> String {
        format!("{}/bankrupts?searchString={}", self.base_url, inn)
    }

    /// Extract bankruptcy records from a rendered search page
    pub fn parse_page(&self, html: &str) -> FetchResult<BankruptcyRecords> {
        let document = Html::parse_document(html);
        let sel = &self.selectors;

        let cards: Vec<ElementRef<'_>> = document.select(&sel.card).collect();
        if cards.is_empty() {
            if document.select(&sel.no_result).next().is_some() {
                return FetchResult::Success(BankruptcyRecords::default());
            }
            let page_text = document.root_element().text().collect::<String>();
            if let Some(ErrorKind::CaptchaDetected) = ErrorKind::classify(&page_text) {
                return FetchResult::failure(
                    ErrorKind::CaptchaDetected,
                    "EFRSB served a captcha instead of search results",
                );
            }
            warn!("EFRSB page has neither result cards nor a no-result marker");
            return FetchResult::Success(BankruptcyRecords::default());
        }

        let mut records = BankruptcyRecords::default();
        for card in cards {
            let card_text = card.text().collect::<String>();
            if card_text.contains("ОГРН") {
                records.legal_entities.push(LegalEntityRecord {
                    name: first_text(card, &sel.name),
                    inn: self.labeled_value(card, "ИНН"),
                    ogrn: self.labeled_value(card, "ОГРН"),
                    status: first_text(card, &sel.status),
                    status_date: first_text(card, &sel.status_date),
                    court_case_number: first_text(card, &sel.court_case),
                    arbitration_manager: first_text(card, &sel.manager),
                    address: first_text(card, &sel.address),
                });
            } else {
                records.individuals.push(IndividualRecord {
                    full_name: first_text(card, &sel.name),
                    snils: self.labeled_value(card, "СНИЛС"),
                    status: first_text(card, &sel.status),
                    status_date: first_text(card, &sel.status_date),
                    court_case_number: first_text(card, &sel.court_case),
                    arbitration_manager: first_text(card, &sel.manager),
                    address: first_text(card, &sel.address),
                });
            }
        }
        FetchResult::Success(records)
    }

    /// Value span following the label span whose text is `label`
    fn labeled_value(&self, card: ElementRef<'_>, label: &str) -> Option<String> {
        let mut label_seen = false;
        for element in card.select(&self.selectors.labeled) {
            let is_point = element.value().classes().any(|c| c == POINT_CLASS);
            if is_point {
                label_seen = element_text(element).as_deref() == Some(label);
            } else if label_seen && element.value().classes().any(|c| c == VALUE_CLASS) {
                return element_text(element);
            }
        }
        None
    }
}

#[async_trait]
impl FetchAdapter for EfrsbAdapter {
    type Payload = BankruptcyRecords;

    fn source(&self) -> Source {
        Source::Efrsb
    }

    async fn fetch(&self, session: &BrowserSession, inn: &Inn) -> FetchResult<BankruptcyRecords> {
        let url = self.search_url(inn);
        let html = match session.render(&url).await {
            Ok(html) => html,
            Err(failure) => return failure.into(),
        };

        let result = self.parse_page(&html);
        if let FetchResult::Success(records) = &result {
            info!(
                inn = %inn,
                legal_entities = records.legal_entities.len(),
                individuals = records.individuals.len(),
                "EFRSB search parsed"
            );
        }
        result
    }
}
