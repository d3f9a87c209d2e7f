//! Kad.Arbitr case index adapter
//!
//! Loads the start page once per lookup (the search endpoint expects the
//! session cookies it sets), then posts a participant search. The reply is an
//! HTML fragment of `tr` rows, or a full page with `table#b-cases`.

use async_trait::async_trait;
use inncheck_common::config::SourcesConfig;
use inncheck_common::events::Source;
use inncheck_common::fetch::SourceReply;
use inncheck_common::records::{CaseRecords, CourtCaseRecord};
use inncheck_common::{ErrorKind, FetchResult, Inn};
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{info, warn};

use super::session::{BrowserSession, SourceResponse};
use super::{element_text, first_text, selector, FetchAdapter};
use crate::error::Result;

const CAPTCHA_MARKER: &str = "b-pravocaptcha";
const CASES_PER_PAGE: u32 = 25;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchSide<'a> {
    name: &'a str,
    /// -1: any role (plaintiff, respondent, third party)
    #[serde(rename = "Type")]
    side_type: i32,
    exact_match: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchQuery<'a> {
    page: u32,
    count: u32,
    courts: Vec<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    sides: Vec<SearchSide<'a>>,
    judges: Vec<String>,
    case_numbers: Vec<String>,
    #[serde(rename = "WithVKSInstances")]
    with_vks_instances: bool,
}

impl<'a> SearchQuery<'a> {
    fn participant(inn: &'a Inn) -> Self {
        Self {
            page: 1,
            count: CASES_PER_PAGE,
            courts: Vec::new(),
            date_from: None,
            date_to: None,
            sides: vec![SearchSide {
                name: inn.as_str(),
                side_type: -1,
                exact_match: false,
            }],
            judges: Vec::new(),
            case_numbers: Vec::new(),
            with_vks_instances: false,
        }
    }
}

struct RowSelectors {
    rows: Selector,
    cell: Selector,
    no_results: Selector,
    case_number: Selector,
    registration_date: Selector,
    court: Selector,
    judge: Selector,
    div: Selector,
    plaintiff: Selector,
    respondent: Selector,
    participant_inn: Selector,
}

impl RowSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            rows: selector("table#b-cases tbody tr")?,
            cell: selector("td")?,
            no_results: selector("div.b-noResults")?,
            case_number: selector("a.num_case")?,
            registration_date: selector("div.bankruptcy span")?,
            court: selector("td.court")?,
            judge: selector("div.judge")?,
            div: selector("div")?,
            plaintiff: selector("td.plaintiff span.js-rollover")?,
            respondent: selector("td.respondent span.js-rollover")?,
            participant_inn: selector("span.js-rolloverHtml span.g-highlight")?,
        })
    }
}

pub struct KadArbitrAdapter {
    base_url: String,
    selectors: RowSelectors,
}

impl KadArbitrAdapter {
    pub fn new(sources: &SourcesConfig) -> Result<Self> {
        Ok(Self {
            base_url: sources.kad_url.trim_end_matches('/').to_string(),
            selectors: RowSelectors::new()?,
        })
    }

    pub fn search_url(&self) -> String {
        format!("{}/Kad/SearchInstances", self.base_url)
    }

    /// Turn a search reply into case records or a classified failure
    pub fn interpret(&self, response: &SourceResponse) -> FetchResult<CaseRecords> {
        if let Some(failure) = challenge(response) {
            return failure;
        }

        let body = response.body.trim_start();
        if body.starts_with('{') {
            return match SourceReply::<serde_json::Value>::decode(body) {
                FetchResult::Success(value) => {
                    let message = value
                        .get("Message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unexpected JSON reply from Kad.Arbitr")
                        .to_string();
                    FetchResult::classified(message, ErrorKind::MalformedResponse)
                }
                FetchResult::Failure { kind, message } => FetchResult::Failure { kind, message },
            };
        }

        if !response.status.is_success() {
            return FetchResult::classified(
                format!("Kad.Arbitr returned {}", response.status),
                ErrorKind::NavigationError,
            );
        }

        FetchResult::Success(self.parse_rows(body))
    }

    /// Extract case rows from a search fragment or a full results page
    pub fn parse_rows(&self, html: &str) -> CaseRecords {
        // Bare rows are dropped by the HTML parser outside a table
        let wrapped;
        let markup = if html.contains("<table") {
            html
        } else {
            wrapped = format!("<table id=\"b-cases\"><tbody>{}</tbody></table>", html);
            &wrapped
        };

        let document = Html::parse_document(markup);
        let sel = &self.selectors;

        let no_results_shown = document
            .select(&sel.no_results)
            .any(|el| !el.value().classes().any(|c| c == "g-hidden"));
        if no_results_shown {
            return CaseRecords::default();
        }

        let cases: Vec<CourtCaseRecord> = document
            .select(&sel.rows)
            // Header and spacer rows carry no cells
            .filter(|row| row.select(&sel.cell).next().is_some())
            .map(|row| self.parse_row(row))
            .collect();

        if cases.is_empty() {
            warn!("Kad.Arbitr reply contained no case rows");
        }
        CaseRecords { cases }
    }

    fn parse_row(&self, row: ElementRef<'_>) -> CourtCaseRecord {
        let sel = &self.selectors;
        let court = row.select(&sel.court).next();

        CourtCaseRecord {
            case_number: first_text(row, &sel.case_number),
            registration_date: first_text(row, &sel.registration_date),
            judge: court.and_then(|cell| first_text(cell, &sel.judge)),
            current_instance: court
                .and_then(|cell| cell.select(&sel.div).last())
                .and_then(element_text),
            plaintiff: row.select(&sel.plaintiff).next().and_then(participant_name),
            respondent: row.select(&sel.respondent).next().and_then(participant_name),
            inn: first_text(row, &sel.participant_inn),
        }
    }
}

/// Participant name without the nested details popup
fn participant_name(element: ElementRef<'_>) -> Option<String> {
    let own: String = element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|text| &**text)
        .collect();
    inncheck_common::records::text_field(&own).or_else(|| element_text(element))
}

fn challenge<T>(response: &SourceResponse) -> Option<FetchResult<T>> {
    let blocked_status = response.status == StatusCode::TOO_MANY_REQUESTS
        || response.status == StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS;
    if blocked_status || response.body.contains(CAPTCHA_MARKER) {
        return Some(FetchResult::failure(
            ErrorKind::CaptchaDetected,
            format!("Kad.Arbitr captcha challenge ({})", response.status),
        ));
    }
    None
}

#[async_trait]
impl FetchAdapter for KadArbitrAdapter {
    type Payload = CaseRecords;

    fn source(&self) -> Source {
        Source::KadArbitr
    }

    async fn fetch(&self, session: &BrowserSession, inn: &Inn) -> FetchResult<CaseRecords> {
        let start_page = match session.get(&format!("{}/", self.base_url)).await {
            Ok(page) => page,
            Err(failure) => return failure.into(),
        };
        if let Some(failure) = challenge(&start_page) {
            return failure;
        }

        let query = SearchQuery::participant(inn);
        let response = match session.post_json(&self.search_url(), &query).await {
            Ok(response) => response,
            Err(failure) => return failure.into(),
        };

        let result = self.interpret(&response);
        if let FetchResult::Success(records) = &result {
            info!(inn = %inn, cases = records.len(), "Kad.Arbitr search parsed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> KadArbitrAdapter {
        KadArbitrAdapter::new(&SourcesConfig::default()).unwrap()
    }

    fn response(status: u16, body: &str) -> SourceResponse {
        SourceResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        }
    }

    const ROWS: &str = r#"
        <tr>
          <td class="num">
            <div class="b-container">
              <div class="bankruptcy"><span>15.02.2024</span></div>
              <a class="num_case" href="https://kad.arbitr.ru/Card/1">А40-12345/2024</a>
            </div>
          </td>
          <td class="court">
            <div class="b-container">
              <div class="judge">Иванова И. И.</div>
              <div>АС города Москвы</div>
            </div>
          </td>
          <td class="plaintiff">
            <div class="b-container">
              <span class="js-rollover b-newRollover">ООО "Кредитор"
                <span class="js-rolloverHtml">ИНН: <span class="g-highlight">7701234567</span></span>
              </span>
            </div>
          </td>
          <td class="respondent">
            <div class="b-container">
              <span class="js-rollover b-newRollover">ООО "Ромашка"
                <span class="js-rolloverHtml">ИНН: <span class="g-highlight">7707083893</span></span>
              </span>
            </div>
          </td>
        </tr>
        <tr>
          <td class="num"><a class="num_case">А41-777/2023</a></td>
        </tr>
    "#;

    #[test]
    fn test_search_query_shape() {
        let inn = Inn::parse("7707083893").unwrap();
        let json = serde_json::to_value(SearchQuery::participant(&inn)).unwrap();
        assert_eq!(json["Sides"][0]["Name"], "7707083893");
        assert_eq!(json["Sides"][0]["Type"], -1);
        assert_eq!(json["Sides"][0]["ExactMatch"], false);
        assert_eq!(json["Page"], 1);
        assert_eq!(json["WithVKSInstances"], false);
        assert!(json["DateFrom"].is_null());
    }

    #[test]
    fn test_parse_bare_rows() {
        let records = adapter().parse_rows(ROWS);
        assert_eq!(records.len(), 2);

        let first = &records.cases[0];
        assert_eq!(first.case_number.as_deref(), Some("А40-12345/2024"));
        assert_eq!(first.registration_date.as_deref(), Some("15.02.2024"));
        assert_eq!(first.judge.as_deref(), Some("Иванова И. И."));
        assert_eq!(first.current_instance.as_deref(), Some("АС города Москвы"));
        assert_eq!(first.plaintiff.as_deref(), Some("ООО \"Кредитор\""));
        assert_eq!(first.respondent.as_deref(), Some("ООО \"Ромашка\""));
        assert_eq!(first.inn.as_deref(), Some("7701234567"));

        let second = &records.cases[1];
        assert_eq!(second.case_number.as_deref(), Some("А41-777/2023"));
        assert_eq!(second.judge, None);
        assert_eq!(second.plaintiff, None);
    }

    #[test]
    fn test_parse_full_page_table() {
        let page = format!(
            r#"<html><body><div class="b-noResults g-hidden">Ничего не найдено</div>
            <table id="b-cases"><tbody>{}</tbody></table></body></html>"#,
            ROWS
        );
        assert_eq!(adapter().parse_rows(&page).len(), 2);
    }

    #[test]
    fn test_visible_no_results_marker() {
        let page = r#"<html><body><div class="b-noResults">Ничего не найдено</div>
            <table id="b-cases"><tbody></tbody></table></body></html>"#;
        assert!(adapter().parse_rows(page).is_empty());
    }

    #[test]
    fn test_captcha_detection() {
        let adapter = adapter();
        let marker = response(200, r#"<div class="b-pravocaptcha">...</div>"#);
        assert_eq!(
            adapter.interpret(&marker).error_kind(),
            Some(ErrorKind::CaptchaDetected)
        );
        for status in [429, 451] {
            assert_eq!(
                adapter.interpret(&response(status, "")).error_kind(),
                Some(ErrorKind::CaptchaDetected)
            );
        }
    }

    #[test]
    fn test_json_replies() {
        let adapter = adapter();
        let error = response(200, r#"{"error": "Неверный формат ИНН"}"#);
        assert_eq!(
            adapter.interpret(&error).error_kind(),
            Some(ErrorKind::InvalidFormat)
        );

        let message = response(200, r#"{"Success": false, "Message": "Internal failure"}"#);
        assert_eq!(
            adapter.interpret(&message).error_kind(),
            Some(ErrorKind::MalformedResponse)
        );
    }

    #[test]
    fn test_server_error_is_navigation_error() {
        assert_eq!(
            adapter().interpret(&response(503, "<html>down</html>")).error_kind(),
            Some(ErrorKind::NavigationError)
        );
    }

    #[test]
    fn test_success_with_rows() {
        match adapter().interpret(&response(200, ROWS)) {
            FetchResult::Success(records) => assert_eq!(records.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
