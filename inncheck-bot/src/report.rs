//! Report formatting
//!
//! Pure mapping from the two fetch results to the text sent to the requester.
//! Output depends only on the inputs: no clock, no randomness, record order as
//! the adapters returned it.

use inncheck_common::records::{
    BankruptcyRecords, CaseRecords, CourtCaseRecord, IndividualRecord, LegalEntityRecord,
};
use inncheck_common::{ErrorKind, FetchResult, Inn};

/// Rendered for any field the source did not provide
pub const PLACEHOLDER: &str = "Unknown";

/// Maximum text length of one Telegram message
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const REPORT_RULE: &str = "=============================";
const SECTION_RULE: &str = "-------------------";

/// Which part of the report a section is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Header,
    Bankruptcy,
    CourtCases,
    Footer,
}

/// One block of report lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub kind: SectionKind,
    pub lines: Vec<String>,
}

/// Formatted report: header, EFRSB section, Kad.Arbitr section, footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    sections: Vec<ReportSection>,
}

impl Report {
    pub fn sections(&self) -> &[ReportSection] {
        &self.sections
    }

    pub fn section(&self, kind: SectionKind) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Full report text
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .flat_map(|s| s.lines.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Report text split into messages of at most `limit` characters
    ///
    /// Splits at line boundaries; a single line longer than `limit` is cut.
    pub fn chunks(&self, limit: usize) -> Vec<String> {
        split_message(&self.render(), limit)
    }
}

/// Build the report for `inn`
pub fn format_report(
    inn: &Inn,
    bankruptcy: &FetchResult<BankruptcyRecords>,
    cases: &FetchResult<CaseRecords>,
) -> Report {
    Report {
        sections: vec![
            header_section(inn),
            bankruptcy_section(bankruptcy),
            court_case_section(cases),
            ReportSection {
                kind: SectionKind::Footer,
                lines: vec![REPORT_RULE.to_string()],
            },
        ],
    }
}

fn header_section(inn: &Inn) -> ReportSection {
    ReportSection {
        kind: SectionKind::Header,
        lines: vec![
            format!("Debtor report (INN: {})", inn),
            REPORT_RULE.to_string(),
            String::new(),
            "1. Basic data".to_string(),
            SECTION_RULE.to_string(),
            format!("- INN: {}", inn),
        ],
    }
}

fn section_start(title: &str) -> Vec<String> {
    vec![String::new(), title.to_string(), SECTION_RULE.to_string()]
}

fn bankruptcy_section(result: &FetchResult<BankruptcyRecords>) -> ReportSection {
    let mut lines = section_start("2. EFRSB (bankruptcy registry)");

    match result {
        FetchResult::Failure { kind, message } => lines.push(failure_line(*kind, message)),
        FetchResult::Success(payload) if payload.is_empty() => {
            lines.push("- Bankruptcy: not found".to_string());
        }
        FetchResult::Success(payload) => {
            lines.push("- Bankruptcy:".to_string());
            for (idx, person) in payload.individuals.iter().enumerate() {
                lines.extend(individual_lines(idx + 1, person));
            }
            for (idx, entity) in payload.legal_entities.iter().enumerate() {
                lines.extend(legal_entity_lines(idx + 1, entity));
            }
        }
    }

    ReportSection {
        kind: SectionKind::Bankruptcy,
        lines,
    }
}

fn court_case_section(result: &FetchResult<CaseRecords>) -> ReportSection {
    let mut lines = section_start("3. Kad.Arbitr (arbitration cases)");

    match result {
        FetchResult::Failure { kind, message } => lines.push(failure_line(*kind, message)),
        FetchResult::Success(payload) if payload.is_empty() => {
            lines.push("- Court cases: not found".to_string());
        }
        FetchResult::Success(payload) => {
            lines.push("- Court cases:".to_string());
            for (idx, case) in payload.cases.iter().enumerate() {
                lines.extend(court_case_lines(idx + 1, case));
            }
        }
    }

    ReportSection {
        kind: SectionKind::CourtCases,
        lines,
    }
}

/// Status line for a failed source
pub fn failure_line(kind: ErrorKind, message: &str) -> String {
    match kind {
        ErrorKind::Timeout => "- Status: unavailable, page load exceeded time budget".to_string(),
        ErrorKind::CaptchaDetected => {
            "- Status: blocked by automated-access challenge, retry later".to_string()
        }
        ErrorKind::InvalidFormat => {
            "- Status: not checked, the source rejected the identifier format; check the format"
                .to_string()
        }
        ErrorKind::NavigationError
        | ErrorKind::ConnectionError
        | ErrorKind::MalformedResponse
        | ErrorKind::Unknown => format!("- Status: error: {}", message),
    }
}

fn field(label: &str, value: &Option<String>) -> String {
    format!("    - {}: {}", label, value.as_deref().unwrap_or(PLACEHOLDER))
}

fn individual_lines(number: usize, person: &IndividualRecord) -> Vec<String> {
    vec![
        format!("  - Individual {}:", number),
        field("Full name", &person.full_name),
        field("SNILS", &person.snils),
        field("Address", &person.address),
        field("Status", &person.status),
        field("Status date", &person.status_date),
        field("Case number", &person.court_case_number),
        field("Arbitration manager", &person.arbitration_manager),
    ]
}

fn legal_entity_lines(number: usize, entity: &LegalEntityRecord) -> Vec<String> {
    vec![
        format!("  - Legal entity {}:", number),
        field("Name", &entity.name),
        field("INN", &entity.inn),
        field("OGRN", &entity.ogrn),
        field("Address", &entity.address),
        field("Status", &entity.status),
        field("Status date", &entity.status_date),
        field("Case number", &entity.court_case_number),
        field("Arbitration manager", &entity.arbitration_manager),
    ]
}

fn court_case_lines(number: usize, case: &CourtCaseRecord) -> Vec<String> {
    vec![
        format!("  - Case {}:", number),
        field("Case number", &case.case_number),
        field("Registration date", &case.registration_date),
        field("Judge", &case.judge),
        field("Current instance", &case.current_instance),
        field("Plaintiff", &case.plaintiff),
        field("Respondent", &case.respondent),
    ]
}

/// Split `text` into pieces of at most `limit` characters, preferring line breaks
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    // (text, char count) of the chunk being built
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        for piece in split_long_line(line, limit) {
            let piece_len = piece.chars().count();
            current = match current.take() {
                None => Some((piece.to_string(), piece_len)),
                Some((mut chunk, len)) if len + 1 + piece_len <= limit => {
                    chunk.push('\n');
                    chunk.push_str(piece);
                    Some((chunk, len + 1 + piece_len))
                }
                Some((chunk, _)) => {
                    chunks.push(chunk);
                    Some((piece.to_string(), piece_len))
                }
            };
        }
    }

    if let Some((chunk, _)) = current {
        chunks.push(chunk);
    }
    chunks
}

fn split_long_line(line: &str, limit: usize) -> Vec<&str> {
    if line.chars().count() <= limit {
        return vec![line];
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (offset, _) in line.char_indices() {
        if count == limit {
            pieces.push(&line[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    pieces.push(&line[start..]);
    pieces
}
