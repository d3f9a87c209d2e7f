//! Structured records returned by the source adapters
//!
//! Every field is optional: a field the source did not expose (or exposed as
//! blank text) is `None`, and the report renders it as a placeholder.

use serde::{Deserialize, Deserializer, Serialize};

/// Legal entity found in the bankruptcy registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalEntityRecord {
    #[serde(deserialize_with = "blank_as_none")]
    pub name: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub inn: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub ogrn: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub status: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub status_date: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub court_case_number: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub arbitration_manager: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub address: Option<String>,
}

/// Individual found in the bankruptcy registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndividualRecord {
    #[serde(deserialize_with = "blank_as_none")]
    pub full_name: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub snils: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub status: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub status_date: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub court_case_number: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub arbitration_manager: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub address: Option<String>,
}

/// Source A (EFRSB) payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankruptcyRecords {
    pub legal_entities: Vec<LegalEntityRecord>,
    pub individuals: Vec<IndividualRecord>,
}

impl BankruptcyRecords {
    pub fn is_empty(&self) -> bool {
        self.legal_entities.is_empty() && self.individuals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.legal_entities.len() + self.individuals.len()
    }
}

/// Arbitration court case
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourtCaseRecord {
    #[serde(deserialize_with = "blank_as_none")]
    pub case_number: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub registration_date: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub judge: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub current_instance: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub plaintiff: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub respondent: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub inn: Option<String>,
}

/// Source B (Kad.Arbitr) payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseRecords {
    pub cases: Vec<CourtCaseRecord>,
}

impl CaseRecords {
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }
}

/// Normalize scraped text: trim, collapse internal whitespace runs, blank -> None
pub fn text_field(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(text_field))
}
