//! Taxpayer identifier (INN) validation
//!
//! An INN is accepted only when it consists of exactly 10 digits (legal entity)
//! or exactly 12 digits (individual). Surrounding whitespace is ignored; anything
//! else, including non-ASCII digits, is rejected before a request can be queued.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Rejection reason for a malformed identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InnFormatError {
    #[error("INN is empty")]
    Empty,

    #[error("INN must contain only digits")]
    NonDigit,

    #[error("INN must contain 10 or 12 digits, got {0}")]
    BadLength(usize),
}

/// Validated INN
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Inn(String);

impl Inn {
    /// Validate raw requester text
    pub fn parse(raw: &str) -> Result<Self, InnFormatError> {
        let candidate = raw.trim();
        if candidate.is_empty() {
            return Err(InnFormatError::Empty);
        }
        if !candidate.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InnFormatError::NonDigit);
        }
        match candidate.len() {
            10 | 12 => Ok(Self(candidate.to_string())),
            other => Err(InnFormatError::BadLength(other)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Inn {
    type Err = InnFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Inn {
    type Error = InnFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Inn> for String {
    fn from(inn: Inn) -> Self {
        inn.0
    }
}

impl fmt::Display for Inn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Inn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
