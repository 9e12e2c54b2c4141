//! Value objects for checkout

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mobile subscriber number in the gateway's expected format (no `+`,
/// country code prefix, digits only).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Msisdn(String);

impl Msisdn {
    /// Normalizes a customer-entered phone number. A leading `+` is
    /// stripped and a leading trunk `0` is rewritten to `country_code`.
    pub fn normalize(raw: &str, country_code: &str) -> Result<Self, MsisdnError> {
        let trimmed: String = raw.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
        let digits = trimmed.strip_prefix('+').unwrap_or(&trimmed);
        if digits.is_empty() {
            return Err(MsisdnError::Empty);
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(MsisdnError::NonNumeric);
        }
        let normalized = match digits.strip_prefix('0') {
            Some(rest) => format!("{country_code}{rest}"),
            None => digits.to_string(),
        };
        if normalized.len() < 10 || normalized.len() > 15 {
            return Err(MsisdnError::BadLength(normalized.len()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a value that was normalized before it was stored.
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Msisdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsisdnError {
    Empty,
    NonNumeric,
    BadLength(usize),
}

impl std::error::Error for MsisdnError {}
impl fmt::Display for MsisdnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "phone number empty"),
            Self::NonNumeric => write!(f, "phone number contains non-digits"),
            Self::BadLength(n) => write!(f, "phone number has {n} digits after normalization"),
        }
    }
}
