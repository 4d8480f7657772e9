// Public Queue Code (Q + 4 digits)

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Short human-shareable queue code, e.g. `Q4821`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicCode(String);

impl PublicCode {
    pub const PREFIX: char = 'Q';
    pub const DIGITS: usize = 4;

    /// Parse user input. Surrounding whitespace is ignored and a lowercase
    /// prefix is accepted.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DomainError::Validation("Queue code cannot be empty".into()));
        }

        let mut chars = trimmed.chars();
        let prefix_ok = matches!(chars.next(), Some(c) if c.eq_ignore_ascii_case(&Self::PREFIX));
        let digits: &str = chars.as_str();

        if !prefix_ok || digits.len() != Self::DIGITS || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(DomainError::Validation(format!(
                "Invalid queue code '{}': expected {}{}",
                trimmed,
                Self::PREFIX,
                "#".repeat(Self::DIGITS)
            )));
        }

        Ok(Self(format!("{}{}", Self::PREFIX, digits)))
    }

    /// Build a code from its numeric part (0..=9999)
    pub fn from_number(n: u16) -> Result<Self> {
        if n > 9999 {
            return Err(DomainError::Validation(format!(
                "Queue code number out of range: {}",
                n
            )));
        }
        Ok(Self(format!("{}{:04}", Self::PREFIX, n)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PublicCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PublicCode> for String {
    fn from(code: PublicCode) -> Self {
        code.0
    }
}
