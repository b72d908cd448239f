use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_CODE_LEN: usize = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("entity code cannot be empty")]
    EmptyCode,
    #[error("entity code length {len} exceeds max {max}")]
    CodeTooLong { len: usize, max: usize },
    #[error("entity code contains invalid character '{ch}' at index {index}")]
    CodeInvalidChar { ch: char, index: usize },
    #[error("invalid listing status '{value}'")]
    InvalidStatus { value: String },
    #[error("invalid instrument kind '{value}', expected stock or index")]
    InvalidKind { value: String },
}

/// Stable identifier of a tradable instrument (an equity like `000001` or an
/// index like `399001`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityCode(String);

impl EntityCode {
    /// Parse and normalize a code: surrounding whitespace is dropped and
    /// letters are upper-cased.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCode);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_CODE_LEN {
            return Err(ValidationError::CodeTooLong {
                len,
                max: MAX_CODE_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            if !ch.is_ascii_alphanumeric() {
                return Err(ValidationError::CodeInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityCode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for EntityCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for EntityCode {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EntityCode> for String {
    fn from(value: EntityCode) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_trims_code() {
        let parsed = EntityCode::parse(" 000001 ").expect("code should parse");
        assert_eq!(parsed.as_str(), "000001");
    }

    #[test]
    fn normalizes_prefixed_index_code() {
        let parsed = EntityCode::parse("i399001").expect("code should parse");
        assert_eq!(parsed.as_str(), "I399001");
    }

    #[test]
    fn rejects_invalid_chars() {
        let err = EntityCode::parse("600-01").expect_err("must fail");
        assert!(matches!(err, ValidationError::CodeInvalidChar { ch: '-', index: 3 }));
    }

    #[test]
    fn rejects_empty_and_long_codes() {
        assert_eq!(EntityCode::parse("  "), Err(ValidationError::EmptyCode));
        let err = EntityCode::parse("0000000000001").expect_err("must fail");
        assert!(matches!(err, ValidationError::CodeTooLong { len: 13, .. }));
    }

    #[test]
    fn codes_order_lexically() {
        let mut codes: Vec<EntityCode> = ["600000", "000002", "300001"]
            .into_iter()
            .map(|raw| raw.parse().expect("code should parse"))
            .collect();
        codes.sort();
        let ordered: Vec<&str> = codes.iter().map(EntityCode::as_str).collect();
        assert_eq!(ordered, ["000002", "300001", "600000"]);
    }
}
