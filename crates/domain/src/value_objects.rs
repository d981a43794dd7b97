use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

/// 显示名称的最大长度（字符数）。
pub const MAX_DISPLAY_NAME_CHARS: usize = 255;
/// 消息正文的最大长度（字符数）。
pub const MAX_MESSAGE_BODY_CHARS: usize = 1000;

/// 消息唯一标识，由持久化层单调递增分配。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// 经过验证的显示名称，是参与者唯一的身份凭据。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("username", "cannot be empty"));
        }
        if value.chars().count() > MAX_DISPLAY_NAME_CHARS {
            return Err(DomainError::invalid_argument(
                "username",
                format!("must be at most {MAX_DISPLAY_NAME_CHARS} characters"),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DisplayName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DisplayName> for String {
    fn from(value: DisplayName) -> Self {
        value.0
    }
}

impl PartialEq<str> for DisplayName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for DisplayName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// 消息正文内容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageBody(String);

impl MessageBody {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("body", "cannot be empty"));
        }
        if value.chars().count() > MAX_MESSAGE_BODY_CHARS {
            return Err(DomainError::invalid_argument(
                "body",
                format!("must be at most {MAX_MESSAGE_BODY_CHARS} characters"),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MessageBody {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<MessageBody> for String {
    fn from(value: MessageBody) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_is_trimmed() {
        let name = DisplayName::parse("  alice ").unwrap();
        assert_eq!(name.as_str(), "alice");
    }

    #[test]
    fn display_name_rejects_blank_and_oversized() {
        assert!(DisplayName::parse("   ").is_err());
        assert!(DisplayName::parse("x".repeat(256)).is_err());
        assert!(DisplayName::parse("x".repeat(255)).is_ok());
    }

    #[test]
    fn message_body_limits() {
        assert!(MessageBody::parse("").is_err());
        assert!(MessageBody::parse(" \n ").is_err());
        assert!(MessageBody::parse("y".repeat(1001)).is_err());
        assert_eq!(MessageBody::parse("y".repeat(1000)).unwrap().as_str().len(), 1000);
    }

    #[test]
    fn body_length_counts_characters_not_bytes() {
        assert!(MessageBody::parse("é".repeat(1000)).is_ok());
    }

    #[test]
    fn display_name_deserialization_validates() {
        let err = serde_json::from_str::<DisplayName>("\"\"");
        assert!(err.is_err());
        let name: DisplayName = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(name, "bob");
    }
}
