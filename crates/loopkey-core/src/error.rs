//! Structured errors, serializable for machine-readable CLI output

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Configuration,
    EmptyTimeline,
    NotFound,
    CorruptData,
    AlreadyExists,
    InvalidName,
    Subscription,
    Synthesis,
    Busy,
    Unsupported,
    Io,
    Serialization,
}

#[derive(Error, Debug)]
pub enum Error {
    /// No capture source enabled, or a numeric setting out of range
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("timeline has no events")]
    EmptyTimeline,

    #[error("no macro named '{name}'")]
    NotFound { name: String },

    #[error("macro '{name}' is corrupt: {reason}")]
    CorruptData { name: String, reason: String },

    #[error("a macro named '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("invalid macro name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// OS input hook registration failed
    #[error("input subscription failed: {0}")]
    Subscription(String),

    #[error("input synthesis failed: {0}")]
    Synthesis(String),

    /// Another capture or playback session is active
    #[error("engine busy: {0}")]
    Busy(String),

    #[error("not supported on this platform: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Configuration(_) => ErrorCode::Configuration,
            Error::EmptyTimeline => ErrorCode::EmptyTimeline,
            Error::NotFound { .. } => ErrorCode::NotFound,
            Error::CorruptData { .. } => ErrorCode::CorruptData,
            Error::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            Error::InvalidName { .. } => ErrorCode::InvalidName,
            Error::Subscription(_) => ErrorCode::Subscription,
            Error::Synthesis(_) => ErrorCode::Synthesis,
            Error::Busy(_) => ErrorCode::Busy,
            Error::Unsupported(_) => ErrorCode::Unsupported,
            Error::Io(_) => ErrorCode::Io,
            Error::Serialization(_) => ErrorCode::Serialization,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Error::NotFound { name: name.into() }
    }

    pub fn corrupt(name: impl Into<String>, reason: impl ToString) -> Self {
        Error::CorruptData {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Hints for a human (or agent) reading the JSON output
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Error::NotFound { .. } => vec!["Run `lk list` to see saved macros".to_string()],
            Error::Subscription(_) => vec![
                "Grant Input Monitoring and Accessibility permissions to the terminal".to_string(),
            ],
            Error::Configuration(_) => {
                vec!["Check settings with `lk config`".to_string()]
            }
            _ => Vec::new(),
        }
    }
}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let suggestions = self.suggestions();
        let len = if suggestions.is_empty() { 2 } else { 3 };
        let mut s = serializer.serialize_struct("Error", len)?;
        s.serialize_field("code", &self.code())?;
        s.serialize_field("message", &self.to_string())?;
        if !suggestions.is_empty() {
            s.serialize_field("suggestions", &suggestions)?;
        }
        s.end()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("login");
        assert_eq!(err.to_string(), "no macro named 'login'");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_error_serializes_code() {
        let err = Error::config("speed_multiplier must be > 0");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "CONFIGURATION");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("speed_multiplier"));
        assert!(json["suggestions"].is_array());
    }

    #[test]
    fn test_empty_timeline_has_no_suggestions() {
        let json = serde_json::to_value(Error::EmptyTimeline).unwrap();
        assert_eq!(json["code"], "EMPTY_TIMELINE");
        assert!(json.get("suggestions").is_none());
    }
}
