//! Error taxonomy for the search core.
//!
//! Every failure the core can surface maps to exactly one wire code; the
//! HTTP layer translates codes to status lines without inspecting messages.

use thiserror::Error;

/// Core error, one variant per wire code.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input: bad JSON, out-of-range limit, undecodable cursor,
    /// cursor combined with `sort=none`.
    #[error("{0}")]
    InvalidRequest(String),

    /// Filter grammar violation, with the byte position of the offending
    /// input.
    #[error("invalid filter at byte {pos}: {msg}")]
    InvalidFilter { pos: usize, msg: String },

    /// Unknown id, or visibility denied (indistinguishable by design).
    #[error("not found")]
    NotFound,

    /// Reserved for the write path; the read surface never emits this.
    #[error("forbidden")]
    Forbidden,

    /// Reserved for the write path; the read surface never emits this.
    #[error("unauthorized")]
    Unauthorized,

    /// Reserved for the write path; the read surface never emits this.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any unclassified failure, including upstream store errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Wire code for the error body.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidRequest(_) => "invalid_request",
            CoreError::InvalidFilter { .. } => "invalid_filter",
            CoreError::NotFound => "not_found",
            CoreError::Forbidden => "forbidden",
            CoreError::Unauthorized => "unauthorized",
            CoreError::Conflict(_) => "conflict",
            CoreError::Internal(_) => "internal",
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Internal(format!("store error: {err}"))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(CoreError::InvalidRequest("x".into()).code(), "invalid_request");
        assert_eq!(
            CoreError::InvalidFilter { pos: 3, msg: "x".into() }.code(),
            "invalid_filter"
        );
        assert_eq!(CoreError::NotFound.code(), "not_found");
        assert_eq!(CoreError::Forbidden.code(), "forbidden");
        assert_eq!(CoreError::Unauthorized.code(), "unauthorized");
        assert_eq!(CoreError::Conflict("x".into()).code(), "conflict");
        assert_eq!(CoreError::Internal("x".into()).code(), "internal");
    }

    #[test]
    fn test_invalid_filter_message_carries_position() {
        let err = CoreError::InvalidFilter { pos: 7, msg: "unexpected ')'".into() };
        assert!(err.to_string().contains("byte 7"));
    }
}
