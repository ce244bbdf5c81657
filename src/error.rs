//! Error taxonomy for the chat client.
//!
//! `anyhow::Error` is used for plain fatal setup failures that are only
//! ever reported and never matched against; `ChatError` is for the one
//! error a caller does branch on: whether the bytes/field it just parsed
//! were well-formed.

use std::fmt;

/// A single malformed field, used by [`ChatError::Validation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub reason: &'static str,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Bytes did not conform to the codec's grammar or a field's
    /// character/length constraints.
    Validation(FieldViolation),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Validation(v) => write!(f, "validation error: {v}"),
        }
    }
}

impl std::error::Error for ChatError {}
