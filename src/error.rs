//! Error types for the mapping core.
//!
//! Validation errors are raised synchronously and never retried, business
//! errors describe a well-formed request the rules cannot satisfy, and system
//! errors come from the cache/persistence collaborators.

use thiserror::Error;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Business,
    System,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported rule type: '{0}'")]
    UnsupportedType(String),

    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid mapping rule: {0}")]
    InvalidRule(String),

    #[error("mapping rule not found: {0}")]
    NotFound(String),

    #[error("no mapping rule for provider={provider} api_type={api_type} rule_list_type={rule_list_type}")]
    NoMatchingRule {
        provider: String,
        api_type: String,
        rule_list_type: String,
    },

    #[error("rule type '{rule_type}' is unavailable: {reason}")]
    DisabledType { rule_type: String, reason: String },

    #[error("circular fallback chain: {}", chain.join(" -> "))]
    CircularFallback { chain: Vec<String> },

    #[error("circular reference in sample data at '{path}'")]
    CircularReference { path: String },

    #[error("sample data nested deeper than {max_depth} objects at '{path}'")]
    NestingTooDeep { path: String, max_depth: usize },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task aborted: {0}")]
    TaskAborted(String),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnsupportedType(_)
            | Error::EmptyInput(_)
            | Error::InvalidPath { .. }
            | Error::InvalidRule(_)
            | Error::NestingTooDeep { .. } => ErrorCategory::Validation,
            Error::NotFound(_)
            | Error::NoMatchingRule { .. }
            | Error::DisabledType { .. }
            | Error::CircularFallback { .. }
            | Error::CircularReference { .. } => ErrorCategory::Business,
            Error::Cache(_)
            | Error::Persistence(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::TaskAborted(_) => ErrorCategory::System,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::UnsupportedType("x".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(Error::NotFound("r1".into()).category(), ErrorCategory::Business);
        assert_eq!(Error::Cache("down".into()).category(), ErrorCategory::System);
        assert_eq!(
            Error::NestingTooDeep {
                path: "a.b".into(),
                max_depth: 128
            }
            .category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            Error::TaskAborted("join failed".into()).category(),
            ErrorCategory::System
        );
    }

    #[test]
    fn test_circular_fallback_message() {
        let err = Error::CircularFallback {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "circular fallback chain: a -> b -> a");
    }
}
