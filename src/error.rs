use thiserror::Error;

use std::path::PathBuf;

use hickory_resolver::ResolveError;

#[derive(Debug, Error)]
pub enum TamperError {
    #[error("empty command")]
    EmptyCommand,

    #[error("unknown keyword '{keyword}'")]
    UnknownKeyword { keyword: String },

    #[error("{keyword}: missing argument, expected {expected}")]
    MissingArgument {
        keyword: String,
        expected: &'static str,
    },

    #[error("{keyword}: invalid value '{value}': {reason}")]
    InvalidValue {
        keyword: String,
        value: String,
        reason: String,
    },

    #[error("{keyword}: value '{value}' out of range: {reason}")]
    OutOfRange {
        keyword: String,
        value: String,
        reason: String,
    },

    #[error("{keyword}: too many arguments starting at '{extra}'")]
    TooManyArguments { keyword: String, extra: String },

    #[error("conflicting {slot} policies '{first}' and '{second}' in one command")]
    Conflict {
        slot: &'static str,
        first: String,
        second: String,
    },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("'{keyword}' cannot be applied to a profile on its own")]
    NotApplicable { keyword: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{path}:{line}: {source}")]
    ProfileLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: Box<TamperError>,
    },

    #[error("unknown profile '{name}'")]
    UnknownProfile { name: String },

    #[error("failed to initialize DNS resolver: {source}")]
    DnsResolverInit {
        #[source]
        source: ResolveError,
    },

    #[error("failed to resolve domain {domain}: {source}")]
    DnsLookup {
        domain: String,
        #[source]
        source: ResolveError,
    },

    #[error("domain {domain} is blocked")]
    DomainBlocked { domain: String },
}

impl TamperError {
    pub(crate) fn invalid(keyword: &str, value: &str, reason: impl Into<String>) -> Self {
        TamperError::InvalidValue {
            keyword: keyword.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_range(keyword: &str, value: &str, reason: impl Into<String>) -> Self {
        TamperError::OutOfRange {
            keyword: keyword.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(keyword: &str, expected: &'static str) -> Self {
        TamperError::MissingArgument {
            keyword: keyword.to_string(),
            expected,
        }
    }

    /// Report an invariant violation. Logged here so it is visible even if the caller discards it.
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        log::error!("internal invariant violated: {message}");
        TamperError::Internal(message)
    }
}
