//! Error types for the promptgate core library
//!
//! Every failure that crosses the public API boundary is one of three kinds:
//! configuration errors from the loader/validator, template errors from the
//! rendering layer, and execution errors from the orchestrator. Provider
//! failures are a fourth, internal kind (`providers::ProviderError`) that the
//! orchestrator converts before surfacing.

use serde_json::{json, Value};
use thiserror::Error;

/// Main error type for promptgate operations
#[derive(Error, Debug)]
pub enum Error {
    /// Raised by the configuration loader and validator. Fatal; surfaced to
    /// the caller verbatim.
    #[error("Configuration error: {message}")]
    Configuration { message: String, details: Value },

    /// Template parse or render failure. The details bag carries the
    /// offending template source and a suggestion hint.
    #[error("Template error: {message}")]
    Template { message: String, details: Value },

    /// Wraps any runtime failure produced by the orchestrator: exhausted
    /// fallbacks, missing API keys, missing prompt/variant, invalid messages.
    #[error("Execution error: {message}")]
    Execution { message: String, details: Value },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable kind code for this error, as seen by callers and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration { .. } => "configuration-error",
            Error::Template { .. } => "template-error",
            Error::Execution { .. } => "execution-error",
        }
    }

    /// The structured details bag attached to this error.
    pub fn details(&self) -> &Value {
        match self {
            Error::Configuration { details, .. }
            | Error::Template { details, .. }
            | Error::Execution { details, .. } => details,
        }
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Configuration { message, .. }
            | Error::Template { message, .. }
            | Error::Execution { message, .. } => message,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn configuration_with(message: impl Into<String>, details: Value) -> Self {
        Error::Configuration {
            message: message.into(),
            details,
        }
    }

    pub fn template(message: impl Into<String>, details: Value) -> Self {
        Error::Template {
            message: message.into(),
            details,
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution {
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn execution_with(message: impl Into<String>, details: Value) -> Self {
        Error::Execution {
            message: message.into(),
            details,
        }
    }
}
