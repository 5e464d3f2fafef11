//! Provider error normalization and retry classification
//!
//! Every failure inside a provider adapter is wrapped into a
//! [`ProviderError`] carrying a sub-reason and a retryability flag. The
//! fallback executor recovers retryable errors by moving to the next target;
//! everything else is terminal. This type never crosses the public API; the
//! orchestrator converts the final one into an execution error.

use serde::Serialize;
use serde_json::Value;

/// Sub-reason for a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderErrorReason {
    RateLimit,
    Timeout,
    ProviderError,
}

impl ProviderErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorReason::RateLimit => "rate-limit",
            ProviderErrorReason::Timeout => "timeout",
            ProviderErrorReason::ProviderError => "provider-error",
        }
    }
}

impl std::fmt::Display for ProviderErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized provider failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct ProviderError {
    pub reason: ProviderErrorReason,
    pub retryable: bool,
    /// Provider-specific error code, when the error body carried one.
    pub code: Option<String>,
    pub http_status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    /// Classify an HTTP failure status: 429 is a retryable rate limit,
    /// 408/504 are retryable timeouts, everything else is terminal.
    pub fn from_status(status: u16, body: Option<&Value>) -> Self {
        let (reason, retryable) = match status {
            429 => (ProviderErrorReason::RateLimit, true),
            408 | 504 => (ProviderErrorReason::Timeout, true),
            _ => (ProviderErrorReason::ProviderError, false),
        };

        let (code, message) = extract_error_body(body)
            .unwrap_or_else(|| (None, format!("provider returned HTTP {}", status)));

        Self {
            reason,
            retryable,
            code,
            http_status: Some(status),
            message,
        }
    }

    /// Classify a transport-level failure. Timeouts (including a cancelled
    /// caller deadline) are retryable so that fallback proceeds; every other
    /// transport failure is terminal.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self {
                reason: ProviderErrorReason::Timeout,
                retryable: true,
                code: None,
                http_status: None,
                message: format!("request timed out: {}", err),
            }
        } else {
            Self::terminal(format!("transport failure: {}", err))
        }
    }

    /// A terminal provider error without HTTP context.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            reason: ProviderErrorReason::ProviderError,
            retryable: false,
            code: None,
            http_status: None,
            message: message.into(),
        }
    }

    #[cfg(test)]
    pub fn retryable_rate_limit(message: impl Into<String>) -> Self {
        Self {
            reason: ProviderErrorReason::RateLimit,
            retryable: true,
            code: None,
            http_status: Some(429),
            message: message.into(),
        }
    }
}

/// Pull a code and message out of a provider error body. Tries the OpenAI
/// shape, then the Anthropic shape, then a bare `message` field.
fn extract_error_body(body: Option<&Value>) -> Option<(Option<String>, String)> {
    let json = body?;

    if let Some(error) = json.get("error") {
        let code = error
            .get("code")
            .or_else(|| error.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            return Some((code, message.to_string()));
        }
    }

    if let Some(error_type) = json.get("type").and_then(Value::as_str) {
        if let Some(message) = json.get("message").and_then(Value::as_str) {
            return Some((Some(error_type.to_string()), message.to_string()));
        }
    }

    json.get("message")
        .and_then(Value::as_str)
        .map(|m| (None, m.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rate_limit_classification() {
        let err = ProviderError::from_status(429, None);
        assert_eq!(err.reason, ProviderErrorReason::RateLimit);
        assert!(err.retryable);
        assert_eq!(err.http_status, Some(429));
    }

    #[test]
    fn test_timeout_classification() {
        for status in [408, 504] {
            let err = ProviderError::from_status(status, None);
            assert_eq!(err.reason, ProviderErrorReason::Timeout);
            assert!(err.retryable);
        }
    }

    #[test]
    fn test_other_statuses_terminal() {
        for status in [400, 401, 403, 500, 502, 503] {
            let err = ProviderError::from_status(status, None);
            assert_eq!(err.reason, ProviderErrorReason::ProviderError);
            assert!(!err.retryable, "status {} must be terminal", status);
        }
    }

    #[test]
    fn test_openai_error_body_extraction() {
        let body = json!({
            "error": {"code": "rate_limit_exceeded", "message": "Slow down"}
        });
        let err = ProviderError::from_status(429, Some(&body));
        assert_eq!(err.code.as_deref(), Some("rate_limit_exceeded"));
        assert_eq!(err.message, "Slow down");
    }

    #[test]
    fn test_anthropic_error_body_extraction() {
        let body = json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        });
        let err = ProviderError::from_status(529, Some(&body));
        assert_eq!(err.code.as_deref(), Some("overloaded_error"));
        assert_eq!(err.message, "Overloaded");
    }

    #[test]
    fn test_reason_serialization() {
        assert_eq!(
            serde_json::to_value(ProviderErrorReason::RateLimit).unwrap(),
            json!("rate-limit")
        );
        assert_eq!(
            serde_json::to_value(ProviderErrorReason::ProviderError).unwrap(),
            json!("provider-error")
        );
    }
}
