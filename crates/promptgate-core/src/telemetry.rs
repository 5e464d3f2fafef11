//! Per-request observability event assembly
//!
//! A builder accumulates routing outcome, stage timings, token usage, and
//! attempt history over the life of one `chat_completion` call, then emits a
//! single structured event through the optional sink. Emission is
//! fire-and-forget: a panicking or misbehaving sink cannot affect the
//! request's return value.

use crate::providers::TokenUsage;
use crate::router::RoutingReason;
use serde::Serialize;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Callback that receives the finished event.
pub type ObservabilitySink = Arc<dyn Fn(&ObservabilityEvent) + Send + Sync>;

/// The per-request structured event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityEvent {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Wall-clock UTC, RFC 3339.
    pub timestamp: String,
    pub sdk_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub prompt_id: String,
    pub variant_id: String,
    pub routing_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_tags: Option<Vec<String>>,
    pub timings: Timings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_request_id: Option<String>,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallbacks: Option<Vec<FallbackAttempt>>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_context: Option<ExperimentContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

/// Stage durations in milliseconds, measured from builder construction on a
/// monotonic clock. `retries` counts non-terminal failed attempts.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u64>,
}

/// One non-terminal failed attempt in the fallback chain.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackAttempt {
    pub provider: String,
    pub model: String,
    pub reason: String,
}

/// Error payload of a failed request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Routing-experiment context attached when a weighted layer decided.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub weighted_selection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_weight: Option<f64>,
}

/// Accumulates one [`ObservabilityEvent`]. Consumed by the build methods, so
/// emission happens exactly once per request.
pub struct ObservabilityBuilder {
    started: Instant,
    event: ObservabilityEvent,
    sink: Option<ObservabilitySink>,
}

impl ObservabilityBuilder {
    pub fn new(
        prompt_id: impl Into<String>,
        user_id: Option<String>,
        environment: Option<String>,
        sink: Option<ObservabilitySink>,
    ) -> Self {
        Self {
            started: Instant::now(),
            event: ObservabilityEvent {
                request_id: uuid::Uuid::new_v4().to_string(),
                user_id,
                timestamp: chrono::Utc::now().to_rfc3339(),
                sdk_version: crate::VERSION.to_string(),
                environment,
                prompt_id: prompt_id.into(),
                variant_id: "unknown".to_string(),
                routing_reason: RoutingReason::Default.as_str().to_string(),
                routing_tags: None,
                timings: Timings::default(),
                token_usage: None,
                provider: "unknown".to_string(),
                model: "unknown".to_string(),
                provider_request_id: None,
                fallback_used: false,
                fallbacks: None,
                success: false,
                error: None,
                experiment_context: None,
                custom: None,
            },
            sink,
        }
    }

    pub fn set_variant_id(&mut self, variant_id: impl Into<String>) {
        self.event.variant_id = variant_id.into();
    }

    pub fn set_routing(&mut self, reason: RoutingReason, tags: Option<Vec<String>>) {
        self.event.routing_reason = reason.as_str().to_string();
        self.event.routing_tags = tags;
    }

    pub fn set_experiment_context(&mut self, context: ExperimentContext) {
        self.event.experiment_context = Some(context);
    }

    /// Record the duration from construction to now as the template stage.
    pub fn mark_template(&mut self) {
        self.event.timings.template = Some(self.elapsed_ms());
    }

    /// Record the duration from construction to now as the provider stage.
    pub fn mark_provider(&mut self) {
        self.event.timings.provider = Some(self.elapsed_ms());
    }

    pub fn set_provider(&mut self, provider: impl Into<String>, model: impl Into<String>) {
        self.event.provider = provider.into();
        self.event.model = model.into();
    }

    pub fn set_provider_request_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !id.is_empty() {
            self.event.provider_request_id = Some(id);
        }
    }

    pub fn set_token_usage(&mut self, usage: TokenUsage) {
        self.event.token_usage = Some(usage);
    }

    pub fn set_custom(&mut self, custom: Value) {
        self.event.custom = Some(custom);
    }

    /// Append one non-terminal failed attempt.
    pub fn add_fallback_attempt(&mut self, attempt: FallbackAttempt) {
        self.event.fallbacks.get_or_insert_with(Vec::new).push(attempt);
    }

    pub fn build_success(self) {
        self.finalize(true, None);
    }

    pub fn build_error(self, error: EventError) {
        self.finalize(false, Some(error));
    }

    fn finalize(mut self, success: bool, error: Option<EventError>) {
        self.event.success = success;
        self.event.error = error;
        self.event.timings.total = self.elapsed_ms();

        if let Some(fallbacks) = &self.event.fallbacks {
            self.event.fallback_used = !fallbacks.is_empty();
            self.event.timings.retries = Some(fallbacks.len() as u64);
        }

        if let Some(sink) = &self.sink {
            let event = &self.event;
            if catch_unwind(AssertUnwindSafe(|| sink(event))).is_err() {
                tracing::warn!(
                    request_id = %self.event.request_id,
                    "observability sink panicked; event dropped"
                );
            }
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collecting_sink() -> (ObservabilitySink, Arc<Mutex<Vec<ObservabilityEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events2 = events.clone();
        let sink: ObservabilitySink =
            Arc::new(move |event| events2.lock().unwrap().push(event.clone()));
        (sink, events)
    }

    #[test]
    fn test_success_event_shape() {
        let (sink, events) = collecting_sink();
        let mut builder = ObservabilityBuilder::new(
            "greeting",
            Some("alice".to_string()),
            Some("dev".to_string()),
            Some(sink),
        );
        builder.set_variant_id("v1");
        builder.set_routing(RoutingReason::TagMatch, Some(vec!["US".to_string()]));
        builder.mark_template();
        builder.set_provider("openai", "gpt-4o");
        builder.set_provider_request_id("req-9");
        builder.set_token_usage(TokenUsage {
            prompt_tokens: 5,
            completion_tokens: 2,
            total_tokens: 7,
        });
        builder.mark_provider();
        builder.build_success();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(event.success);
        assert_eq!(event.variant_id, "v1");
        assert_eq!(event.routing_reason, "tag-match");
        assert_eq!(event.provider, "openai");
        assert!(!event.fallback_used);
        assert!(event.timings.template.is_some());
        assert!(event.error.is_none());
        assert!(!event.request_id.is_empty());
    }

    #[test]
    fn test_error_event_with_fallbacks() {
        let (sink, events) = collecting_sink();
        let mut builder = ObservabilityBuilder::new("greeting", None, None, Some(sink));
        builder.add_fallback_attempt(FallbackAttempt {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            reason: "rate-limit".to_string(),
        });
        builder.build_error(EventError {
            error_type: "execution-error".to_string(),
            message: "all targets exhausted".to_string(),
            code: None,
            retryable: true,
            provider: Some("anthropic".to_string()),
            http_status: Some(429),
            stack: None,
        });

        let events = events.lock().unwrap();
        let event = &events[0];
        assert!(!event.success);
        assert!(event.fallback_used);
        assert_eq!(event.timings.retries, Some(1));
        assert_eq!(event.error.as_ref().unwrap().error_type, "execution-error");
    }

    #[test]
    fn test_panicking_sink_is_isolated() {
        let sink: ObservabilitySink = Arc::new(|_| panic!("sink exploded"));
        let builder = ObservabilityBuilder::new("p", None, None, Some(sink));
        // Must not propagate the panic.
        builder.build_success();
    }

    #[test]
    fn test_no_sink_is_fine() {
        ObservabilityBuilder::new("p", None, None, None).build_success();
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let (sink, events) = collecting_sink();
        let builder = ObservabilityBuilder::new("p", None, None, Some(sink));
        builder.build_success();
        let event = &events.lock().unwrap()[0];
        let value = serde_json::to_value(event).unwrap();
        assert!(value.get("requestId").is_some());
        assert!(value.get("promptId").is_some());
        assert!(value.get("sdkVersion").is_some());
        assert!(value.get("fallbackUsed").is_some());
        assert_eq!(value["variantId"], "unknown");
    }
}
