//! Engine integration tests against mock provider endpoints

use promptgate_core::{
    ChatCompletionParams, ChatMessage, Engine, Environment, GetTemplateParams, ObservabilityEvent,
    RuntimeConfig,
};
use promptgate_core::config::MessageRole;
use serde_json::json;
use std::io::Write;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_json() -> String {
    json!({
        "version": "1.0.0",
        "providers": {
            "openai-main": {"type": "openai"},
            "anthropic-backup": {"type": "anthropic"},
            "google-extra": {"type": "google"}
        },
        "prompts": {
            "greeting": {
                "variants": {
                    "v_default": {
                        "provider": "openai-main",
                        "model": "gpt-4o",
                        "default": true,
                        "parameters": {"temperature": 0.5, "max_tokens": 100},
                        "messages": [
                            {"role": "system", "content": {"template": "You are terse."}},
                            {"role": "user", "content": {"template": "Hello {{ name | default: \"friend\" }}!"}}
                        ],
                        "fallback": [
                            {"provider": "anthropic-backup", "model": "claude-sonnet-4"}
                        ]
                    }
                },
                "routing": {"rules": [{"target": "v_default"}]}
            },
            "listing": {
                "variants": {
                    "v1": {
                        "provider": "openai-main",
                        "model": "gpt-4o",
                        "default": true,
                        "messages": [
                            {"role": "user", "content": {"template": "Items: {{items | join: \", \"}} ({{items | size}} total)"}}
                        ]
                    }
                },
                "routing": {"rules": [{"target": "v1"}]}
            },
            "gemini-only": {
                "variants": {
                    "v1": {
                        "provider": "google-extra",
                        "model": "gemini-2.5-pro",
                        "default": true,
                        "messages": [{"role": "user", "content": {"template": "hi"}}]
                    }
                },
                "routing": {"rules": [{"target": "v1"}]}
            }
        }
    })
    .to_string()
}

struct Harness {
    engine: Engine,
    events: Arc<Mutex<Vec<ObservabilityEvent>>>,
    // Held so the config file outlives the engine.
    _config_file: tempfile::NamedTempFile,
}

fn harness(openai: &MockServer, anthropic: &MockServer) -> Harness {
    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    config_file.write_all(config_json().as_bytes()).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();

    let mut runtime = RuntimeConfig::new(config_file.path(), Environment::Dev);
    runtime.openai_api_key = Some("sk-test".to_string());
    runtime.anthropic_api_key = Some("ak-test".to_string());
    runtime.provider_base_urls.openai = Some(openai.uri());
    runtime.provider_base_urls.anthropic = Some(anthropic.uri());
    runtime.on_observability = Some(Arc::new(move |event: &ObservabilityEvent| {
        sink_events.lock().unwrap().push(event.clone());
    }));

    Harness {
        engine: Engine::new(runtime),
        events,
        _config_file: config_file,
    }
}

fn openai_success_body() -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "hi from openai"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
    })
}

fn anthropic_success_body() -> serde_json::Value {
    json!({
        "id": "msg_ok",
        "model": "claude-sonnet-4",
        "content": [{"type": "text", "text": "hi from anthropic"}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 5, "output_tokens": 3}
    })
}

#[tokio::test]
async fn chat_completion_happy_path_maps_parameters() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    // The canonical bag {temperature: 0.5, max_tokens: 100} must arrive in
    // OpenAI-native form, and the rendered messages after the system one.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "temperature": 1,
            "max_completion_tokens": 100,
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "Hello friend!"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .expect(1)
        .mount(&openai)
        .await;

    let h = harness(&openai, &anthropic);
    let response = h
        .engine
        .chat_completion(ChatCompletionParams::new("greeting"))
        .await
        .unwrap();

    assert_eq!(response.content_text(), Some("hi from openai"));
    assert_eq!(response.usage.unwrap().total_tokens, 12);

    let events = h.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert!(event.success);
    assert!(!event.fallback_used);
    assert_eq!(event.provider, "openai");
    assert_eq!(event.model, "gpt-4o");
    assert_eq!(event.variant_id, "v_default");
    assert_eq!(event.provider_request_id.as_deref(), Some("chatcmpl-1"));
    assert_eq!(event.token_usage.unwrap().total_tokens, 12);
}

#[tokio::test]
async fn fallback_succeeds_on_second_attempt() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": "rate_limit_exceeded", "message": "slow down"}
        })))
        .expect(1)
        .mount(&openai)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"system": "You are terse."})))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_success_body()))
        .expect(1)
        .mount(&anthropic)
        .await;

    let h = harness(&openai, &anthropic);
    let response = h
        .engine
        .chat_completion(ChatCompletionParams::new("greeting"))
        .await
        .unwrap();

    assert_eq!(response.content_text(), Some("hi from anthropic"));

    let events = h.events.lock().unwrap();
    let event = &events[0];
    assert!(event.success);
    assert!(event.fallback_used);
    assert_eq!(event.provider, "anthropic");
    assert_eq!(event.model, "claude-sonnet-4");
    let fallbacks = event.fallbacks.as_ref().unwrap();
    assert_eq!(fallbacks.len(), 1);
    assert_eq!(fallbacks[0].provider, "openai-main");
    assert_eq!(fallbacks[0].reason, "rate-limit");
}

#[tokio::test]
async fn non_retryable_failure_short_circuits() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "invalid_request_error", "message": "bad payload"}
        })))
        .expect(1)
        .mount(&openai)
        .await;

    // The fallback target must never be tried.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_success_body()))
        .expect(0)
        .mount(&anthropic)
        .await;

    let h = harness(&openai, &anthropic);
    let err = h
        .engine
        .chat_completion(ChatCompletionParams::new("greeting"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "execution-error");
    assert_eq!(err.details()["httpStatus"], 400);
    assert_eq!(err.details()["retryable"], false);
    assert_eq!(err.details()["provider"], "openai-main");

    let events = h.events.lock().unwrap();
    let event = &events[0];
    assert!(!event.success);
    // Terminal failures are not fallback attempts.
    assert!(event.fallbacks.is_none());
    let event_error = event.error.as_ref().unwrap();
    assert_eq!(event_error.error_type, "execution-error");
    assert_eq!(event_error.http_status, Some(400));
}

#[tokio::test]
async fn exhausted_fallbacks_surface_last_error() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": "rate_limit_exceeded", "message": "primary limited"}
        })))
        .expect(1)
        .mount(&openai)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(504).set_body_json(json!({
            "type": "error",
            "error": {"type": "timeout_error", "message": "upstream timeout"}
        })))
        .expect(1)
        .mount(&anthropic)
        .await;

    let h = harness(&openai, &anthropic);
    let err = h
        .engine
        .chat_completion(ChatCompletionParams::new("greeting"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "execution-error");
    assert!(err.message().contains("upstream timeout"));
    assert_eq!(err.details()["reason"], "timeout");
    assert_eq!(err.details()["attempts"], 2);

    let events = h.events.lock().unwrap();
    let event = &events[0];
    assert!(!event.success);
    let fallbacks = event.fallbacks.as_ref().unwrap();
    assert_eq!(fallbacks.len(), 2);
    assert_eq!(fallbacks[0].reason, "rate-limit");
    assert_eq!(fallbacks[1].reason, "timeout");
}

#[tokio::test]
async fn message_history_is_prepended() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "user", "content": "earlier question"},
                {"role": "assistant", "content": "earlier answer"},
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "Hello Ada!"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_success_body()))
        .expect(1)
        .mount(&openai)
        .await;

    let h = harness(&openai, &anthropic);
    let mut params = ChatCompletionParams::new("greeting");
    params.variables = json!({"name": "Ada"});
    params.message_history = vec![
        ChatMessage::new(MessageRole::User, "earlier question"),
        ChatMessage::new(MessageRole::Assistant, "earlier answer"),
    ];
    h.engine.chat_completion(params).await.unwrap();
}

#[tokio::test]
async fn get_template_renders_without_touching_providers() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;
    let h = harness(&openai, &anthropic);

    let messages = h
        .engine
        .get_template(GetTemplateParams {
            prompt_id: "listing".to_string(),
            variant_id: None,
            variables: json!({"items": ["a", "b", "c"]}),
        })
        .await
        .unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "Items: a, b, c (3 total)");

    // No telemetry and no HTTP for template-only calls.
    assert!(h.events.lock().unwrap().is_empty());
    assert!(openai.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_api_key_is_fatal_without_fallback() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;
    let h = harness(&openai, &anthropic); // no google key configured

    let err = h
        .engine
        .chat_completion(ChatCompletionParams::new("gemini-only"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "execution-error");
    assert_eq!(err.details()["code"], "missing-api-key");

    let events = h.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(!events[0].success);
}

#[tokio::test]
async fn unknown_prompt_still_emits_one_event() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;
    let h = harness(&openai, &anthropic);

    let err = h
        .engine
        .chat_completion(ChatCompletionParams::new("nope"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "execution-error");

    let events = h.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].variant_id, "unknown");
    assert!(!events[0].success);
}

#[tokio::test]
async fn config_is_loaded_once_and_shared() {
    let openai = MockServer::start().await;
    let anthropic = MockServer::start().await;
    let h = harness(&openai, &anthropic);

    let first = Arc::as_ptr(h.engine.config().await.unwrap());
    let second = Arc::as_ptr(h.engine.config().await.unwrap());
    assert_eq!(first, second);
}
