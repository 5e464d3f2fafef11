//! Google-shaped chat completion adapter
//!
//! System messages become the `systemInstruction` field; the remaining
//! conversation is serialized into a single prompt with `User:` /
//! `Assistant:` prefixes. Structured output is requested natively through
//! `responseSchema` plus a JSON MIME type on the generation config.

use super::error::ProviderError;
use super::wire::{post_json, str_field};
use super::{ChatMessage, ChatOptions, ChatResponse, Choice, ProviderAdapter, TokenUsage};
use crate::config::{MessageRole, ResponseFormat};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const GOOGLE_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GoogleAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GoogleAdapter {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| GOOGLE_DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_request(options: &ChatOptions) -> Value {
        let (system, rest) = super::fold_system(&options.messages);

        let prompt = rest
            .iter()
            .map(|m| {
                let prefix = match m.role {
                    MessageRole::Assistant => "Assistant: ",
                    _ => "User: ",
                };
                format!("{}{}", prefix, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut generation_config = options.params.clone();
        if let ResponseFormat::JsonSchema { .. } = &options.response_format {
            generation_config.insert(
                "responseSchema".to_string(),
                options.response_schema.clone().unwrap_or_else(|| json!({})),
            );
            generation_config.insert(
                "responseMimeType".to_string(),
                json!("application/json"),
            );
        }

        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        });
        if let Some(system) = system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        body
    }

    fn normalize_response(wire: &Value, requested_model: &str) -> Result<ChatResponse, ProviderError> {
        let candidate = wire
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .ok_or_else(|| ProviderError::terminal("response carries no candidates"))?;

        let text = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = wire.get("usageMetadata").map(|usage| {
            let prompt = usage["promptTokenCount"].as_u64().unwrap_or(0);
            let completion = usage["candidatesTokenCount"].as_u64().unwrap_or(0);
            let total = usage["totalTokenCount"].as_u64().unwrap_or(prompt + completion);
            TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: total,
            }
        });

        Ok(ChatResponse {
            id: str_field(wire, "responseId").unwrap_or_default(),
            model: str_field(wire, "modelVersion").unwrap_or_else(|| requested_model.to_string()),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::new(MessageRole::Assistant, text),
                finish_reason: str_field(candidate, "finishReason").map(normalize_finish_reason),
            }],
            usage,
        })
    }
}

fn normalize_finish_reason(reason: String) -> String {
    match reason.as_str() {
        "STOP" => "stop".to_string(),
        "MAX_TOKENS" => "length".to_string(),
        other => other.to_lowercase(),
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    async fn chat_completion(
        &self,
        options: ChatOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, options.model
        );
        let body = Self::build_request(&options);
        let headers = [("x-goog-api-key", self.api_key.clone())];

        let response = post_json(&self.client, &url, &headers, &body).await?;
        Self::normalize_response(&response, &options.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn options() -> ChatOptions {
        ChatOptions {
            model: "gemini-2.5-pro".to_string(),
            messages: vec![
                ChatMessage::new(MessageRole::System, "be brief"),
                ChatMessage::new(MessageRole::User, "hello"),
                ChatMessage::new(MessageRole::Assistant, "hi"),
                ChatMessage::new(MessageRole::User, "bye"),
            ],
            user_id: None,
            response_format: ResponseFormat::RawText,
            response_schema: None,
            params: Map::new(),
        }
    }

    #[test]
    fn test_conversation_serialized_into_single_prompt() {
        let body = GoogleAdapter::build_request(&options());
        assert_eq!(
            body["contents"][0]["parts"][0]["text"],
            "User: hello\n\nAssistant: hi\n\nUser: bye"
        );
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
    }

    #[test]
    fn test_generation_config_carries_params() {
        let mut opts = options();
        opts.params.insert("maxOutputTokens".to_string(), json!(64));
        opts.params.insert("topP".to_string(), json!(0.9));

        let body = GoogleAdapter::build_request(&opts);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
        assert_eq!(body["generationConfig"]["topP"], 0.9);
    }

    #[test]
    fn test_structured_output_sets_schema_and_mime() {
        let mut opts = options();
        opts.response_format = ResponseFormat::JsonSchema {
            schema_ref: "person".to_string(),
        };
        opts.response_schema = Some(json!({"type": "object"}));

        let body = GoogleAdapter::build_request(&opts);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            body["generationConfig"]["responseSchema"],
            json!({"type": "object"})
        );
    }

    #[test]
    fn test_normalize_response() {
        let wire = json!({
            "responseId": "resp-1",
            "modelVersion": "gemini-2.5-pro-001",
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 7,
                "candidatesTokenCount": 2,
                "totalTokenCount": 9
            }
        });
        let normalized = GoogleAdapter::normalize_response(&wire, "gemini-2.5-pro").unwrap();
        assert_eq!(normalized.id, "resp-1");
        assert_eq!(normalized.model, "gemini-2.5-pro-001");
        assert_eq!(normalized.content_text(), Some("Hello there"));
        assert_eq!(normalized.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(normalized.usage.unwrap().total_tokens, 9);
    }

    #[test]
    fn test_missing_candidates_is_terminal() {
        let err = GoogleAdapter::normalize_response(&json!({}), "m").unwrap_err();
        assert!(!err.retryable);
    }
}
