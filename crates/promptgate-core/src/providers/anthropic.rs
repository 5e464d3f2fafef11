//! Anthropic-shaped chat completion adapter
//!
//! System messages are folded into the single `system` prefix the Messages
//! API expects. Structured output is emulated with a forced tool whose input
//! schema is the resolved response schema; the tool's JSON input becomes the
//! returned content.

use super::error::ProviderError;
use super::wire::{post_json, str_field};
use super::{ChatMessage, ChatOptions, ChatResponse, Choice, ProviderAdapter, TokenUsage};
use crate::config::{MessageRole, ResponseFormat};
use async_trait::async_trait;
use serde_json::{json, Value};

pub const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Name of the tool used to force schema-constrained output.
const STRUCTURED_OUTPUT_TOOL: &str = "structured_output";

pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| ANTHROPIC_DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_request(options: &ChatOptions) -> Value {
        let (system, rest) = super::fold_system(&options.messages);

        let messages: Vec<Value> = rest
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "assistant",
                    _ => "user",
                };
                json!({"role": role, "content": m.content})
            })
            .collect();

        let mut body = json!({
            "model": options.model,
            "messages": messages,
        });

        for (key, value) in &options.params {
            body[key] = value.clone();
        }

        if let Some(system) = system {
            body["system"] = json!(system);
        }

        if let Some(user) = &options.user_id {
            body["metadata"] = json!({"user_id": user});
        }

        if let ResponseFormat::JsonSchema { .. } = &options.response_format {
            let schema = options.response_schema.clone().unwrap_or_else(|| json!({}));
            body["tools"] = json!([{
                "name": STRUCTURED_OUTPUT_TOOL,
                "description": "Record the response using the required schema",
                "input_schema": schema,
            }]);
            body["tool_choice"] = json!({"type": "tool", "name": STRUCTURED_OUTPUT_TOOL});
        }

        body
    }

    fn normalize_response(wire: &Value) -> Result<ChatResponse, ProviderError> {
        let content = wire
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::terminal("response carries no content blocks"))?;

        // A forced tool call carries the structured JSON as its input; plain
        // completions concatenate the text blocks.
        let text = match content.iter().find(|block| block["type"] == "tool_use") {
            Some(tool_use) => serde_json::to_string(&tool_use["input"]).map_err(|err| {
                ProviderError::terminal(format!("tool input is not serializable: {}", err))
            })?,
            None => content
                .iter()
                .filter(|block| block["type"] == "text")
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join(""),
        };

        let usage = wire.get("usage").map(|usage| {
            let prompt = usage["input_tokens"].as_u64().unwrap_or(0);
            let completion = usage["output_tokens"].as_u64().unwrap_or(0);
            TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }
        });

        Ok(ChatResponse {
            id: str_field(wire, "id").unwrap_or_default(),
            model: str_field(wire, "model").unwrap_or_default(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::new(MessageRole::Assistant, text),
                finish_reason: str_field(wire, "stop_reason").map(normalize_stop_reason),
            }],
            usage,
        })
    }
}

fn normalize_stop_reason(reason: String) -> String {
    match reason.as_str() {
        "end_turn" | "stop_sequence" | "tool_use" => "stop".to_string(),
        "max_tokens" => "length".to_string(),
        _ => reason,
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn chat_completion(
        &self,
        options: ChatOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_request(&options);
        let headers = [
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", ANTHROPIC_API_VERSION.to_string()),
        ];

        let response = post_json(&self.client, &url, &headers, &body).await?;
        Self::normalize_response(&response)
    }
}
