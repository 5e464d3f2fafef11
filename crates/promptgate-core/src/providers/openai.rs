//! OpenAI-shaped chat completion adapter

use super::error::ProviderError;
use super::wire::post_json;
use super::{ChatOptions, ChatResponse, ProviderAdapter};
use crate::config::ResponseFormat;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_request(options: &ChatOptions) -> Value {
        let messages: Vec<Value> = options
            .messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": options.model,
            "messages": messages,
        });

        for (key, value) in &options.params {
            body[key] = value.clone();
        }

        if let Some(user) = &options.user_id {
            body["user"] = json!(user);
        }

        if let ResponseFormat::JsonSchema { schema_ref } = &options.response_format {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema_ref,
                    "schema": options.response_schema.clone().unwrap_or_else(|| json!({})),
                    "strict": true,
                }
            });
        }

        body
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn chat_completion(
        &self,
        options: ChatOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::build_request(&options);
        let headers = [("Authorization", format!("Bearer {}", self.api_key))];

        let response = post_json(&self.client, &url, &headers, &body).await?;

        // The wire format already matches the normalized shape.
        serde_json::from_value(response).map_err(|err| {
            ProviderError::terminal(format!("unexpected chat completion shape: {}", err))
        })
    }
}
