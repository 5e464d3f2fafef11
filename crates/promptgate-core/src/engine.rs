//! The orchestrator: configuration cache, provider cache, and the two public
//! operations `get_template` and `chat_completion`
//!
//! The parsed configuration is loaded once per engine with single-flight
//! semantics; provider adapters are created lazily per type and shared across
//! requests. Neither cache is ever evicted.

use crate::config::{
    load_and_validate_config, Config, ProviderType, ResponseFormat, Variant,
};
use crate::error::{Error, Result};
use crate::fallback::{execute_with_fallback, AttemptOutcome, ExecutionTarget, FallbackFailure};
use crate::params::map_parameters;
use crate::providers::{
    AnthropicAdapter, ChatMessage, ChatOptions, ChatResponse, GoogleAdapter, OpenAiAdapter,
    ProviderAdapter,
};
use crate::router::select_variant;
use crate::telemetry::{
    EventError, ExperimentContext, FallbackAttempt, ObservabilityBuilder, ObservabilitySink,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Deployment environment recorded on every observability event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

/// Per-provider base URL overrides; the public endpoints are used when unset.
#[derive(Debug, Clone, Default)]
pub struct ProviderBaseUrls {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub google: Option<String>,
}

/// Everything the engine needs at construction time. API keys are passed
/// through here; the core reads no environment variables.
#[derive(Clone)]
pub struct RuntimeConfig {
    pub config_path: PathBuf,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub environment: Environment,
    pub on_observability: Option<ObservabilitySink>,
    pub provider_base_urls: ProviderBaseUrls,
}

impl RuntimeConfig {
    pub fn new(config_path: impl Into<PathBuf>, environment: Environment) -> Self {
        Self {
            config_path: config_path.into(),
            openai_api_key: None,
            anthropic_api_key: None,
            google_api_key: None,
            environment,
            on_observability: None,
            provider_base_urls: ProviderBaseUrls::default(),
        }
    }
}

/// Parameters for [`Engine::get_template`].
#[derive(Debug, Clone)]
pub struct GetTemplateParams {
    pub prompt_id: String,
    /// Defaults to the prompt's default variant when absent.
    pub variant_id: Option<String>,
    pub variables: Value,
}

/// Parameters for [`Engine::chat_completion`].
#[derive(Debug, Clone)]
pub struct ChatCompletionParams {
    pub prompt_id: String,
    pub variables: Value,
    /// Prepended ahead of the rendered messages.
    pub message_history: Vec<ChatMessage>,
    pub user_id: Option<String>,
    pub tags: Vec<String>,
    /// Epoch seconds used to gate phased rollouts; wall clock when absent.
    pub unix_time: Option<i64>,
}

impl ChatCompletionParams {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            variables: json!({}),
            message_history: Vec::new(),
            user_id: None,
            tags: Vec::new(),
            unix_time: None,
        }
    }
}

/// The prompt routing and execution engine.
pub struct Engine {
    runtime: RuntimeConfig,
    config: tokio::sync::OnceCell<Arc<Config>>,
    templates: crate::template::TemplateEngine,
    openai: once_cell::sync::OnceCell<Arc<dyn ProviderAdapter>>,
    anthropic: once_cell::sync::OnceCell<Arc<dyn ProviderAdapter>>,
    google: once_cell::sync::OnceCell<Arc<dyn ProviderAdapter>>,
}

impl Engine {
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self {
            runtime,
            config: tokio::sync::OnceCell::new(),
            templates: crate::template::TemplateEngine::new(),
            openai: once_cell::sync::OnceCell::new(),
            anthropic: once_cell::sync::OnceCell::new(),
            google: once_cell::sync::OnceCell::new(),
        }
    }

    /// The cached configuration; concurrent first callers share one load.
    pub async fn config(&self) -> Result<&Arc<Config>> {
        self.config
            .get_or_try_init(|| async {
                load_and_validate_config(&self.runtime.config_path).map(Arc::new)
            })
            .await
    }

    /// Resolve prompt and variant, render every message, and return the
    /// rendered list. Does not route, touch providers, or emit telemetry.
    pub async fn get_template(&self, params: GetTemplateParams) -> Result<Vec<ChatMessage>> {
        let config = self.config().await?;
        let prompt = config.prompts.get(&params.prompt_id).ok_or_else(|| {
            Error::execution_with(
                format!("unknown prompt '{}'", params.prompt_id),
                json!({"promptId": params.prompt_id}),
            )
        })?;

        let (variant_id, variant) = match &params.variant_id {
            Some(id) => {
                let variant = prompt.variants.get(id).ok_or_else(|| {
                    Error::execution_with(
                        format!("unknown variant '{}' of prompt '{}'", id, params.prompt_id),
                        json!({"promptId": params.prompt_id, "variantId": id}),
                    )
                })?;
                (id.clone(), variant)
            }
            None => {
                let (id, variant) = prompt.default_variant().ok_or_else(|| {
                    Error::execution_with(
                        format!("prompt '{}' has no default variant", params.prompt_id),
                        json!({"promptId": params.prompt_id}),
                    )
                })?;
                (id.clone(), variant)
            }
        };

        tracing::debug!(prompt = %params.prompt_id, variant = %variant_id, "rendering template");
        self.render_messages(variant, &params.variables)
    }

    /// Route, render, and execute one chat completion with fallback. Exactly
    /// one observability event is emitted per call when a sink is configured.
    #[tracing::instrument(skip(self, params), fields(prompt_id = %params.prompt_id))]
    pub async fn chat_completion(&self, params: ChatCompletionParams) -> Result<ChatResponse> {
        let mut telemetry = ObservabilityBuilder::new(
            params.prompt_id.clone(),
            params.user_id.clone(),
            Some(self.runtime.environment.as_str().to_string()),
            self.runtime.on_observability.clone(),
        );

        match self.chat_completion_inner(&params, &mut telemetry).await {
            Ok(response) => {
                telemetry.build_success();
                Ok(response)
            }
            Err(err) => {
                telemetry.build_error(event_error_from(&err));
                Err(err)
            }
        }
    }

    async fn chat_completion_inner(
        &self,
        params: &ChatCompletionParams,
        telemetry: &mut ObservabilityBuilder,
    ) -> Result<ChatResponse> {
        let config = self.config().await?;
        let prompt = config.prompts.get(&params.prompt_id).ok_or_else(|| {
            Error::execution_with(
                format!("unknown prompt '{}'", params.prompt_id),
                json!({"promptId": params.prompt_id}),
            )
        })?;

        // Route.
        let now = params
            .unix_time
            .unwrap_or_else(|| chrono::Utc::now().timestamp());
        let selection = select_variant(
            prompt,
            &params.prompt_id,
            params.user_id.as_deref(),
            &params.tags,
            now,
        )?;
        telemetry.set_variant_id(selection.variant_id.clone());
        let routing_tags = (!params.tags.is_empty()).then(|| params.tags.clone());
        telemetry.set_routing(selection.reason, routing_tags.clone());
        if selection.weight.is_some() {
            telemetry.set_experiment_context(ExperimentContext {
                tags: routing_tags,
                weighted_selection: true,
                selected_weight: selection.weight,
            });
        }
        let variant = selection.variant;

        // Render; a template failure inside chat_completion is a runtime
        // failure, so it surfaces wrapped as an execution error.
        let rendered = self
            .render_messages(variant, &params.variables)
            .map_err(wrap_template_error)?;
        telemetry.mark_template();

        let mut messages = params.message_history.clone();
        messages.extend(rendered);

        let targets = build_targets(config, variant, &params.prompt_id, &selection.variant_id)?;

        let response_schema = match &variant.response_format {
            ResponseFormat::JsonSchema { schema_ref } => {
                // The validator promoted this lookup to total.
                Some(config.response_schemas.get(schema_ref).cloned().ok_or_else(|| {
                    Error::execution_with(
                        format!("response schema '{}' vanished after validation", schema_ref),
                        json!({"schemaRef": schema_ref}),
                    )
                })?)
            }
            ResponseFormat::RawText => None,
        };

        // Execute across the fallback chain.
        let mut last_failed_provider: Option<String> = None;
        let attempt = |provider: Arc<dyn ProviderAdapter>, target: ExecutionTarget| {
            let options = ChatOptions {
                model: target.model.clone(),
                messages: messages.clone(),
                user_id: params.user_id.clone(),
                response_format: variant.response_format.clone(),
                response_schema: response_schema.clone(),
                params: map_parameters(target.provider_type, &variant.parameters),
            };
            async move { provider.chat_completion(options).await }
        };
        let on_attempt = |outcome: AttemptOutcome<'_>| match outcome.error {
            None => {
                telemetry.set_provider(
                    outcome.target.provider_type.as_str(),
                    outcome.target.model.clone(),
                );
            }
            Some(err) => {
                last_failed_provider = Some(outcome.target.provider_id.clone());
                if err.retryable {
                    telemetry.add_fallback_attempt(FallbackAttempt {
                        provider: outcome.target.provider_id.clone(),
                        model: outcome.target.model.clone(),
                        reason: err.reason.as_str().to_string(),
                    });
                }
            }
        };

        let outcome = execute_with_fallback(
            &targets,
            |target| self.provider_for(target.provider_type),
            attempt,
            on_attempt,
        )
        .await;
        telemetry.mark_provider();

        match outcome {
            Ok(response) => {
                telemetry.set_provider_request_id(response.id.clone());
                if let Some(usage) = response.usage {
                    telemetry.set_token_usage(usage);
                }
                Ok(response)
            }
            Err(FallbackFailure::Fatal(err)) => Err(err),
            Err(FallbackFailure::Provider(err)) => {
                let code = err
                    .code
                    .clone()
                    .unwrap_or_else(|| err.reason.as_str().to_string());
                Err(Error::execution_with(
                    format!(
                        "chat completion for prompt '{}' failed: {}",
                        params.prompt_id, err.message
                    ),
                    json!({
                        "promptId": params.prompt_id,
                        "variantId": selection.variant_id,
                        "cause": "provider-error",
                        "reason": err.reason.as_str(),
                        "retryable": err.retryable,
                        "code": code,
                        "httpStatus": err.http_status,
                        "provider": last_failed_provider,
                        "attempts": targets.len(),
                    }),
                ))
            }
        }
    }

    /// Prompt chains are accepted and reference-checked by the validator,
    /// but no code path executes them; this surfaces that explicitly instead
    /// of inventing semantics.
    pub fn run_chain(&self, prompt_id: &str) -> Result<ChatResponse> {
        Err(Error::execution_with(
            format!("prompt chains are not supported (prompt '{}')", prompt_id),
            json!({"code": "chains-unsupported", "promptId": prompt_id}),
        ))
    }

    fn render_messages(&self, variant: &Variant, variables: &Value) -> Result<Vec<ChatMessage>> {
        variant
            .messages
            .iter()
            .map(|message| {
                let content = self
                    .templates
                    .render(&message.content.template, variables)?;
                Ok(ChatMessage::new(message.role, content))
            })
            .collect()
    }

    /// Lazily construct and cache the adapter for a provider type. A missing
    /// API key for a provider that is actually invoked is fatal.
    fn provider_for(&self, provider_type: ProviderType) -> Result<Arc<dyn ProviderAdapter>> {
        let cell = match provider_type {
            ProviderType::OpenAi => &self.openai,
            ProviderType::Anthropic => &self.anthropic,
            ProviderType::Google => &self.google,
        };

        cell.get_or_try_init(|| {
            let urls = &self.runtime.provider_base_urls;
            let (key, base_url) = match provider_type {
                ProviderType::OpenAi => (&self.runtime.openai_api_key, urls.openai.clone()),
                ProviderType::Anthropic => {
                    (&self.runtime.anthropic_api_key, urls.anthropic.clone())
                }
                ProviderType::Google => (&self.runtime.google_api_key, urls.google.clone()),
            };
            let key = key.as_ref().ok_or_else(|| {
                Error::execution_with(
                    format!("missing API key for provider type '{}'", provider_type),
                    json!({"providerType": provider_type.as_str(), "code": "missing-api-key"}),
                )
            })?;

            tracing::debug!(provider = %provider_type, "creating provider adapter");
            let adapter: Arc<dyn ProviderAdapter> = match provider_type {
                ProviderType::OpenAi => Arc::new(OpenAiAdapter::new(key, base_url)),
                ProviderType::Anthropic => Arc::new(AnthropicAdapter::new(key, base_url)),
                ProviderType::Google => Arc::new(GoogleAdapter::new(key, base_url)),
            };
            Ok(adapter)
        })
        .cloned()
    }
}

/// Build `[primary, ...fallbacks]` with provider types resolved from the
/// configuration. Lookups are total after validation.
fn build_targets(
    config: &Config,
    variant: &Variant,
    prompt_id: &str,
    variant_id: &str,
) -> Result<Vec<ExecutionTarget>> {
    let resolve_type = |provider_id: &str| -> Result<ProviderType> {
        config
            .providers
            .get(provider_id)
            .map(|p| p.provider_type)
            .ok_or_else(|| {
                Error::execution_with(
                    format!("provider '{}' vanished after validation", provider_id),
                    json!({"promptId": prompt_id, "variantId": variant_id}),
                )
            })
    };

    let mut targets = vec![ExecutionTarget {
        provider_id: variant.provider.clone(),
        provider_type: resolve_type(&variant.provider)?,
        model: variant.model.clone(),
    }];

    if let Some(fallback) = &variant.fallback {
        for target in fallback {
            targets.push(ExecutionTarget {
                provider_id: target.provider.clone(),
                provider_type: resolve_type(&target.provider)?,
                model: target.model.clone(),
            });
        }
    }

    Ok(targets)
}

/// Convert a final error into the event's error payload, pulling provider
/// context out of the details bag when present.
fn event_error_from(err: &Error) -> EventError {
    let details = err.details();
    EventError {
        error_type: err.kind().to_string(),
        message: err.message().to_string(),
        code: details["code"].as_str().map(str::to_string),
        retryable: details["retryable"].as_bool().unwrap_or(false),
        provider: details["provider"].as_str().map(str::to_string),
        http_status: details["httpStatus"].as_u64().map(|s| s as u16),
        stack: None,
    }
}

/// Template failures during a chat completion surface as execution errors
/// carrying the original kind in the details bag.
fn wrap_template_error(err: Error) -> Error {
    let mut details = err.details().clone();
    details["cause"] = json!(err.kind());
    Error::execution_with(format!("message rendering failed: {}", err.message()), details)
}
