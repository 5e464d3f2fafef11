//! Configuration data model
//!
//! These types mirror the JSON configuration document one-to-one. They are
//! deserialized only after the structural pass has accepted the raw value, so
//! downstream code can rely on every field being well-formed; the semantic
//! pass additionally promotes every cross-reference lookup to total.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Root configuration entity. Loaded once, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Semantic version string; only major version 1 is accepted.
    pub version: String,

    /// Provider alias -> provider declaration.
    pub providers: HashMap<String, ProviderConfig>,

    /// Schema identifier -> JSON-Schema fragment.
    #[serde(rename = "responseSchemas", default)]
    pub response_schemas: HashMap<String, Value>,

    /// Prompt identifier -> prompt declaration.
    pub prompts: HashMap<String, Prompt>,
}

/// A provider declaration: a type plus provider-specific extras.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,

    /// Provider-specific extras are accepted without inspection.
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// The provider families this engine can execute against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAi => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Google => "google",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named prompt with its variants and routing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(default)]
    pub description: String,

    /// Variant identifier -> variant. Exactly one carries `default = true`.
    pub variants: HashMap<String, Variant>,

    pub routing: Routing,

    /// Accepted and reference-checked only; execution is unsupported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chains: Option<Vec<ChainStep>>,
}

impl Prompt {
    /// The variant marked `default = true`. The validator guarantees exactly
    /// one exists, so a miss here is a programming error in the caller.
    pub fn default_variant(&self) -> Option<(&String, &Variant)> {
        self.variants.iter().find(|(_, v)| v.is_default)
    }
}

/// A concrete (provider, model, parameters, messages) binding under a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Key into the top-level `providers` map.
    pub provider: String,

    /// Provider-native model name.
    pub model: String,

    #[serde(rename = "default", default)]
    pub is_default: bool,

    /// Canonical model parameters; validated against the canonical
    /// vocabulary and bounds, mapped per provider at execution time.
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,

    /// Ordered, non-empty message template list.
    pub messages: Vec<MessageTemplate>,

    #[serde(rename = "responseFormat", default)]
    pub response_format: ResponseFormat,

    /// Ordered fallback targets tried after the primary fails retryably.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Vec<FallbackTarget>>,
}

/// One templated message in a variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub role: MessageRole,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContent {
    pub template: String,
}

/// Message roles accepted in templates and returned by providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Expected response shape for a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    RawText,
    JsonSchema {
        #[serde(rename = "schemaRef")]
        schema_ref: String,
    },
}

impl Default for ResponseFormat {
    fn default() -> Self {
        ResponseFormat::RawText
    }
}

/// A (provider, model) fallback target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackTarget {
    pub provider: String,
    pub model: String,
}

/// Routing policy for one prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routing {
    /// Non-empty ordered rule list.
    pub rules: Vec<RoutingRule>,

    /// Time-bounded weighted distributions that override the default rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phased: Option<Vec<PhasedRule>>,
}

/// One routing rule: a target variant, a weight, and an optional tag gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub target: String,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

fn default_weight() -> f64 {
    100.0
}

impl RoutingRule {
    /// Rules without tags participate in the default weight distribution.
    pub fn is_untagged(&self) -> bool {
        self.tags.as_ref().map_or(true, |t| t.is_empty())
    }
}

/// A phased rollout window with its own weight map.
///
/// `weights` keeps the file's insertion order (the router tie-breaks on it),
/// which is why this is a `serde_json::Map` rather than a typed map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasedRule {
    /// Epoch seconds, inclusive.
    pub start: i64,

    /// Epoch seconds, inclusive; unbounded when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,

    /// Variant identifier -> weight in [0, 100].
    pub weights: serde_json::Map<String, Value>,
}

impl PhasedRule {
    /// Whether this window covers the given instant.
    pub fn covers(&self, now: i64) -> bool {
        self.start <= now && self.end.map_or(true, |end| now <= end)
    }
}

/// One step of a prompt chain. Only the prompt reference is interpreted;
/// execution of chains is unsupported by this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    pub prompt: String,

    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}
