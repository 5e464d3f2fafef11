//! Canonical-to-provider parameter mapping
//!
//! Canonical parameters use a temperature range of [0, 1]; each provider rule
//! renames, rescales, clamps, or drops. Unknown canonical keys are dropped
//! silently, so a bag already in provider-native form maps to itself under
//! repeated application.

use crate::config::ProviderType;
use serde_json::{Map, Value};

/// How one canonical parameter translates for one provider type.
#[derive(Debug, Clone, Copy)]
enum Rule {
    /// Write under `name`, optionally scaling then clamping numeric values.
    Map {
        name: &'static str,
        scale: Option<f64>,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// The provider does not accept this parameter.
    Drop,
}

const fn passthrough(name: &'static str) -> Rule {
    Rule::Map {
        name,
        scale: None,
        min: None,
        max: None,
    }
}

const fn scaled(name: &'static str, scale: f64, min: f64, max: f64) -> Rule {
    Rule::Map {
        name,
        scale: Some(scale),
        min: Some(min),
        max: Some(max),
    }
}

const fn clamped(name: &'static str, min: f64, max: f64) -> Rule {
    Rule::Map {
        name,
        scale: None,
        min: Some(min),
        max: Some(max),
    }
}

/// The static capability table.
fn rule_for(provider: ProviderType, canonical: &str) -> Option<Rule> {
    use ProviderType::*;
    let rule = match (canonical, provider) {
        ("temperature", OpenAi) => scaled("temperature", 2.0, 0.0, 2.0),
        ("temperature", Anthropic) => clamped("temperature", 0.0, 1.0),
        ("temperature", Google) => scaled("temperature", 2.0, 0.0, 2.0),

        ("max_tokens", OpenAi) => passthrough("max_completion_tokens"),
        ("max_tokens", Anthropic) => passthrough("max_tokens"),
        ("max_tokens", Google) => passthrough("maxOutputTokens"),

        ("top_p", OpenAi) | ("top_p", Anthropic) => passthrough("top_p"),
        ("top_p", Google) => passthrough("topP"),

        ("frequency_penalty", OpenAi) => clamped("frequency_penalty", -2.0, 2.0),
        ("frequency_penalty", Anthropic) => Rule::Drop,
        ("frequency_penalty", Google) => clamped("frequencyPenalty", -2.0, 2.0),

        ("presence_penalty", OpenAi) => clamped("presence_penalty", -2.0, 2.0),
        ("presence_penalty", Anthropic) => Rule::Drop,
        ("presence_penalty", Google) => clamped("presencePenalty", -2.0, 2.0),

        ("stop", OpenAi) => passthrough("stop"),
        ("stop", Anthropic) => passthrough("stop_sequences"),
        ("stop", Google) => passthrough("stopSequences"),

        ("logit_bias", OpenAi) => passthrough("logit_bias"),
        ("logit_bias", Anthropic) | ("logit_bias", Google) => Rule::Drop,

        _ => return None,
    };
    Some(rule)
}

/// Convert a canonical parameter bag into provider-native options.
pub fn map_parameters(provider: ProviderType, canonical: &Map<String, Value>) -> Map<String, Value> {
    let mut native = Map::new();

    for (key, value) in canonical {
        let Some(rule) = rule_for(provider, key) else {
            continue;
        };
        match rule {
            Rule::Drop => {}
            Rule::Map {
                name,
                scale,
                min,
                max,
            } => {
                let mapped = match value.as_f64() {
                    Some(mut n) => {
                        if let Some(factor) = scale {
                            n *= factor;
                        }
                        if let Some(lo) = min {
                            n = n.max(lo);
                        }
                        if let Some(hi) = max {
                            n = n.min(hi);
                        }
                        number_value(n)
                    }
                    None => value.clone(),
                };
                native.insert(name.to_string(), mapped);
            }
        }
    }

    native
}

/// Keep integral results as JSON integers so `max_tokens: 100` does not come
/// out as `100.0` on the wire.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9e15 {
        Value::Number((n as i64).into())
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
