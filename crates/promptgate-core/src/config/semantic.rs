//! Semantic validation: cross-reference rules over a structurally valid config
//!
//! Runs fixed-order check classes and fails on the first class that produced
//! at least one error, reporting every error of that class. The ordering is
//! part of the external contract: version, default variants, response-schema
//! references, routing references, fallback references, required provider
//! parameters, template syntax, then chain references.
//!
//! Copyright (c) 2025 Promptgate Team
//! Licensed under the Apache-2.0 license

use crate::config::model::{Config, ProviderType, ResponseFormat};
use crate::error::{Error, Result};
use crate::template;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap());

/// The only major version this engine understands.
const SUPPORTED_MAJOR: u64 = 1;

/// One semantic problem, anchored to a JSON path.
#[derive(Debug, Clone)]
struct Finding {
    path: String,
    message: String,
    suggestion: Option<String>,
}

impl Finding {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }
}

/// Run every semantic class in order; error on the first non-empty class.
pub fn check_semantics(config: &Config) -> Result<()> {
    type Class = (&'static str, fn(&Config) -> Vec<Finding>);
    const CLASSES: &[Class] = &[
        ("version", check_version),
        ("default-variant", check_default_variants),
        ("response-schema", check_schema_references),
        ("routing", check_routing_references),
        ("fallback", check_fallback_references),
        ("provider-parameters", check_required_parameters),
        ("template-syntax", check_template_syntax),
        ("chains", check_chain_references),
    ];

    for (class, check) in CLASSES {
        let findings = check(config);
        if !findings.is_empty() {
            tracing::debug!(class, count = findings.len(), "semantic validation failed");
            return Err(class_error(class, findings));
        }
    }
    Ok(())
}

fn class_error(class: &str, findings: Vec<Finding>) -> Error {
    let errors: Vec<Value> = findings
        .iter()
        .map(|f| {
            let mut entry = json!({"path": f.path, "message": f.message});
            if let Some(s) = &f.suggestion {
                entry["suggestion"] = json!(s);
            }
            entry
        })
        .collect();

    Error::configuration_with(
        format!(
            "{} validation failed: {} error(s), first: {}",
            class,
            findings.len(),
            findings[0].message
        ),
        json!({"class": class, "errors": errors}),
    )
}

fn check_version(config: &Config) -> Vec<Finding> {
    let mut findings = Vec::new();
    if !VERSION_RE.is_match(&config.version) {
        findings.push(Finding::new(
            "$.version",
            format!("'{}' is not a semantic version (expected X.Y.Z)", config.version),
        ));
        return findings;
    }

    let major: u64 = config
        .version
        .split('.')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    if major != SUPPORTED_MAJOR {
        findings.push(Finding::new(
            "$.version",
            format!(
                "unsupported major version {} (this engine supports {}.x.x)",
                major, SUPPORTED_MAJOR
            ),
        ));
    }
    findings
}

fn check_default_variants(config: &Config) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (prompt_id, prompt) in &config.prompts {
        let defaults: Vec<&String> = prompt
            .variants
            .iter()
            .filter(|(_, v)| v.is_default)
            .map(|(id, _)| id)
            .collect();

        match defaults.len() {
            1 => {}
            0 => findings.push(Finding::new(
                format!("$.prompts.{}.variants", prompt_id),
                format!("prompt '{}' has no default variant", prompt_id),
            )),
            n => findings.push(Finding::new(
                format!("$.prompts.{}.variants", prompt_id),
                format!(
                    "prompt '{}' has {} default variants ({}), expected exactly one",
                    prompt_id,
                    n,
                    itemize(&defaults)
                ),
            )),
        }
    }
    findings
}

fn check_schema_references(config: &Config) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (prompt_id, prompt) in &config.prompts {
        for (variant_id, variant) in &prompt.variants {
            if let ResponseFormat::JsonSchema { schema_ref } = &variant.response_format {
                let path = format!(
                    "$.prompts.{}.variants.{}.responseFormat.schemaRef",
                    prompt_id, variant_id
                );
                if schema_ref.is_empty() {
                    findings.push(Finding::new(path, "schemaRef must not be empty"));
                } else if !config.response_schemas.contains_key(schema_ref) {
                    findings.push(Finding::new(
                        path,
                        format!("schemaRef '{}' does not resolve to a response schema", schema_ref),
                    ));
                }
            }
        }
    }

    for (schema_id, fragment) in &config.response_schemas {
        if let Err(err) = jsonschema::meta::validate(fragment) {
            findings.push(Finding::new(
                format!("$.responseSchemas.{}", schema_id),
                format!("schema fragment is not a valid JSON Schema: {}", err),
            ));
        }
    }

    findings
}

fn check_routing_references(config: &Config) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (prompt_id, prompt) in &config.prompts {
        let routing_path = format!("$.prompts.{}.routing", prompt_id);

        for (i, rule) in prompt.routing.rules.iter().enumerate() {
            if !prompt.variants.contains_key(&rule.target) {
                findings.push(Finding::new(
                    format!("{}.rules[{}].target", routing_path, i),
                    format!("rule target '{}' is not a variant of prompt '{}'", rule.target, prompt_id),
                ));
            }
        }
        if !prompt.routing.rules.iter().any(|r| r.weight > 0.0) {
            findings.push(Finding::new(
                format!("{}.rules", routing_path),
                format!("every rule of prompt '{}' has weight 0", prompt_id),
            ));
        }

        if let Some(phased) = &prompt.routing.phased {
            for (i, entry) in phased.iter().enumerate() {
                for variant_id in entry.weights.keys() {
                    if !prompt.variants.contains_key(variant_id) {
                        findings.push(Finding::new(
                            format!("{}.phased[{}].weights.{}", routing_path, i, variant_id),
                            format!(
                                "phased weight key '{}' is not a variant of prompt '{}'",
                                variant_id, prompt_id
                            ),
                        ));
                    }
                }
                let some_positive = entry
                    .weights
                    .values()
                    .filter_map(Value::as_f64)
                    .any(|w| w > 0.0);
                if !some_positive {
                    findings.push(Finding::new(
                        format!("{}.phased[{}].weights", routing_path, i),
                        "every weight in this phased entry is 0".to_string(),
                    ));
                }
            }
        }
    }

    findings
}

fn check_fallback_references(config: &Config) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (prompt_id, prompt) in &config.prompts {
        for (variant_id, variant) in &prompt.variants {
            if !config.providers.contains_key(&variant.provider) {
                findings.push(Finding::new(
                    format!("$.prompts.{}.variants.{}.provider", prompt_id, variant_id),
                    format!("provider '{}' is not declared", variant.provider),
                ));
            }
            if let Some(fallback) = &variant.fallback {
                for (i, target) in fallback.iter().enumerate() {
                    if !config.providers.contains_key(&target.provider) {
                        findings.push(Finding::new(
                            format!(
                                "$.prompts.{}.variants.{}.fallback[{}].provider",
                                prompt_id, variant_id, i
                            ),
                            format!("fallback provider '{}' is not declared", target.provider),
                        ));
                    }
                }
            }
        }
    }

    findings
}

/// Parameters a provider type insists on. Anthropic requires `max_tokens`;
/// the other providers currently require nothing.
fn required_parameters(provider_type: ProviderType) -> &'static [&'static str] {
    match provider_type {
        ProviderType::Anthropic => &["max_tokens"],
        ProviderType::OpenAi | ProviderType::Google => &[],
    }
}

fn check_required_parameters(config: &Config) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (prompt_id, prompt) in &config.prompts {
        for (variant_id, variant) in &prompt.variants {
            let Some(provider) = config.providers.get(&variant.provider) else {
                continue; // reported by the fallback-reference class
            };
            for required in required_parameters(provider.provider_type) {
                if !variant.parameters.contains_key(*required) {
                    findings.push(Finding::new(
                        format!("$.prompts.{}.variants.{}.parameters", prompt_id, variant_id),
                        format!(
                            "provider type '{}' requires parameter '{}'",
                            provider.provider_type, required
                        ),
                    ));
                }
            }
        }
    }

    findings
}

fn check_template_syntax(config: &Config) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (prompt_id, prompt) in &config.prompts {
        for (variant_id, variant) in &prompt.variants {
            for (i, message) in variant.messages.iter().enumerate() {
                if let Err(err) = template::parse_strict(&message.content.template) {
                    let suggestion = err.suggestion().map(str::to_string);
                    findings.push(
                        Finding::new(
                            format!(
                                "$.prompts.{}.variants.{}.messages[{}].content.template",
                                prompt_id, variant_id, i
                            ),
                            err.to_string(),
                        )
                        .with_suggestion(suggestion),
                    );
                }
            }
        }
    }

    findings
}

fn check_chain_references(config: &Config) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (prompt_id, prompt) in &config.prompts {
        if let Some(chains) = &prompt.chains {
            for (i, step) in chains.iter().enumerate() {
                if !config.prompts.contains_key(&step.prompt) {
                    findings.push(Finding::new(
                        format!("$.prompts.{}.chains[{}].prompt", prompt_id, i),
                        format!("chain step references unknown prompt '{}'", step.prompt),
                    ));
                }
            }
        }
    }

    findings
}

fn itemize(ids: &[&String]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
    sorted.sort_unstable();
    sorted.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_from(value: Value) -> Config {
        serde_json::from_value(value).unwrap()
    }

    fn valid_config() -> Value {
        json!({
            "version": "1.2.0",
            "providers": {
                "main": {"type": "openai"},
                "backup": {"type": "anthropic"}
            },
            "responseSchemas": {
                "person": {"type": "object", "properties": {"name": {"type": "string"}}}
            },
            "prompts": {
                "greeting": {
                    "description": "says hi",
                    "variants": {
                        "v1": {
                            "provider": "main",
                            "model": "gpt-4o",
                            "default": true,
                            "messages": [{"role": "user", "content": {"template": "Hi {{ name }}"}}],
                            "fallback": [{"provider": "backup", "model": "claude-sonnet-4"}]
                        },
                        "v2": {
                            "provider": "backup",
                            "model": "claude-sonnet-4",
                            "parameters": {"max_tokens": 256},
                            "messages": [{"role": "user", "content": {"template": "Hello"}}],
                            "responseFormat": {"type": "json_schema", "schemaRef": "person"}
                        }
                    },
                    "routing": {
                        "rules": [{"target": "v1", "weight": 50}, {"target": "v2", "weight": 50}],
                        "phased": [{"start": 100, "weights": {"v1": 10, "v2": 90}}]
                    }
                }
            }
        })
    }

    #[test]
    fn test_valid_config_passes() {
        check_semantics(&config_from(valid_config())).unwrap();
    }

    #[test]
    fn test_unsupported_major_version() {
        let mut raw = valid_config();
        raw["version"] = json!("2.0.0");
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert!(err.message().contains("unsupported major version 2"));
        assert_eq!(err.details()["class"], "version");
    }

    #[test]
    fn test_missing_default_variant() {
        let mut raw = valid_config();
        raw["prompts"]["greeting"]["variants"]["v1"]["default"] = json!(false);
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert_eq!(err.details()["class"], "default-variant");
    }

    #[test]
    fn test_two_default_variants() {
        let mut raw = valid_config();
        raw["prompts"]["greeting"]["variants"]["v2"]["default"] = json!(true);
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert!(err.message().contains("expected exactly one"));
    }

    #[test]
    fn test_dangling_schema_ref() {
        let mut raw = valid_config();
        raw["prompts"]["greeting"]["variants"]["v2"]["responseFormat"]["schemaRef"] =
            json!("ghost");
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert_eq!(err.details()["class"], "response-schema");
        assert!(err.message().contains("ghost"));
    }

    #[test]
    fn test_invalid_schema_fragment() {
        let mut raw = valid_config();
        raw["responseSchemas"]["person"] = json!({"type": 17});
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert_eq!(err.details()["class"], "response-schema");
    }

    #[test]
    fn test_dangling_rule_target() {
        let mut raw = valid_config();
        raw["prompts"]["greeting"]["routing"]["rules"][0]["target"] = json!("missing");
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert_eq!(err.details()["class"], "routing");
    }

    #[test]
    fn test_all_zero_weights_degenerate() {
        let mut raw = valid_config();
        raw["prompts"]["greeting"]["routing"]["rules"] =
            json!([{"target": "v1", "weight": 0}]);
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert!(err.message().contains("weight 0"));
    }

    #[test]
    fn test_phased_zero_weights_degenerate() {
        let mut raw = valid_config();
        raw["prompts"]["greeting"]["routing"]["phased"][0]["weights"] =
            json!({"v1": 0, "v2": 0});
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert_eq!(err.details()["class"], "routing");
    }

    #[test]
    fn test_dangling_fallback_provider() {
        let mut raw = valid_config();
        raw["prompts"]["greeting"]["variants"]["v1"]["fallback"][0]["provider"] =
            json!("nowhere");
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert_eq!(err.details()["class"], "fallback");
    }

    #[test]
    fn test_anthropic_requires_max_tokens() {
        let mut raw = valid_config();
        raw["prompts"]["greeting"]["variants"]["v2"]["parameters"] = json!({});
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert_eq!(err.details()["class"], "provider-parameters");
        assert!(err.message().contains("max_tokens"));
    }

    #[test]
    fn test_template_with_unknown_filter_fails_validation() {
        let mut raw = valid_config();
        raw["prompts"]["greeting"]["variants"]["v1"]["messages"][0]["content"]["template"] =
            json!("{{ name | sparkle }}");
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert_eq!(err.details()["class"], "template-syntax");
        let first = &err.details()["errors"][0];
        assert!(first["suggestion"].as_str().unwrap().contains("join"));
    }

    #[test]
    fn test_chain_step_reference() {
        let mut raw = valid_config();
        raw["prompts"]["greeting"]["chains"] = json!([{"prompt": "missing"}]);
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert_eq!(err.details()["class"], "chains");
    }

    #[test]
    fn test_class_ordering_version_before_routing() {
        // Both the version and a rule target are broken; the version class
        // must win because it runs first.
        let mut raw = valid_config();
        raw["version"] = json!("oops");
        raw["prompts"]["greeting"]["routing"]["rules"][0]["target"] = json!("missing");
        let err = check_semantics(&config_from(raw)).unwrap_err();
        assert_eq!(err.details()["class"], "version");
    }
}
