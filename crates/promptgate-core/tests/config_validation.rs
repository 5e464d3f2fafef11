//! End-to-end configuration validation tests
//!
//! Exercises the loader against whole documents: the two-stage pipeline,
//! the fixed semantic class ordering, and the closure guarantee that every
//! cross-reference in an accepted configuration resolves.

use promptgate_core::config::ResponseFormat;
use promptgate_core::{validate_config, Error};
use serde_json::{json, Value};

fn base_config() -> Value {
    json!({
        "version": "1.0.0",
        "providers": {
            "openai-main": {"type": "openai"},
            "anthropic-backup": {"type": "anthropic"}
        },
        "responseSchemas": {
            "answer": {
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }
        },
        "prompts": {
            "greeting": {
                "description": "Greets the user",
                "variants": {
                    "v_default": {
                        "provider": "openai-main",
                        "model": "gpt-4o",
                        "default": true,
                        "parameters": {"temperature": 0.7, "max_tokens": 256},
                        "messages": [
                            {"role": "system", "content": {"template": "You greet people."}},
                            {"role": "user", "content": {"template": "Hello {{ name | default: \"friend\" }}!"}}
                        ],
                        "fallback": [
                            {"provider": "anthropic-backup", "model": "claude-sonnet-4"}
                        ]
                    },
                    "v_structured": {
                        "provider": "anthropic-backup",
                        "model": "claude-sonnet-4",
                        "parameters": {"max_tokens": 512},
                        "messages": [
                            {"role": "user", "content": {"template": "Greet {{ name }} as JSON."}}
                        ],
                        "responseFormat": {"type": "json_schema", "schemaRef": "answer"}
                    }
                },
                "routing": {
                    "rules": [
                        {"tags": ["beta"], "weight": 100, "target": "v_structured"},
                        {"weight": 80, "target": "v_default"},
                        {"weight": 20, "target": "v_structured"}
                    ],
                    "phased": [
                        {"start": 1751328000, "end": 1752537600,
                         "weights": {"v_default": 50, "v_structured": 50}}
                    ]
                },
                "chains": [{"prompt": "greeting"}]
            }
        }
    })
}

#[test]
fn accepts_a_complete_document() {
    let config = validate_config(&base_config()).unwrap();
    assert_eq!(config.version, "1.0.0");
    assert_eq!(config.prompts.len(), 1);
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.response_schemas.len(), 1);
}

#[test]
fn accepted_configs_are_reference_closed() {
    // Every routing target, phased weight key, fallback provider, and
    // schemaRef in an accepted config must resolve.
    let config = validate_config(&base_config()).unwrap();

    for prompt in config.prompts.values() {
        for rule in &prompt.routing.rules {
            assert!(prompt.variants.contains_key(&rule.target));
        }
        for entry in prompt.routing.phased.as_deref().unwrap_or(&[]) {
            for key in entry.weights.keys() {
                assert!(prompt.variants.contains_key(key));
            }
        }
        for variant in prompt.variants.values() {
            assert!(config.providers.contains_key(&variant.provider));
            for target in variant.fallback.as_deref().unwrap_or(&[]) {
                assert!(config.providers.contains_key(&target.provider));
            }
            if let ResponseFormat::JsonSchema { schema_ref } = &variant.response_format {
                assert!(config.response_schemas.contains_key(schema_ref));
            }
        }
    }
}

#[test]
fn all_zero_weight_rules_fail_validation() {
    // A prompt whose only rule has weight 0 is degenerate.
    let mut raw = base_config();
    raw["prompts"]["greeting"]["routing"] = json!({
        "rules": [{"weight": 0, "target": "v_default"}]
    });
    let err = validate_config(&raw).unwrap_err();
    assert_eq!(err.kind(), "configuration-error");
    assert_eq!(err.details()["class"], "routing");
}

#[test]
fn nonzero_rule_with_missing_target_fails_validation() {
    let mut raw = base_config();
    raw["prompts"]["greeting"]["routing"] = json!({
        "rules": [{"weight": 100, "target": "v_ghost"}]
    });
    let err = validate_config(&raw).unwrap_err();
    assert_eq!(err.kind(), "configuration-error");
    assert!(err.message().contains("v_ghost"));
}

#[test]
fn structural_failures_report_every_issue_of_the_pass() {
    let raw = json!({
        "version": 1,
        "providers": {"p": {"type": "mystery"}},
        "prompts": {"x": {"variants": {}, "routing": {"rules": []}}}
    });
    let err = validate_config(&raw).unwrap_err();
    assert_eq!(err.details()["class"], "structure");
    let errors = err.details()["errors"].as_array().unwrap();
    // version type, unknown provider type, empty variants, empty rules
    assert!(errors.len() >= 4, "got {} errors: {:?}", errors.len(), errors);
}

#[test]
fn semantic_classes_fail_in_declared_order() {
    // Break a later class (fallback refs) and an earlier one (schema refs);
    // the earlier class must be the one reported.
    let mut raw = base_config();
    raw["prompts"]["greeting"]["variants"]["v_structured"]["responseFormat"]["schemaRef"] =
        json!("nope");
    raw["prompts"]["greeting"]["variants"]["v_default"]["fallback"][0]["provider"] =
        json!("nope");
    let err = validate_config(&raw).unwrap_err();
    assert_eq!(err.details()["class"], "response-schema");
}

#[test]
fn identifier_pattern_is_enforced() {
    let mut raw = base_config();
    raw["providers"]["bad alias!"] = json!({"type": "openai"});
    let err = validate_config(&raw).unwrap_err();
    assert_eq!(err.details()["class"], "structure");
}

#[test]
fn message_templates_are_parsed_strictly() {
    let mut raw = base_config();
    raw["prompts"]["greeting"]["variants"]["v_default"]["messages"][0]["content"]["template"] =
        json!("{{ name | frobnicate }}");
    let err = validate_config(&raw).unwrap_err();
    assert_eq!(err.details()["class"], "template-syntax");
    let first = &err.details()["errors"][0];
    assert!(first["message"].as_str().unwrap().contains("Unknown filter"));
    assert!(first["suggestion"].as_str().unwrap().contains("capitalize"));
}

#[test]
fn version_zero_point_releases_are_rejected() {
    for bad in ["0.9.0", "2.0.0", "1.0", "v1.0.0", "one"] {
        let mut raw = base_config();
        raw["version"] = json!(bad);
        let err = validate_config(&raw).unwrap_err();
        assert_eq!(err.kind(), "configuration-error", "version {} must fail", bad);
    }
}

#[test]
fn unknown_properties_rejected_outside_carveouts() {
    let mut raw = base_config();
    raw["prompts"]["greeting"]["variants"]["v_default"]["surprise"] = json!(true);
    let err = validate_config(&raw).unwrap_err();
    assert_eq!(err.details()["class"], "structure");

    // Provider extras and schema fragments are the carveouts.
    let mut raw = base_config();
    raw["providers"]["openai-main"]["organization"] = json!("acme");
    raw["responseSchemas"]["answer"]["x-vendor-note"] = json!("kept");
    validate_config(&raw).unwrap();
}

#[test]
fn error_matches_kind_contract() {
    let err = validate_config(&json!("not an object")).unwrap_err();
    match err {
        Error::Configuration { .. } => {}
        other => panic!("expected configuration error, got {:?}", other.kind()),
    }
}
