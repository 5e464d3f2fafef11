//! Configuration loading
//!
//! Copyright (c) 2025 Promptgate Team
//! Licensed under the Apache-2.0 license

use crate::config::model::Config;
use crate::config::{semantic, structural};
use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::path::Path;

/// Read, parse, and validate a configuration file.
pub fn load_and_validate_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading configuration");

    let bytes = std::fs::read(path).map_err(|err| {
        Error::configuration_with(
            format!("cannot read configuration file: {}", err),
            json!({"path": path.display().to_string()}),
        )
    })?;

    let text = String::from_utf8(bytes).map_err(|_| {
        Error::configuration_with(
            "configuration file is not valid UTF-8",
            json!({"path": path.display().to_string()}),
        )
    })?;

    let raw: Value = serde_json::from_str(&text).map_err(|err| {
        Error::configuration_with(
            format!("configuration file is not valid JSON: {}", err),
            json!({
                "path": path.display().to_string(),
                "line": err.line(),
                "column": err.column(),
            }),
        )
    })?;

    validate_config(&raw)
}

/// Validate a raw configuration value: structural pass, deserialization,
/// then the ordered semantic classes. Every downstream lookup on the
/// returned [`Config`] is total.
pub fn validate_config(raw: &Value) -> Result<Config> {
    let issues = structural::check_structure(raw);
    if !issues.is_empty() {
        let errors: Vec<Value> = issues
            .iter()
            .map(|i| json!({"path": i.path, "message": i.message}))
            .collect();
        return Err(Error::configuration_with(
            format!(
                "structural validation failed: {} error(s), first: {}",
                issues.len(),
                issues[0]
            ),
            json!({"class": "structure", "errors": errors}),
        ));
    }

    // The structural pass guarantees this cannot fail; a failure here is a
    // drift between the walker and the model types.
    let config: Config = serde_json::from_value(raw.clone()).map_err(|err| {
        Error::configuration_with(
            format!("configuration deserialization failed after validation: {}", err),
            json!({"class": "structure"}),
        )
    })?;

    semantic::check_semantics(&config)?;

    tracing::debug!(
        prompts = config.prompts.len(),
        providers = config.providers.len(),
        schemas = config.response_schemas.len(),
        "configuration validated"
    );
    Ok(config)
}
