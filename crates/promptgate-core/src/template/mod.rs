//! Narrow Liquid-subset template engine
//!
//! Supports variable substitution with dotted paths, `if`/`elsif`/`else`,
//! `for` loops, and a fixed custom filter set. Two filter modes exist:
//! render-time parsing is lenient (unknown filters pass values through), while
//! config validation parses in strict mode, where an unknown filter is an
//! error. Parsed templates are memoized by source string for the lifetime of
//! the engine.
//!
//! Copyright (c) 2025 Promptgate Team
//! Licensed under the Apache-2.0 license

pub mod ast;
mod filters;
mod parser;
mod render;

use crate::{Error, Result};
use ast::Template;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub use parser::FilterMode;

/// The filters this engine implements.
pub const KNOWN_FILTERS: &[&str] = &[
    "join",
    "numbered",
    "default",
    "capitalize",
    "upcase",
    "downcase",
    "size",
];

/// A template parse failure with enough context for a useful hint.
#[derive(Debug, Clone)]
pub struct TemplateError {
    pub message: String,
    /// Byte offset into the source where the problem was detected.
    pub position: Option<usize>,
    pub template: String,
}

impl TemplateError {
    pub(crate) fn new(message: impl Into<String>, position: Option<usize>, template: &str) -> Self {
        Self {
            message: message.into(),
            position,
            template: template.to_string(),
        }
    }

    /// A hint keyed on well-known substrings of the message.
    pub fn suggestion(&self) -> Option<&'static str> {
        if self.message.contains("Unknown filter") {
            Some("Supported filters are join, numbered, default, capitalize, upcase, downcase, and size.")
        } else if self.message.contains("unexpected token") {
            Some("Check the syntax near the reported position; output tags are {{ value | filter: arg }} and blocks are {% if %} / {% for %}.")
        } else if self.message.contains("EOF") {
            Some("A tag is missing its closing delimiter: }}, %}, {% endif %}, or {% endfor %}.")
        } else {
            None
        }
    }
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} at offset {}", self.message, pos),
            None => f.write_str(&self.message),
        }
    }
}

impl From<TemplateError> for Error {
    fn from(err: TemplateError) -> Self {
        let mut details = json!({
            "template": err.template,
        });
        if let Some(hint) = err.suggestion() {
            details["suggestion"] = json!(hint);
        }
        if let Some(pos) = err.position {
            details["position"] = json!(pos);
        }
        Error::template(err.to_string(), details)
    }
}

/// Parse a template with lenient filter handling.
pub fn parse(source: &str) -> std::result::Result<Template, TemplateError> {
    parser::parse(source, FilterMode::Lenient)
}

/// Parse a template rejecting unknown filters. Used by the config validator.
pub fn parse_strict(source: &str) -> std::result::Result<Template, TemplateError> {
    parser::parse(source, FilterMode::Strict)
}

/// Template engine with a parse memo keyed by source string.
///
/// Entries are set-once and never evicted; a racing second parse of the same
/// source is harmless and either result may win.
pub struct TemplateEngine {
    cache: RwLock<HashMap<String, Arc<Template>>>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Render a template against a variable scope.
    ///
    /// Missing variables resolve to the empty string; unknown filters pass
    /// their input through unchanged.
    pub fn render(&self, source: &str, variables: &Value) -> Result<String> {
        let template = self.parse_cached(source)?;
        Ok(render::render(&template, variables))
    }

    fn parse_cached(&self, source: &str) -> std::result::Result<Arc<Template>, TemplateError> {
        if let Some(found) = self.cache.read().expect("template cache poisoned").get(source) {
            return Ok(found.clone());
        }

        let parsed = Arc::new(parse(source)?);
        let mut cache = self.cache.write().expect("template cache poisoned");
        Ok(cache
            .entry(source.to_string())
            .or_insert_with(|| parsed.clone())
            .clone())
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
