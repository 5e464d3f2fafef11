//! Structural validation of the raw configuration document
//!
//! First of the two validation stages: field presence, value types,
//! enumerations, identifier patterns, and numeric bounds, checked against the
//! raw JSON value before deserialization. Unknown object properties are
//! rejected everywhere except inside provider entries, JSON-Schema fragments,
//! and chain steps. Cross-reference rules live in the semantic stage.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Identifier fields must match this pattern.
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// One structural problem, anchored to a JSON path.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    fn new(path: &Ctx, message: impl Into<String>) -> Self {
        Self {
            path: path.0.clone(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// JSON-path context threaded through the walk.
#[derive(Debug, Clone)]
struct Ctx(String);

impl Ctx {
    fn root() -> Self {
        Ctx("$".to_string())
    }

    fn child(&self, segment: &str) -> Self {
        Ctx(format!("{}.{}", self.0, segment))
    }

    fn index(&self, i: usize) -> Self {
        Ctx(format!("{}[{}]", self.0, i))
    }
}

/// Run the structural pass over a raw configuration value.
///
/// Returns every problem found; an empty vector means the document can be
/// deserialized into [`crate::config::Config`] without surprises.
pub fn check_structure(raw: &Value) -> Vec<Issue> {
    let mut issues = Vec::new();
    let ctx = Ctx::root();

    let Some(root) = raw.as_object() else {
        issues.push(Issue::new(&ctx, "configuration root must be a JSON object"));
        return issues;
    };

    reject_unknown_keys(
        root,
        &["version", "providers", "responseSchemas", "prompts"],
        &ctx,
        &mut issues,
    );

    match root.get("version") {
        Some(Value::String(_)) => {}
        Some(_) => issues.push(Issue::new(&ctx.child("version"), "must be a string")),
        None => issues.push(Issue::new(&ctx, "missing required field 'version'")),
    }

    match root.get("providers") {
        Some(Value::Object(providers)) => {
            let pctx = ctx.child("providers");
            for (alias, decl) in providers {
                check_identifier(alias, &pctx, &mut issues);
                check_provider(decl, &pctx.child(alias), &mut issues);
            }
        }
        Some(_) => issues.push(Issue::new(&ctx.child("providers"), "must be an object")),
        None => issues.push(Issue::new(&ctx, "missing required field 'providers'")),
    }

    if let Some(schemas) = root.get("responseSchemas") {
        let sctx = ctx.child("responseSchemas");
        match schemas.as_object() {
            Some(schemas) => {
                for (id, fragment) in schemas {
                    check_identifier(id, &sctx, &mut issues);
                    if !fragment.is_object() {
                        issues.push(Issue::new(
                            &sctx.child(id),
                            "schema fragment must be an object",
                        ));
                    }
                }
            }
            None => issues.push(Issue::new(&sctx, "must be an object")),
        }
    }

    match root.get("prompts") {
        Some(Value::Object(prompts)) => {
            let pctx = ctx.child("prompts");
            for (id, prompt) in prompts {
                check_identifier(id, &pctx, &mut issues);
                check_prompt(prompt, &pctx.child(id), &mut issues);
            }
        }
        Some(_) => issues.push(Issue::new(&ctx.child("prompts"), "must be an object")),
        None => issues.push(Issue::new(&ctx, "missing required field 'prompts'")),
    }

    issues
}

fn check_provider(decl: &Value, ctx: &Ctx, issues: &mut Vec<Issue>) {
    let Some(decl) = decl.as_object() else {
        issues.push(Issue::new(ctx, "provider entry must be an object"));
        return;
    };

    // Provider entries accept arbitrary extras; only `type` is interpreted.
    match decl.get("type") {
        Some(Value::String(t)) if matches!(t.as_str(), "openai" | "anthropic" | "google") => {}
        Some(Value::String(t)) => issues.push(Issue::new(
            &ctx.child("type"),
            format!("unknown provider type '{}' (expected openai, anthropic, or google)", t),
        )),
        Some(_) => issues.push(Issue::new(&ctx.child("type"), "must be a string")),
        None => issues.push(Issue::new(ctx, "missing required field 'type'")),
    }
}

fn check_prompt(prompt: &Value, ctx: &Ctx, issues: &mut Vec<Issue>) {
    let Some(prompt) = prompt.as_object() else {
        issues.push(Issue::new(ctx, "prompt must be an object"));
        return;
    };

    reject_unknown_keys(
        prompt,
        &["description", "variants", "routing", "chains"],
        ctx,
        issues,
    );

    if let Some(description) = prompt.get("description") {
        if !description.is_string() {
            issues.push(Issue::new(&ctx.child("description"), "must be a string"));
        }
    }

    match prompt.get("variants") {
        Some(Value::Object(variants)) => {
            let vctx = ctx.child("variants");
            if variants.is_empty() {
                issues.push(Issue::new(&vctx, "must declare at least one variant"));
            }
            for (id, variant) in variants {
                check_identifier(id, &vctx, issues);
                check_variant(variant, &vctx.child(id), issues);
            }
        }
        Some(_) => issues.push(Issue::new(&ctx.child("variants"), "must be an object")),
        None => issues.push(Issue::new(ctx, "missing required field 'variants'")),
    }

    match prompt.get("routing") {
        Some(routing) => check_routing(routing, &ctx.child("routing"), issues),
        None => issues.push(Issue::new(ctx, "missing required field 'routing'")),
    }

    if let Some(chains) = prompt.get("chains") {
        let cctx = ctx.child("chains");
        match chains.as_array() {
            Some(steps) => {
                for (i, step) in steps.iter().enumerate() {
                    let sctx = cctx.index(i);
                    match step.get("prompt") {
                        Some(Value::String(_)) => {}
                        Some(_) => {
                            issues.push(Issue::new(&sctx.child("prompt"), "must be a string"))
                        }
                        None => {
                            issues.push(Issue::new(&sctx, "missing required field 'prompt'"))
                        }
                    }
                }
            }
            None => issues.push(Issue::new(&cctx, "must be an array")),
        }
    }
}

fn check_variant(variant: &Value, ctx: &Ctx, issues: &mut Vec<Issue>) {
    let Some(variant) = variant.as_object() else {
        issues.push(Issue::new(ctx, "variant must be an object"));
        return;
    };

    reject_unknown_keys(
        variant,
        &[
            "provider",
            "model",
            "default",
            "parameters",
            "messages",
            "responseFormat",
            "fallback",
        ],
        ctx,
        issues,
    );

    require_string(variant, "provider", ctx, issues);
    require_string(variant, "model", ctx, issues);

    if let Some(default) = variant.get("default") {
        if !default.is_boolean() {
            issues.push(Issue::new(&ctx.child("default"), "must be a boolean"));
        }
    }

    if let Some(parameters) = variant.get("parameters") {
        check_parameters(parameters, &ctx.child("parameters"), issues);
    }

    match variant.get("messages") {
        Some(Value::Array(messages)) => {
            let mctx = ctx.child("messages");
            if messages.is_empty() {
                issues.push(Issue::new(&mctx, "must contain at least one message"));
            }
            for (i, message) in messages.iter().enumerate() {
                check_message(message, &mctx.index(i), issues);
            }
        }
        Some(_) => issues.push(Issue::new(&ctx.child("messages"), "must be an array")),
        None => issues.push(Issue::new(ctx, "missing required field 'messages'")),
    }

    if let Some(format) = variant.get("responseFormat") {
        check_response_format(format, &ctx.child("responseFormat"), issues);
    }

    if let Some(fallback) = variant.get("fallback") {
        let fctx = ctx.child("fallback");
        match fallback.as_array() {
            Some(targets) => {
                for (i, target) in targets.iter().enumerate() {
                    let tctx = fctx.index(i);
                    match target.as_object() {
                        Some(target) => {
                            reject_unknown_keys(target, &["provider", "model"], &tctx, issues);
                            require_string(target, "provider", &tctx, issues);
                            require_string(target, "model", &tctx, issues);
                        }
                        None => issues.push(Issue::new(&tctx, "must be an object")),
                    }
                }
            }
            None => issues.push(Issue::new(&fctx, "must be an array")),
        }
    }
}

/// Canonical parameter vocabulary with the bounds from the external contract.
fn check_parameters(parameters: &Value, ctx: &Ctx, issues: &mut Vec<Issue>) {
    let Some(parameters) = parameters.as_object() else {
        issues.push(Issue::new(ctx, "must be an object"));
        return;
    };

    for (key, value) in parameters {
        let kctx = ctx.child(key);
        match key.as_str() {
            "temperature" | "top_p" => check_number_range(value, 0.0, 1.0, &kctx, issues),
            "frequency_penalty" | "presence_penalty" => {
                check_number_range(value, -2.0, 2.0, &kctx, issues)
            }
            "max_tokens" => match value.as_i64() {
                Some(n) if n >= 1 => {}
                _ => issues.push(Issue::new(&kctx, "must be an integer >= 1")),
            },
            "stop" => match value.as_array() {
                Some(stops) if stops.len() <= 4 && stops.iter().all(Value::is_string) => {}
                Some(stops) if stops.len() > 4 => {
                    issues.push(Issue::new(&kctx, "must contain at most 4 stop strings"))
                }
                _ => issues.push(Issue::new(&kctx, "must be an array of strings")),
            },
            "logit_bias" => {
                if !value.is_object() {
                    issues.push(Issue::new(&kctx, "must be an object"));
                }
            }
            other => issues.push(Issue::new(
                ctx,
                format!("unknown canonical parameter '{}'", other),
            )),
        }
    }
}

fn check_message(message: &Value, ctx: &Ctx, issues: &mut Vec<Issue>) {
    let Some(message) = message.as_object() else {
        issues.push(Issue::new(ctx, "must be an object"));
        return;
    };

    reject_unknown_keys(message, &["role", "content"], ctx, issues);

    match message.get("role") {
        Some(Value::String(role)) if matches!(role.as_str(), "system" | "user" | "assistant") => {}
        Some(Value::String(role)) => issues.push(Issue::new(
            &ctx.child("role"),
            format!("unknown role '{}' (expected system, user, or assistant)", role),
        )),
        Some(_) => issues.push(Issue::new(&ctx.child("role"), "must be a string")),
        None => issues.push(Issue::new(ctx, "missing required field 'role'")),
    }

    match message.get("content") {
        Some(Value::Object(content)) => {
            let cctx = ctx.child("content");
            reject_unknown_keys(content, &["template"], &cctx, issues);
            require_string(content, "template", &cctx, issues);
        }
        Some(_) => issues.push(Issue::new(&ctx.child("content"), "must be an object")),
        None => issues.push(Issue::new(ctx, "missing required field 'content'")),
    }
}

fn check_response_format(format: &Value, ctx: &Ctx, issues: &mut Vec<Issue>) {
    let Some(format) = format.as_object() else {
        issues.push(Issue::new(ctx, "must be an object"));
        return;
    };

    match format.get("type") {
        Some(Value::String(t)) if t == "raw_text" => {
            reject_unknown_keys(format, &["type"], ctx, issues);
        }
        Some(Value::String(t)) if t == "json_schema" => {
            reject_unknown_keys(format, &["type", "schemaRef"], ctx, issues);
            require_string(format, "schemaRef", ctx, issues);
        }
        Some(Value::String(t)) => issues.push(Issue::new(
            &ctx.child("type"),
            format!("unknown response format '{}' (expected raw_text or json_schema)", t),
        )),
        Some(_) => issues.push(Issue::new(&ctx.child("type"), "must be a string")),
        None => issues.push(Issue::new(ctx, "missing required field 'type'")),
    }
}

fn check_routing(routing: &Value, ctx: &Ctx, issues: &mut Vec<Issue>) {
    let Some(routing) = routing.as_object() else {
        issues.push(Issue::new(ctx, "must be an object"));
        return;
    };

    reject_unknown_keys(routing, &["rules", "phased"], ctx, issues);

    match routing.get("rules") {
        Some(Value::Array(rules)) => {
            let rctx = ctx.child("rules");
            if rules.is_empty() {
                issues.push(Issue::new(&rctx, "must contain at least one rule"));
            }
            for (i, rule) in rules.iter().enumerate() {
                check_rule(rule, &rctx.index(i), issues);
            }
        }
        Some(_) => issues.push(Issue::new(&ctx.child("rules"), "must be an array")),
        None => issues.push(Issue::new(ctx, "missing required field 'rules'")),
    }

    if let Some(phased) = routing.get("phased") {
        let pctx = ctx.child("phased");
        match phased.as_array() {
            Some(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    check_phased(entry, &pctx.index(i), issues);
                }
            }
            None => issues.push(Issue::new(&pctx, "must be an array")),
        }
    }
}

fn check_rule(rule: &Value, ctx: &Ctx, issues: &mut Vec<Issue>) {
    let Some(rule) = rule.as_object() else {
        issues.push(Issue::new(ctx, "must be an object"));
        return;
    };

    reject_unknown_keys(rule, &["target", "weight", "tags"], ctx, issues);
    require_string(rule, "target", ctx, issues);

    if let Some(weight) = rule.get("weight") {
        check_number_range(weight, 0.0, 100.0, &ctx.child("weight"), issues);
    }

    if let Some(tags) = rule.get("tags") {
        match tags.as_array() {
            Some(tags) if tags.iter().all(Value::is_string) => {}
            _ => issues.push(Issue::new(&ctx.child("tags"), "must be an array of strings")),
        }
    }
}

fn check_phased(entry: &Value, ctx: &Ctx, issues: &mut Vec<Issue>) {
    let Some(entry) = entry.as_object() else {
        issues.push(Issue::new(ctx, "must be an object"));
        return;
    };

    reject_unknown_keys(entry, &["start", "end", "weights"], ctx, issues);

    match entry.get("start") {
        Some(v) if v.as_i64().is_some() => {}
        Some(_) => issues.push(Issue::new(&ctx.child("start"), "must be an integer (epoch seconds)")),
        None => issues.push(Issue::new(ctx, "missing required field 'start'")),
    }

    if let Some(end) = entry.get("end") {
        if end.as_i64().is_none() {
            issues.push(Issue::new(&ctx.child("end"), "must be an integer (epoch seconds)"));
        }
    }

    match entry.get("weights") {
        Some(Value::Object(weights)) => {
            let wctx = ctx.child("weights");
            if weights.is_empty() {
                issues.push(Issue::new(&wctx, "must contain at least one entry"));
            }
            for (variant_id, weight) in weights {
                check_identifier(variant_id, &wctx, issues);
                check_number_range(weight, 0.0, 100.0, &wctx.child(variant_id), issues);
            }
        }
        Some(_) => issues.push(Issue::new(&ctx.child("weights"), "must be an object")),
        None => issues.push(Issue::new(ctx, "missing required field 'weights'")),
    }
}

fn check_identifier(id: &str, ctx: &Ctx, issues: &mut Vec<Issue>) {
    if !IDENT_RE.is_match(id) {
        issues.push(Issue::new(
            ctx,
            format!("identifier '{}' must match [A-Za-z0-9_-]+", id),
        ));
    }
}

fn check_number_range(value: &Value, min: f64, max: f64, ctx: &Ctx, issues: &mut Vec<Issue>) {
    match value.as_f64() {
        Some(n) if n >= min && n <= max => {}
        Some(n) => issues.push(Issue::new(
            ctx,
            format!("value {} is outside [{}, {}]", n, min, max),
        )),
        None => issues.push(Issue::new(ctx, "must be a number")),
    }
}

fn require_string(
    object: &serde_json::Map<String, Value>,
    field: &str,
    ctx: &Ctx,
    issues: &mut Vec<Issue>,
) {
    match object.get(field) {
        Some(Value::String(_)) => {}
        Some(_) => issues.push(Issue::new(&ctx.child(field), "must be a string")),
        None => issues.push(Issue::new(ctx, format!("missing required field '{}'", field))),
    }
}

fn reject_unknown_keys(
    object: &serde_json::Map<String, Value>,
    allowed: &[&str],
    ctx: &Ctx,
    issues: &mut Vec<Issue>,
) {
    for key in object.keys() {
        if !allowed.contains(&key.as_str()) {
            issues.push(Issue::new(ctx, format!("unknown property '{}'", key)));
        }
    }
}
