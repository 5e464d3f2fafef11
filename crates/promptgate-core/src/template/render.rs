//! Template rendering against a JSON variable scope
//!
//! Copyright (c) 2025 Promptgate Team
//! Licensed under the Apache-2.0 license

use super::ast::*;
use super::filters;
use serde_json::Value;

/// Render a parsed template. Missing variables resolve to the empty string.
pub fn render(template: &Template, variables: &Value) -> String {
    let mut scope = Scope::new(variables);
    let mut out = String::new();
    render_nodes(&template.nodes, &mut scope, &mut out);
    out
}

/// Variable scope: the root object plus loop-local overlays.
struct Scope<'a> {
    root: &'a Value,
    locals: Vec<(String, Value)>,
}

impl<'a> Scope<'a> {
    fn new(root: &'a Value) -> Self {
        Self {
            root,
            locals: Vec::new(),
        }
    }

    /// Resolve a dotted path; innermost loop variable wins over the root.
    fn lookup(&self, path: &[String]) -> Value {
        let (head, rest) = match path.split_first() {
            Some(split) => split,
            None => return Value::Null,
        };

        let mut current = self
            .locals
            .iter()
            .rev()
            .find(|(name, _)| name == head)
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| self.root.get(head).cloned().unwrap_or(Value::Null));

        for segment in rest {
            current = current.get(segment).cloned().unwrap_or(Value::Null);
        }
        current
    }
}

fn render_nodes(nodes: &[Node], scope: &mut Scope<'_>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => out.push_str(&to_display_string(&eval_output(expr, scope))),
            Node::If(block) => {
                let mut taken = false;
                for (condition, body) in &block.branches {
                    if eval_condition(condition, scope) {
                        render_nodes(body, scope, out);
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    if let Some(else_body) = &block.else_body {
                        render_nodes(else_body, scope, out);
                    }
                }
            }
            Node::For(block) => {
                let iterable = eval_value(&block.iterable, scope);
                if let Value::Array(items) = iterable {
                    for item in items {
                        scope.locals.push((block.var.clone(), item));
                        render_nodes(&block.body, scope, out);
                        scope.locals.pop();
                    }
                }
            }
        }
    }
}

fn eval_output(expr: &OutputExpr, scope: &Scope<'_>) -> Value {
    let mut value = eval_value(&expr.value, scope);
    for call in &expr.filters {
        let args: Vec<Value> = call.args.iter().map(|a| eval_value(a, scope)).collect();
        value = filters::apply(&call.name, value, &args);
    }
    value
}

fn eval_value(expr: &ValueExpr, scope: &Scope<'_>) -> Value {
    match expr {
        ValueExpr::Path(path) => scope.lookup(path),
        ValueExpr::StringLit(s) => Value::String(s.clone()),
        ValueExpr::NumberLit(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueExpr::BoolLit(b) => Value::Bool(*b),
        ValueExpr::Nil => Value::Null,
    }
}

fn eval_condition(condition: &Condition, scope: &Scope<'_>) -> bool {
    match condition {
        Condition::Truthy(expr) => is_truthy(&eval_value(expr, scope)),
        Condition::Compare { lhs, op, rhs } => {
            let equal = values_equal(&eval_value(lhs, scope), &eval_value(rhs, scope));
            match op {
                CompareOp::Eq => equal,
                CompareOp::Ne => !equal,
            }
        }
    }
}

/// nil, false, and the empty string are falsy; everything else is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Equality with numeric coercion so `{% if n == 3 %}` works for any JSON
/// number representation.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Canonical display form for interpolated values: strings verbatim, numbers
/// without a trailing `.0`, sequences as element concatenation, mappings as
/// compact JSON, nil as the empty string.
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(to_display_string).collect(),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
