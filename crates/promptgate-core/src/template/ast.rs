//! Template AST
//!
//! Copyright (c) 2025 Promptgate Team
//! Licensed under the Apache-2.0 license

/// A parsed template: a flat list of nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub nodes: Vec<Node>,
}

/// One node of template output.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text copied through verbatim.
    Text(String),
    /// `{{ expr | filter: args }}` output tag.
    Output(OutputExpr),
    /// `{% if %}` / `{% elsif %}` / `{% else %}` / `{% endif %}` block.
    If(IfBlock),
    /// `{% for item in seq %}` / `{% endfor %}` block.
    For(ForBlock),
}

/// An output expression: a base value piped through zero or more filters.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputExpr {
    pub value: ValueExpr,
    pub filters: Vec<FilterCall>,
}

/// The atoms an expression can start from.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    /// Dotted variable path, e.g. `user.name`.
    Path(Vec<String>),
    StringLit(String),
    NumberLit(f64),
    BoolLit(bool),
    Nil,
}

/// One filter invocation in a pipe chain.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<ValueExpr>,
}

/// A conditional block with ordered branches and an optional else.
#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock {
    /// `(condition, body)` pairs: the `if` branch first, then any `elsif`s.
    pub branches: Vec<(Condition, Vec<Node>)>,
    pub else_body: Option<Vec<Node>>,
}

/// Condition forms supported inside `{% if %}` tags.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Bare value, tested for truthiness.
    Truthy(ValueExpr),
    /// Binary comparison against a literal or another path.
    Compare {
        lhs: ValueExpr,
        op: CompareOp,
        rhs: ValueExpr,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

/// A `{% for var in iterable %}` loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForBlock {
    pub var: String,
    pub iterable: ValueExpr,
    pub body: Vec<Node>,
}
