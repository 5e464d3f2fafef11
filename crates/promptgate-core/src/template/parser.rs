//! Recursive descent parser for the template grammar
//!
//! Copyright (c) 2025 Promptgate Team
//! Licensed under the Apache-2.0 license

use super::ast::*;
use super::TemplateError;

/// How unknown filters are treated during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Unknown filters are parse errors. Used at config-validation time.
    Strict,
    /// Unknown filters are kept and pass values through at render time.
    Lenient,
}

/// Parse a template source into its AST.
pub fn parse(source: &str, mode: FilterMode) -> Result<Template, TemplateError> {
    let mut parser = Parser {
        source,
        pos: 0,
        mode,
    };
    let (nodes, closer) = parser.parse_nodes(None)?;
    debug_assert!(closer.is_none(), "top-level parse cannot hit a block tag");
    Ok(Template { nodes })
}

/// Which block construct the parser is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    For,
}

/// Block-tags that terminate a node run.
enum BlockTag {
    Elsif(Condition),
    Else,
    EndIf,
    EndFor,
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
    mode: FilterMode,
}

impl<'a> Parser<'a> {
    /// Parse nodes until end-of-input or, inside a block, until the matching
    /// closing tag. Returns the closing tag so callers can build branches.
    fn parse_nodes(
        &mut self,
        in_block: Option<BlockKind>,
    ) -> Result<(Vec<Node>, Option<BlockTag>), TemplateError> {
        let mut nodes = Vec::new();

        loop {
            let rest = &self.source[self.pos..];
            let next_output = rest.find("{{");
            let next_block = rest.find("{%");

            let (offset, is_output) = match (next_output, next_block) {
                (Some(o), Some(b)) if o < b => (o, true),
                (Some(_), Some(b)) => (b, false),
                (Some(o), None) => (o, true),
                (None, Some(b)) => (b, false),
                (None, None) => {
                    if !rest.is_empty() {
                        nodes.push(Node::Text(rest.to_string()));
                    }
                    self.pos = self.source.len();
                    return match in_block {
                        None => Ok((nodes, None)),
                        Some(BlockKind::If) => Err(self.error_at(
                            "unexpected EOF: missing {% endif %}",
                            self.source.len(),
                        )),
                        Some(BlockKind::For) => Err(self.error_at(
                            "unexpected EOF: missing {% endfor %}",
                            self.source.len(),
                        )),
                    };
                }
            };

            if offset > 0 {
                nodes.push(Node::Text(rest[..offset].to_string()));
            }
            self.pos += offset;

            if is_output {
                let expr = self.parse_output_tag()?;
                nodes.push(Node::Output(expr));
                continue;
            }

            let tag_start = self.pos;
            match self.parse_block_tag()? {
                RawTag::If(cond) => {
                    let block = self.parse_if_block(cond)?;
                    nodes.push(Node::If(block));
                }
                RawTag::For { var, iterable } => {
                    let (body, closer) = self.parse_nodes(Some(BlockKind::For))?;
                    match closer {
                        Some(BlockTag::EndFor) => {
                            nodes.push(Node::For(ForBlock {
                                var,
                                iterable,
                                body,
                            }));
                        }
                        _ => {
                            return Err(self.error_at(
                                "unexpected EOF: missing {% endfor %}",
                                tag_start,
                            ))
                        }
                    }
                }
                RawTag::Elsif(cond) if in_block == Some(BlockKind::If) => {
                    return Ok((nodes, Some(BlockTag::Elsif(cond))));
                }
                RawTag::Else if in_block == Some(BlockKind::If) => {
                    return Ok((nodes, Some(BlockTag::Else)));
                }
                RawTag::EndIf if in_block == Some(BlockKind::If) => {
                    return Ok((nodes, Some(BlockTag::EndIf)));
                }
                RawTag::EndFor if in_block == Some(BlockKind::For) => {
                    return Ok((nodes, Some(BlockTag::EndFor)));
                }
                tag => {
                    return Err(self.error_at(
                        format!("unexpected token '{{% {} %}}'", tag.keyword()),
                        tag_start,
                    ))
                }
            }
        }
    }

    /// Parse the branches of an `if` block after its opening condition.
    fn parse_if_block(&mut self, first: Condition) -> Result<IfBlock, TemplateError> {
        let mut branches = Vec::new();
        let mut condition = first;

        loop {
            let (body, closer) = self.parse_nodes(Some(BlockKind::If))?;
            match closer {
                Some(BlockTag::Elsif(next)) => {
                    branches.push((condition, body));
                    condition = next;
                }
                Some(BlockTag::Else) => {
                    branches.push((condition, body));
                    let (else_body, closer) = self.parse_nodes(Some(BlockKind::If))?;
                    return match closer {
                        Some(BlockTag::EndIf) => Ok(IfBlock {
                            branches,
                            else_body: Some(else_body),
                        }),
                        _ => Err(self.error_at(
                            "unexpected token: only {% endif %} may follow {% else %}",
                            self.pos,
                        )),
                    };
                }
                Some(BlockTag::EndIf) => {
                    branches.push((condition, body));
                    return Ok(IfBlock {
                        branches,
                        else_body: None,
                    });
                }
                _ => {
                    return Err(
                        self.error_at("unexpected EOF: missing {% endif %}", self.pos)
                    )
                }
            }
        }
    }

    /// Parse `{{ value | filter: args }}`; the cursor sits on `{{`.
    fn parse_output_tag(&mut self) -> Result<OutputExpr, TemplateError> {
        let tag_start = self.pos;
        let inner = self.read_tag_body("{{", "}}")?;
        let mut cursor = Cursor::new(&inner, tag_start + 2);

        cursor.skip_ws();
        let value = cursor.parse_value_expr(self.source)?;
        let mut filter_calls = Vec::new();

        loop {
            cursor.skip_ws();
            if cursor.eof() {
                break;
            }
            if !cursor.eat('|') {
                return Err(self.error_at(
                    format!("unexpected token '{}' in output tag", cursor.rest_token()),
                    cursor.offset(),
                ));
            }
            cursor.skip_ws();
            let name = cursor.parse_ident(self.source)?;

            let mut args = Vec::new();
            cursor.skip_ws();
            if cursor.eat(':') {
                loop {
                    cursor.skip_ws();
                    args.push(cursor.parse_value_expr(self.source)?);
                    cursor.skip_ws();
                    if !cursor.eat(',') {
                        break;
                    }
                }
            }

            self.check_filter(&name, args.len(), cursor.offset())?;
            filter_calls.push(FilterCall { name, args });
        }

        Ok(OutputExpr {
            value,
            filters: filter_calls,
        })
    }

    /// Known filters have fixed arities; unknown filters depend on the mode.
    fn check_filter(&self, name: &str, argc: usize, at: usize) -> Result<(), TemplateError> {
        let arity_ok = match name {
            "join" | "numbered" => argc <= 1,
            "default" => argc == 1,
            "capitalize" | "upcase" | "downcase" | "size" => argc == 0,
            _ => {
                if self.mode == FilterMode::Strict {
                    return Err(self.error_at(format!("Unknown filter '{}'", name), at));
                }
                return Ok(());
            }
        };
        if !arity_ok {
            return Err(self.error_at(
                format!("unexpected token: wrong argument count for filter '{}'", name),
                at,
            ));
        }
        Ok(())
    }

    /// Parse `{% keyword ... %}`; the cursor sits on `{%`.
    fn parse_block_tag(&mut self) -> Result<RawTag, TemplateError> {
        let tag_start = self.pos;
        let inner = self.read_tag_body("{%", "%}")?;
        let mut cursor = Cursor::new(&inner, tag_start + 2);

        cursor.skip_ws();
        let keyword = cursor.parse_ident(self.source)?;

        let tag = match keyword.as_str() {
            "if" | "elsif" => {
                cursor.skip_ws();
                let cond = cursor.parse_condition(self.source)?;
                if keyword == "if" {
                    RawTag::If(cond)
                } else {
                    RawTag::Elsif(cond)
                }
            }
            "else" => RawTag::Else,
            "endif" => RawTag::EndIf,
            "endfor" => RawTag::EndFor,
            "for" => {
                cursor.skip_ws();
                let var = cursor.parse_ident(self.source)?;
                cursor.skip_ws();
                let kw = cursor.parse_ident(self.source)?;
                if kw != "in" {
                    return Err(self.error_at(
                        format!("unexpected token '{}' in for tag (expected 'in')", kw),
                        cursor.offset(),
                    ));
                }
                cursor.skip_ws();
                let iterable = cursor.parse_value_expr(self.source)?;
                RawTag::For { var, iterable }
            }
            other => {
                return Err(self.error_at(
                    format!("unexpected token '{}' (expected if, elsif, else, endif, for, or endfor)", other),
                    tag_start,
                ))
            }
        };

        cursor.skip_ws();
        if !cursor.eof() {
            return Err(self.error_at(
                format!("unexpected token '{}' after {} tag", cursor.rest_token(), keyword),
                cursor.offset(),
            ));
        }
        Ok(tag)
    }

    /// Consume a delimited tag and return its inner text.
    fn read_tag_body(&mut self, open: &str, close: &str) -> Result<String, TemplateError> {
        debug_assert!(self.source[self.pos..].starts_with(open));
        let body_start = self.pos + open.len();
        match self.source[body_start..].find(close) {
            Some(len) => {
                let inner = self.source[body_start..body_start + len].to_string();
                self.pos = body_start + len + close.len();
                Ok(inner)
            }
            None => Err(self.error_at(
                format!("unexpected EOF: tag opened with '{}' is never closed with '{}'", open, close),
                self.pos,
            )),
        }
    }

    fn error_at(&self, message: impl Into<String>, position: usize) -> TemplateError {
        TemplateError::new(message, Some(position), self.source)
    }
}

enum RawTag {
    If(Condition),
    Elsif(Condition),
    Else,
    EndIf,
    EndFor,
    For { var: String, iterable: ValueExpr },
}

impl RawTag {
    fn keyword(&self) -> &'static str {
        match self {
            RawTag::If(_) => "if",
            RawTag::Elsif(_) => "elsif",
            RawTag::Else => "else",
            RawTag::EndIf => "endif",
            RawTag::EndFor => "endfor",
            RawTag::For { .. } => "for",
        }
    }
}

/// Character cursor over one tag's inner text.
struct Cursor {
    chars: Vec<char>,
    idx: usize,
    /// Byte offset of the tag body in the full source, for error positions.
    base: usize,
}

impl Cursor {
    fn new(inner: &str, base: usize) -> Self {
        Self {
            chars: inner.chars().collect(),
            idx: 0,
            base,
        }
    }

    fn eof(&self) -> bool {
        self.idx >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.idx += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.idx += 1;
        }
    }

    /// Approximate source offset for error reporting.
    fn offset(&self) -> usize {
        self.base + self.chars[..self.idx].iter().map(|c| c.len_utf8()).sum::<usize>()
    }

    /// The upcoming run of non-whitespace characters, for error messages.
    fn rest_token(&self) -> String {
        self.chars[self.idx..]
            .iter()
            .take_while(|c| !c.is_whitespace())
            .collect()
    }

    fn parse_ident(&mut self, source: &str) -> Result<String, TemplateError> {
        let mut out = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            out.push(self.bump().unwrap());
        }
        if out.is_empty() {
            let found = self
                .peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "EOF".to_string());
            return Err(TemplateError::new(
                format!("unexpected token '{}' (expected identifier)", found),
                Some(self.offset()),
                source,
            ));
        }
        Ok(out)
    }

    fn parse_value_expr(&mut self, source: &str) -> Result<ValueExpr, TemplateError> {
        match self.peek() {
            Some('"') | Some('\'') => self.parse_string_lit(source),
            Some(c) if c.is_ascii_digit() || c == '-' => self.parse_number_lit(source),
            Some(c) if c.is_alphanumeric() || c == '_' => {
                let mut segments = vec![self.parse_ident(source)?];
                while self.eat('.') {
                    segments.push(self.parse_ident(source)?);
                }
                Ok(match segments.as_slice() {
                    [single] if single == "true" => ValueExpr::BoolLit(true),
                    [single] if single == "false" => ValueExpr::BoolLit(false),
                    [single] if single == "nil" || single == "null" => ValueExpr::Nil,
                    _ => ValueExpr::Path(segments),
                })
            }
            Some(c) => Err(TemplateError::new(
                format!("unexpected token '{}' (expected value)", c),
                Some(self.offset()),
                source,
            )),
            None => Err(TemplateError::new(
                "unexpected EOF (expected value)",
                Some(self.offset()),
                source,
            )),
        }
    }

    fn parse_string_lit(&mut self, source: &str) -> Result<ValueExpr, TemplateError> {
        let quote = self.bump().unwrap();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => {
                        return Err(TemplateError::new(
                            "unexpected EOF in string literal",
                            Some(self.offset()),
                            source,
                        ))
                    }
                },
                Some(c) if c == quote => return Ok(ValueExpr::StringLit(out)),
                Some(c) => out.push(c),
                None => {
                    return Err(TemplateError::new(
                        "unexpected EOF in string literal",
                        Some(self.offset()),
                        source,
                    ))
                }
            }
        }
    }

    fn parse_number_lit(&mut self, source: &str) -> Result<ValueExpr, TemplateError> {
        let start = self.idx;
        if self.peek() == Some('-') {
            self.bump();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        let text: String = self.chars[start..self.idx].iter().collect();
        text.parse::<f64>().map(ValueExpr::NumberLit).map_err(|_| {
            TemplateError::new(
                format!("unexpected token '{}' (expected number)", text),
                Some(self.offset()),
                source,
            )
        })
    }

    fn parse_condition(&mut self, source: &str) -> Result<Condition, TemplateError> {
        let lhs = self.parse_value_expr(source)?;
        self.skip_ws();

        let op = match (self.peek(), self.chars.get(self.idx + 1)) {
            (Some('='), Some('=')) => Some(CompareOp::Eq),
            (Some('!'), Some('=')) => Some(CompareOp::Ne),
            _ => None,
        };

        match op {
            Some(op) => {
                self.idx += 2;
                self.skip_ws();
                let rhs = self.parse_value_expr(source)?;
                Ok(Condition::Compare { lhs, op, rhs })
            }
            None => Ok(Condition::Truthy(lhs)),
        }
    }
}
