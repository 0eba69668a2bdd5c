// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::lexer::*;
use crate::number::*;
use crate::value::*;

use core::mem;
use std::collections::BTreeMap;

use anyhow::{bail, Result};

#[derive(Clone)]
pub struct Parser<'source> {
    source: Source,
    lexer: Lexer<'source>,
    tok: Token,
    // Newlines are insignificant inside parentheses and brackets.
    nesting: u32,
}

const BINARY_OPS: [&[(&str, BinaryOp)]; 6] = [
    &[("||", BinaryOp::Or)],
    &[("&&", BinaryOp::And)],
    &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
    &[
        ("<", BinaryOp::Lt),
        ("<=", BinaryOp::Le),
        (">", BinaryOp::Gt),
        (">=", BinaryOp::Ge),
    ],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[
        ("*", BinaryOp::Mul),
        ("/", BinaryOp::Div),
        ("%", BinaryOp::Mod),
    ],
];

/// Parses a configuration file.
pub fn parse_file(source: &Source) -> Result<File> {
    let mut parser = Parser::new(source)?;
    let body = parser.parse_body(None)?;
    Ok(File {
        source: source.clone(),
        body,
    })
}

/// Parses a source consisting of a single expression.
pub fn parse_expression(source: &Source) -> Result<ExprRef> {
    let mut parser = Parser::new(source)?;
    parser.skip_newlines()?;
    let expr = parser.parse_expr()?;
    parser.skip_newlines()?;
    if parser.tok.0 != TokenKind::Eof {
        bail!(parser.tok.1.error("unexpected token after expression"));
    }
    Ok(expr)
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        Self::with_lexer(source, Lexer::new(source), 0)
    }

    fn new_range(source: &'source Source, start: u32, end: u32) -> Result<Self> {
        Self::with_lexer(source, Lexer::new_range(source, start, end), 1)
    }

    fn with_lexer(source: &'source Source, mut lexer: Lexer<'source>, nesting: u32) -> Result<Self> {
        let tok = lexer.next_token()?;
        let mut parser = Self {
            source: source.clone(),
            lexer,
            tok,
            nesting,
        };
        if nesting > 0 {
            parser.skip_newlines()?;
        }
        Ok(parser)
    }

    pub fn token_text(&self) -> &str {
        match self.tok.0 {
            TokenKind::Symbol | TokenKind::Number | TokenKind::Ident | TokenKind::Eof => {
                self.tok.1.text()
            }
            TokenKind::String | TokenKind::Newline => "",
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        self.tok.0 == TokenKind::Ident && self.tok.1.text() == kw
    }

    pub fn next_token(&mut self) -> Result<()> {
        loop {
            self.tok = self.lexer.next_token()?;
            if self.nesting == 0 || self.tok.0 != TokenKind::Newline {
                return Ok(());
            }
        }
    }

    fn skip_newlines(&mut self) -> Result<()> {
        while self.tok.0 == TokenKind::Newline {
            self.next_token()?;
        }
        Ok(())
    }

    fn expect(&mut self, text: &str, context: &str) -> Result<()> {
        if self.token_text() == text {
            self.next_token()
        } else {
            let msg = format!("expecting `{text}` {context}");
            Err(self.tok.1.error(&msg))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String> {
        if self.tok.0 != TokenKind::Ident {
            bail!(self.tok.1.error(&format!("expecting identifier {context}")));
        }
        let name = self.tok.1.text().to_string();
        self.next_token()?;
        Ok(name)
    }

    // Attributes and blocks end at a newline, the end of the file or the
    // closing brace of the enclosing block.
    fn expect_end_of_item(&mut self, nested: bool) -> Result<()> {
        match self.tok.0 {
            TokenKind::Newline => self.next_token(),
            TokenKind::Eof => Ok(()),
            TokenKind::Symbol if nested && self.token_text() == "}" => Ok(()),
            _ => bail!(self
                .tok
                .1
                .error("expecting newline after attribute or block definition")),
        }
    }

    fn parse_body(&mut self, open: Option<&Span>) -> Result<Body> {
        let mut attributes: BTreeMap<String, Attribute> = BTreeMap::new();
        let mut blocks = vec![];

        loop {
            self.skip_newlines()?;
            match self.tok.0 {
                TokenKind::Eof if open.is_some() => {
                    bail!(self.tok.1.error("unexpected end of file; expecting `}`"))
                }
                TokenKind::Eof => break,
                TokenKind::Symbol if open.is_some() && self.token_text() == "}" => break,
                TokenKind::Ident => (),
                _ => bail!(self
                    .tok
                    .1
                    .error("expecting an attribute or block definition")),
            }

            let name_span = self.tok.1.clone();
            let name = name_span.text().to_string();
            self.next_token()?;

            if self.token_text() == "=" {
                self.next_token()?;
                let expr = self.parse_expr()?;
                let span = name_span.to(expr.span());
                self.expect_end_of_item(open.is_some())?;
                if let Some(prev) = attributes.get(&name) {
                    bail!(name_span.error(&format!(
                        "attribute `{name}` was already defined at {}",
                        prev.name_span
                    )));
                }
                attributes.insert(
                    name.clone(),
                    Attribute {
                        span,
                        name_span,
                        name,
                        expr,
                    },
                );
                continue;
            }

            let mut labels = vec![];
            let mut label_spans = vec![];
            loop {
                match self.tok.0 {
                    TokenKind::Ident => {
                        labels.push(self.tok.1.text().to_string());
                    }
                    TokenKind::String => {
                        let parts = self.template_parts(&self.tok.1.clone())?;
                        match parts.as_slice() {
                            [] => labels.push(String::new()),
                            [TemplatePart::Literal(s)] => labels.push(s.clone()),
                            _ => bail!(self
                                .tok
                                .1
                                .error("block labels must not contain template sequences")),
                        }
                    }
                    _ => break,
                }
                label_spans.push(self.tok.1.clone());
                self.next_token()?;
            }
            let def_span = match label_spans.last() {
                Some(last) => name_span.to(last),
                None => name_span.clone(),
            };

            let open_span = self.tok.1.clone();
            self.expect("{", "to open block body")?;
            let body = self.parse_body(Some(&open_span))?;
            let close = self.tok.1.clone();
            self.next_token()?;
            self.expect_end_of_item(open.is_some())?;

            blocks.push(Block {
                span: name_span.to(&close),
                def_span,
                type_name: name,
                labels,
                label_spans,
                body,
            });
        }

        let span = match open {
            Some(open) => open.to(&self.tok.1),
            None => Span {
                source: self.source.clone(),
                line: 1,
                col: 1,
                start: 0,
                end: self.source.contents().len() as u32,
            },
        };
        Ok(Body {
            span,
            attributes,
            blocks,
        })
    }

    pub fn parse_expr(&mut self) -> Result<ExprRef> {
        let cond = self.parse_binary(0)?;
        if self.token_text() != "?" {
            return Ok(cond);
        }
        self.next_token()?;
        let true_expr = self.parse_expr()?;
        self.expect(":", "in conditional expression")?;
        let false_expr = self.parse_expr()?;
        Ok(Ref::new(Expr::Conditional {
            span: cond.span().to(false_expr.span()),
            cond,
            true_expr,
            false_expr,
        }))
    }

    fn parse_binary(&mut self, level: usize) -> Result<ExprRef> {
        if level == BINARY_OPS.len() {
            return self.parse_unary();
        }

        let mut lhs = self.parse_binary(level + 1)?;
        loop {
            let op = match BINARY_OPS[level]
                .iter()
                .find(|(text, _)| self.tok.0 == TokenKind::Symbol && *text == self.token_text())
            {
                Some((_, op)) => *op,
                None => break,
            };
            self.next_token()?;
            let rhs = self.parse_binary(level + 1)?;
            lhs = Ref::new(Expr::Binary {
                span: lhs.span().to(rhs.span()),
                op,
                lhs,
                rhs,
            });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ExprRef> {
        let start = self.tok.1.clone();
        let op = match self.token_text() {
            "-" => UnaryOp::Neg,
            "!" => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.next_token()?;
        let expr = self.parse_unary()?;
        let span = start.to(expr.span());

        // Fold negative number literals.
        if let (UnaryOp::Neg, Expr::Literal {
            value: Value::Number(n),
            ..
        }) = (op, expr.as_ref())
        {
            return Ok(Ref::new(Expr::Literal {
                span,
                value: Value::Number(n.neg()),
            }));
        }
        Ok(Ref::new(Expr::Unary { span, op, expr }))
    }

    fn parse_postfix(&mut self) -> Result<ExprRef> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.token_text() {
                "." => {
                    let dot = self.tok.1.clone();
                    self.next_token()?;
                    match self.tok.0 {
                        TokenKind::Ident => {
                            let step = TraversalStep::Attr {
                                span: dot.to(&self.tok.1),
                                name: self.tok.1.text().to_string(),
                            };
                            self.next_token()?;
                            expr = push_step(expr, step);
                        }
                        TokenKind::Number => {
                            // Legacy index syntax, `foo.0`.
                            let idx = match self.tok.1.text().parse::<u64>() {
                                Ok(idx) => idx,
                                Err(_) => bail!(self.tok.1.error("expecting an element index")),
                            };
                            let step = TraversalStep::Index {
                                span: dot.to(&self.tok.1),
                                key: Value::from(Number::from(idx as f64)),
                            };
                            self.next_token()?;
                            expr = push_step(expr, step);
                        }
                        TokenKind::Symbol if self.token_text() == "*" => {
                            let star = self.tok.1.clone();
                            self.next_token()?;
                            let each = self.parse_splat_steps(true)?;
                            let end = each.last().map(|s| s.span().clone()).unwrap_or(star);
                            expr = Ref::new(Expr::Splat {
                                span: expr.span().to(&end),
                                source: expr,
                                each,
                            });
                        }
                        _ => bail!(self.tok.1.error("expecting attribute name after `.`")),
                    }
                }
                "[" => {
                    let open = self.tok.1.clone();
                    self.nesting += 1;
                    self.next_token()?;
                    if self.token_text() == "*" {
                        self.next_token()?;
                        self.nesting -= 1;
                        let close = self.tok.1.clone();
                        self.expect("]", "to close splat operator")?;
                        let each = self.parse_splat_steps(false)?;
                        let end = each.last().map(|s| s.span().clone()).unwrap_or(close);
                        expr = Ref::new(Expr::Splat {
                            span: expr.span().to(&end),
                            source: expr,
                            each,
                        });
                        continue;
                    }

                    let key = self.parse_expr()?;
                    self.nesting -= 1;
                    let close = self.tok.1.clone();
                    self.expect("]", "to close index")?;
                    expr = match literal_value(&key) {
                        Some(key) => push_step(
                            expr,
                            TraversalStep::Index {
                                span: open.to(&close),
                                key,
                            },
                        ),
                        None => Ref::new(Expr::Index {
                            span: expr.span().to(&close),
                            collection: expr,
                            key,
                        }),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    // Steps applied to each element of a splat. Attribute-only splats (`.*`)
    // take only attribute steps.
    fn parse_splat_steps(&mut self, attrs_only: bool) -> Result<Vec<TraversalStep>> {
        let mut steps = vec![];
        loop {
            match self.token_text() {
                "." => {
                    let mut lookahead = self.lexer.clone();
                    let next = lookahead.next_token()?;
                    if next.0 != TokenKind::Ident {
                        break;
                    }
                    let span = self.tok.1.to(&next.1);
                    self.next_token()?;
                    steps.push(TraversalStep::Attr {
                        span,
                        name: self.tok.1.text().to_string(),
                    });
                    self.next_token()?;
                }
                "[" if !attrs_only => {
                    let saved = self.clone();
                    let open = self.tok.1.clone();
                    self.nesting += 1;
                    self.next_token()?;
                    let key = self.parse_expr()?;
                    self.nesting -= 1;
                    match literal_value(&key) {
                        Some(key) if self.token_text() == "]" => {
                            steps.push(TraversalStep::Index {
                                span: open.to(&self.tok.1),
                                key,
                            });
                            self.next_token()?;
                        }
                        _ => {
                            // Not a static index: leave it to the caller.
                            *self = saved;
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(steps)
    }

    fn parse_primary(&mut self) -> Result<ExprRef> {
        let span = self.tok.1.clone();
        match self.tok.0 {
            TokenKind::Number => {
                let n = match span.text().parse::<Number>() {
                    Ok(n) => n,
                    Err(_) => bail!(span.error("invalid number")),
                };
                self.next_token()?;
                Ok(Ref::new(Expr::Literal {
                    span,
                    value: Value::Number(n),
                }))
            }
            TokenKind::String => {
                let parts = self.template_parts(&span)?;
                self.next_token()?;
                // Include the quotes.
                let span = Span {
                    start: span.start - 1,
                    end: span.end + 1,
                    col: span.col.max(2) - 1,
                    ..span
                };
                Ok(Ref::new(Expr::Template { span, parts }))
            }
            TokenKind::Ident => self.parse_ident_expr(),
            TokenKind::Symbol => match self.token_text() {
                "(" => {
                    self.nesting += 1;
                    self.next_token()?;
                    let expr = self.parse_expr()?;
                    self.nesting -= 1;
                    let close = self.tok.1.clone();
                    self.expect(")", "to close parenthesized expression")?;
                    Ok(Ref::new(Expr::Parens {
                        span: span.to(&close),
                        expr,
                    }))
                }
                "[" => self.parse_tuple(),
                "{" => self.parse_object(),
                _ => bail!(span.error("expecting expression")),
            },
            TokenKind::Newline | TokenKind::Eof => bail!(span.error("expecting expression")),
        }
    }

    fn parse_ident_expr(&mut self) -> Result<ExprRef> {
        let span = self.tok.1.clone();
        let value = match span.text() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" => Some(Value::null()),
            _ => None,
        };
        self.next_token()?;
        if let Some(value) = value {
            return Ok(Ref::new(Expr::Literal { span, value }));
        }

        // Namespaced function names, e.g. provider::terraform::encode_tfvars.
        let mut name = span.text().to_string();
        while self.token_text() == "::" {
            self.next_token()?;
            name.push_str("::");
            name.push_str(&self.expect_ident("in function name")?);
        }

        if self.token_text() == "(" {
            return self.parse_call(span, name);
        }
        if name.contains("::") {
            bail!(span.error("expecting `(` after function name"));
        }
        Ok(Ref::new(Expr::ScopeTraversal {
            span,
            root: name,
            steps: vec![],
        }))
    }

    fn parse_call(&mut self, start: Span, name: String) -> Result<ExprRef> {
        self.nesting += 1;
        self.next_token()?;

        let mut args = vec![];
        let mut expand_final = false;
        while self.token_text() != ")" {
            args.push(self.parse_expr()?);
            if self.token_text() == "..." {
                self.next_token()?;
                expand_final = true;
                if self.token_text() == "," {
                    self.next_token()?;
                }
                if self.token_text() != ")" {
                    bail!(self
                        .tok
                        .1
                        .error("`...` may only be used with the final argument"));
                }
                break;
            }
            match self.token_text() {
                "," => self.next_token()?,
                ")" => (),
                _ => bail!(self.tok.1.error("expecting `,` or `)` in function call")),
            }
        }

        self.nesting -= 1;
        let close = self.tok.1.clone();
        self.next_token()?;
        Ok(Ref::new(Expr::FunctionCall {
            span: start.to(&close),
            name,
            args,
            expand_final,
        }))
    }

    fn parse_tuple(&mut self) -> Result<ExprRef> {
        let open = self.tok.1.clone();
        self.nesting += 1;
        self.next_token()?;
        if self.is_keyword("for") {
            return self.parse_for(open, false);
        }

        let mut items = vec![];
        while self.token_text() != "]" {
            items.push(self.parse_expr()?);
            match self.token_text() {
                "," => self.next_token()?,
                "]" => (),
                _ => bail!(self.tok.1.error("expecting `,` or `]` in tuple")),
            }
        }

        self.nesting -= 1;
        let close = self.tok.1.clone();
        self.next_token()?;
        Ok(Ref::new(Expr::Tuple {
            span: open.to(&close),
            items,
        }))
    }

    fn parse_object(&mut self) -> Result<ExprRef> {
        let open = self.tok.1.clone();
        // Newlines separate the items of an object.
        let saved = mem::replace(&mut self.nesting, 0);
        self.next_token()?;
        self.skip_newlines()?;

        if self.is_keyword("for") {
            let mut lookahead = self.lexer.clone();
            if lookahead.next_token()?.0 == TokenKind::Ident {
                self.nesting = saved + 1;
                return self.parse_for(open, true);
            }
        }

        let mut items = vec![];
        loop {
            self.skip_newlines()?;
            if self.token_text() == "}" {
                break;
            }

            let key = self.parse_object_key()?;
            if !matches!(self.token_text(), "=" | ":") {
                bail!(self.tok.1.error("expecting `=` after object key"));
            }
            self.next_token()?;
            let value = self.parse_expr()?;
            items.push((key, value));

            match (&self.tok.0, self.token_text()) {
                (TokenKind::Newline, _) | (_, "}") => (),
                (_, ",") => self.next_token()?,
                _ => bail!(self
                    .tok
                    .1
                    .error("expecting newline or `,` after object item")),
            }
        }

        self.nesting = saved;
        let close = self.tok.1.clone();
        self.next_token()?;
        Ok(Ref::new(Expr::Object {
            span: open.to(&close),
            items,
        }))
    }

    fn parse_object_key(&mut self) -> Result<ObjectKey> {
        if self.tok.0 == TokenKind::Ident {
            let mut lookahead = self.lexer.clone();
            let next = lookahead.next_token()?;
            if next.0 == TokenKind::Symbol && matches!(next.1.text(), "=" | ":") {
                let span = self.tok.1.clone();
                self.next_token()?;
                return Ok(ObjectKey::Name(span.clone(), span.text().to_string()));
            }
        }
        Ok(ObjectKey::Expr(self.parse_expr()?))
    }

    // Parses the rest of a `for` expression. The opening bracket has been
    // consumed and the current token is `for`.
    fn parse_for(&mut self, open: Span, object: bool) -> Result<ExprRef> {
        self.next_token()?;
        let first = self.expect_ident("in for expression")?;
        let (key_var, value_var) = match self.token_text() {
            "," => {
                self.next_token()?;
                (Some(first), self.expect_ident("in for expression")?)
            }
            _ => (None, first),
        };
        if !self.is_keyword("in") {
            bail!(self.tok.1.error("expecting `in` in for expression"));
        }
        self.next_token()?;
        let collection = self.parse_expr()?;
        self.expect(":", "in for expression")?;

        let (key_expr, value_expr) = match object {
            true => {
                let key = self.parse_expr()?;
                self.expect("=>", "in for expression")?;
                (Some(key), self.parse_expr()?)
            }
            false => (None, self.parse_expr()?),
        };

        let group = object && self.token_text() == "...";
        if group {
            self.next_token()?;
        }

        let cond = match self.is_keyword("if") {
            true => {
                self.next_token()?;
                Some(self.parse_expr()?)
            }
            false => None,
        };

        self.nesting -= 1;
        let close = self.tok.1.clone();
        self.expect(
            if object { "}" } else { "]" },
            "to close for expression",
        )?;
        Ok(Ref::new(Expr::For {
            span: open.to(&close),
            key_var,
            value_var,
            collection,
            key_expr,
            value_expr,
            cond,
            group,
        }))
    }

    // Splits the raw text of a quoted template into literal text and
    // interpolation sequences.
    fn template_parts(&self, span: &Span) -> Result<Vec<TemplatePart>> {
        let text = span.text();
        let base = span.start as usize;
        let mut parts = vec![];
        let mut lit = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((idx, ch)) = chars.next() {
            let rest = &text[idx + ch.len_utf8()..];
            match ch {
                '\\' => {
                    let c = match chars.next() {
                        Some((_, c)) => c,
                        None => bail!(span.error("invalid escape sequence")),
                    };
                    match c {
                        'n' => lit.push('\n'),
                        'r' => lit.push('\r'),
                        't' => lit.push('\t'),
                        '"' => lit.push('"'),
                        '\\' => lit.push('\\'),
                        'u' | 'U' => {
                            let len = if c == 'u' { 4 } else { 8 };
                            let mut hex = String::new();
                            for _ in 0..len {
                                match chars.next() {
                                    Some((_, h)) if h.is_ascii_hexdigit() => hex.push(h),
                                    _ => bail!(span.error("invalid unicode escape sequence")),
                                }
                            }
                            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                                Some(u) => lit.push(u),
                                None => bail!(span.error("invalid unicode escape sequence")),
                            }
                        }
                        _ => bail!(span.error(&format!("invalid escape sequence `\\{c}`"))),
                    }
                }
                '$' | '%' if rest.starts_with(ch) && rest[ch.len_utf8()..].starts_with('{') => {
                    lit.push(ch);
                    lit.push('{');
                    chars.next();
                    chars.next();
                }
                '%' if rest.starts_with('{') => {
                    bail!(span.error("template directives are not supported"))
                }
                '$' if rest.starts_with('{') => {
                    if !lit.is_empty() {
                        parts.push(TemplatePart::Literal(mem::take(&mut lit)));
                    }
                    let start = (base + idx + 2) as u32;
                    let mut parser = Parser::new_range(&self.source, start, span.end)?;
                    let expr = parser.parse_expr()?;
                    if parser.token_text() != "}" {
                        bail!(parser.tok.1.error("expecting `}` to close interpolation"));
                    }
                    let close = parser.tok.1.end as usize;
                    parts.push(TemplatePart::Interp(expr));
                    while matches!(chars.peek(), Some((i, _)) if base + *i < close) {
                        chars.next();
                    }
                }
                c => lit.push(c),
            }
        }

        if !lit.is_empty() {
            parts.push(TemplatePart::Literal(lit));
        }
        Ok(parts)
    }
}

/// The value of an expression that is a literal or a template without
/// interpolations.
pub fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Literal { value, .. } => Some(value.clone()),
        Expr::Template { parts, .. } => match parts.as_slice() {
            [] => Some(Value::from("")),
            [TemplatePart::Literal(s)] => Some(Value::from(s.as_str())),
            _ => None,
        },
        _ => None,
    }
}

fn push_step(expr: ExprRef, step: TraversalStep) -> ExprRef {
    let span = expr.span().to(step.span());
    match expr.as_ref() {
        Expr::ScopeTraversal { root, steps, .. } => {
            let mut steps = steps.clone();
            steps.push(step);
            Ref::new(Expr::ScopeTraversal {
                span,
                root: root.clone(),
                steps,
            })
        }
        Expr::RelativeTraversal { source, steps, .. } => {
            let mut steps = steps.clone();
            steps.push(step);
            Ref::new(Expr::RelativeTraversal {
                span,
                source: source.clone(),
                steps,
            })
        }
        _ => Ref::new(Expr::RelativeTraversal {
            span,
            source: expr.clone(),
            steps: vec![step],
        }),
    }
}
