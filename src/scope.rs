// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Binding of expression evaluation to a source of reference values.

use crate::addrs::*;
use crate::ast::*;
use crate::convert::convert;
use crate::diagnostics::*;
use crate::interpreter::{EvalContext, Interpreter};
use crate::lexer::Span;
use crate::types::Type;
use crate::value::*;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

/// Resolves the values of references made by expressions.
pub trait Data {
    /// Checks references before any of them is resolved.
    fn static_validate_references(
        &self,
        refs: &[Reference],
        self_addr: Option<&Referenceable>,
        source_addr: Option<&Referenceable>,
    ) -> Diagnostics;

    /// Value of a single reference. Recoverable problems are reported as
    /// diagnostics alongside an unknown value; errors abort the evaluation.
    fn get_reference(&mut self, reference: &Reference) -> Result<(Value, Diagnostics)>;
}

/// Block types whose `dynamic` blocks are expanded, with the schemas of
/// their own bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodySchema {
    pub blocks: Vec<BlockSchema>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockSchema {
    pub type_name: String,
    pub body: BodySchema,
}

impl BodySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(mut self, type_name: &str, body: BodySchema) -> Self {
        self.blocks.push(BlockSchema {
            type_name: type_name.to_string(),
            body,
        });
        self
    }

    pub fn find(&self, type_name: &str) -> Option<&BodySchema> {
        self.blocks
            .iter()
            .find(|b| b.type_name == type_name)
            .map(|b| &b.body)
    }
}

pub struct Scope<'a> {
    pub data: &'a mut dyn Data,
    // What `self` refers to, if anything.
    pub self_addr: Option<Referenceable>,
    pub source_addr: Option<Referenceable>,
    pub base_dir: String,
    pub pure_only: bool,
}

// Objects for the roots of the references made by an expression.
#[derive(Default)]
struct RootObjects {
    roots: BTreeMap<String, BTreeMap<String, Value>>,
    data: BTreeMap<String, BTreeMap<String, Value>>,
    self_value: Option<Value>,
}

impl RootObjects {
    fn insert(&mut self, subject: &Referenceable, value: Value) {
        let (root, name) = match subject {
            Referenceable::InputVariable(n) => ("var", n),
            Referenceable::LocalValue(n) => ("local", n),
            Referenceable::OutputValue(n) => ("output", n),
            Referenceable::PathAttr(n) => ("path", n),
            Referenceable::TerraformAttr(n) => ("terraform", n),
            Referenceable::CountAttr(n) => ("count", n),
            Referenceable::ForEachAttr(n) => ("each", n),
            Referenceable::ModuleCall(n) => ("module", n),
            Referenceable::Resource {
                mode: ResourceMode::Managed,
                type_name,
                name,
            } => (type_name.as_str(), name),
            Referenceable::Resource {
                mode: ResourceMode::Data,
                type_name,
                name,
            } => {
                self.data
                    .entry(type_name.clone())
                    .or_default()
                    .insert(name.clone(), value);
                return;
            }
            Referenceable::SelfRef => {
                self.self_value = Some(value);
                return;
            }
        };
        self.roots
            .entry(root.to_string())
            .or_default()
            .insert(name.clone(), value);
    }

    fn into_variables(self) -> BTreeMap<String, Value> {
        let mut vars: BTreeMap<String, Value> = self
            .roots
            .into_iter()
            .map(|(root, attrs)| (root, Value::object(attrs)))
            .collect();
        if !self.data.is_empty() {
            let types = self
                .data
                .into_iter()
                .map(|(ty, names)| (ty, Value::object(names)))
                .collect();
            vars.insert("data".to_string(), Value::object(types));
        }
        if let Some(v) = self.self_value {
            vars.insert("self".to_string(), v);
        }
        vars
    }
}

impl<'a> Scope<'a> {
    pub fn new(data: &'a mut dyn Data) -> Self {
        Scope {
            data,
            self_addr: None,
            source_addr: None,
            base_dir: ".".to_string(),
            pure_only: false,
        }
    }

    /// Evaluates `expr` and converts the result to `want`.
    ///
    /// Problems with the references made by `expr` stop the evaluation and
    /// give an unknown value of the wanted type.
    pub fn eval_expr(&mut self, expr: &Expr, want: &Type) -> Result<(Value, Diagnostics)> {
        let (refs, mut diags) = references_in_expr(expr, &[]);
        diags.extend(self.data.static_validate_references(
            &refs,
            self.self_addr.as_ref(),
            self.source_addr.as_ref(),
        ));

        let mut roots = RootObjects::default();
        let mut seen = BTreeSet::new();
        for r in &refs {
            if !seen.insert(r.subject.to_string()) {
                continue;
            }
            log::debug!("resolving {}", r.subject);
            let (value, ref_diags) = self.data.get_reference(r)?;
            diags.extend(ref_diags);
            roots.insert(&r.subject, value);
        }
        if diags.has_errors() {
            return Ok((Value::Unknown(want.clone()), diags));
        }

        let ctx = EvalContext {
            variables: roots.into_variables(),
            pure_only: self.pure_only,
        };
        let (value, eval_diags) = Interpreter::new(&ctx).evaluate(expr);
        diags.extend(eval_diags);

        match convert(&value, want) {
            Ok(v) => Ok((v, diags)),
            Err(e) => {
                diags.push(Diagnostic::error(
                    DiagnosticKind::TypeMismatch,
                    "Incorrect value type",
                    &format!("Invalid expression value: {e}."),
                    Some(expr.span().clone()),
                ));
                Ok((Value::Unknown(want.clone()), diags))
            }
        }
    }

    /// Replaces the `dynamic` blocks of `body` that generate blocks named in
    /// `schema` by the blocks they generate.
    pub fn expand_block(&mut self, body: &Body, schema: &BodySchema) -> Result<(Body, Diagnostics)> {
        let mut diags = Diagnostics::new();
        let mut blocks = vec![];
        for block in &body.blocks {
            match (block.type_name.as_str(), block.labels.as_slice()) {
                ("dynamic", [type_name]) => match schema.find(type_name) {
                    Some(nested) => {
                        blocks.extend(self.expand_dynamic(block, type_name, nested, &mut diags)?)
                    }
                    None => blocks.push(block.clone()),
                },
                (type_name, _) => match schema.find(type_name) {
                    Some(nested) => {
                        let (expanded, d) = self.expand_block(&block.body, nested)?;
                        diags.extend(d);
                        blocks.push(Block {
                            body: expanded,
                            ..block.clone()
                        });
                    }
                    None => blocks.push(block.clone()),
                },
            }
        }

        Ok((
            Body {
                span: body.span.clone(),
                attributes: body.attributes.clone(),
                blocks,
            },
            diags,
        ))
    }

    fn expand_dynamic(
        &mut self,
        block: &Block,
        type_name: &str,
        schema: &BodySchema,
        diags: &mut Diagnostics,
    ) -> Result<Vec<Block>> {
        let for_each = match block.body.attribute("for_each") {
            Some(attr) => attr,
            None => {
                diags.push(Diagnostic::error(
                    DiagnosticKind::Decode,
                    "Missing required argument",
                    "The argument \"for_each\" is required, but no definition was found.",
                    Some(block.def_span.clone()),
                ));
                return Ok(vec![]);
            }
        };
        let content = match block.body.blocks_of_type("content").next() {
            Some(c) => c,
            None => {
                diags.push(Diagnostic::error(
                    DiagnosticKind::Decode,
                    "Missing content block",
                    "A dynamic block must have a nested block of type \"content\" to describe the body of each generated block.",
                    Some(block.def_span.clone()),
                ));
                return Ok(vec![]);
            }
        };
        let iterator = match block.body.attribute("iterator") {
            Some(attr) => match attr.expr.as_keyword() {
                Some(name) => name.to_string(),
                None => {
                    diags.push(Diagnostic::error(
                        DiagnosticKind::Decode,
                        "Invalid dynamic iterator name",
                        "Dynamic iterator must be a single variable name.",
                        Some(attr.expr.span().clone()),
                    ));
                    return Ok(vec![]);
                }
            },
            None => type_name.to_string(),
        };
        let labels: Vec<ExprRef> = match block.body.attribute("labels") {
            Some(attr) => match attr.expr.as_ref() {
                Expr::Tuple { items, .. } => items.clone(),
                e => {
                    diags.push(Diagnostic::error(
                        DiagnosticKind::Decode,
                        "Invalid dynamic block labels",
                        "The labels argument must be a tuple of label expressions.",
                        Some(e.span().clone()),
                    ));
                    return Ok(vec![]);
                }
            },
            None => vec![],
        };

        let (collection, d) = self.eval_expr(&for_each.expr, &Type::Dynamic)?;
        diags.extend(d);
        let (collection, _) = collection.unmark_deep();
        let elements: Vec<(Value, Value)> = match &collection {
            Value::Unknown(_) => vec![(DYNAMIC, DYNAMIC)],
            Value::Null(_) => {
                diags.push(invalid_for_each(
                    "Cannot use a null value in for_each.",
                    for_each.expr.span(),
                ));
                return Ok(vec![]);
            }
            Value::Set(_, items) => items.iter().map(|v| (v.clone(), v.clone())).collect(),
            v => match v.elements() {
                Some(elements) => elements,
                None => {
                    diags.push(invalid_for_each(
                        &format!(
                            "Cannot use a {} value in for_each. An iterable collection is required.",
                            v.ty()
                        ),
                        for_each.expr.span(),
                    ));
                    return Ok(vec![]);
                }
            },
        };

        let mut out = vec![];
        for (key, value) in elements {
            let iter_value = Value::object(BTreeMap::from([
                ("key".to_string(), key),
                ("value".to_string(), value),
            ]));

            let mut block_labels = vec![];
            let mut label_spans = vec![];
            let mut labels_known = true;
            for label in &labels {
                let label = substitute(label, &iterator, &iter_value);
                let (v, d) = self.eval_expr(&label, &Type::String)?;
                diags.extend(d);
                match v.unmark_deep().0 {
                    Value::String(s) => block_labels.push(s.to_string()),
                    Value::Unknown(_) => labels_known = false,
                    _ => {
                        diags.push(Diagnostic::error(
                            DiagnosticKind::Evaluation,
                            "Invalid dynamic block label",
                            "Cannot use a null value as a dynamic block label.",
                            Some(label.span().clone()),
                        ));
                        labels_known = false;
                    }
                }
                label_spans.push(label.span().clone());
            }
            // A block with unknown labels cannot be represented.
            if !labels_known {
                continue;
            }

            let content_body = substitute_body(&content.body, &iterator, &iter_value);
            let (body, d) = self.expand_block(&content_body, schema)?;
            diags.extend(d);
            out.push(Block {
                span: block.span.clone(),
                def_span: block.def_span.clone(),
                type_name: type_name.to_string(),
                labels: block_labels,
                label_spans,
                body,
            });
        }
        Ok(out)
    }
}

fn invalid_for_each(detail: &str, span: &Span) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Evaluation,
        "Invalid dynamic for_each value",
        detail,
        Some(span.clone()),
    )
}

// Copy of `body` where the iterator `name` is replaced by `value`.
fn substitute_body(body: &Body, name: &str, value: &Value) -> Body {
    let attributes = body
        .attributes
        .iter()
        .map(|(k, attr)| {
            let attr = Attribute {
                expr: substitute(&attr.expr, name, value),
                ..attr.clone()
            };
            (k.clone(), attr)
        })
        .collect();

    let blocks = body
        .blocks
        .iter()
        .map(|block| {
            let shadows = block.type_name == "dynamic"
                && match block.body.attribute("iterator") {
                    Some(attr) => attr.expr.as_keyword() == Some(name),
                    None => block.labels.first().map(String::as_str) == Some(name),
                };
            let body = match shadows {
                // Only for_each still sees the outer iterator.
                true => {
                    let mut body = block.body.clone();
                    if let Some(attr) = body.attributes.get_mut("for_each") {
                        attr.expr = substitute(&attr.expr, name, value);
                    }
                    body
                }
                false => substitute_body(&block.body, name, value),
            };
            Block {
                body,
                ..block.clone()
            }
        })
        .collect();

    Body {
        span: body.span.clone(),
        attributes,
        blocks,
    }
}

fn substitute(expr: &ExprRef, name: &str, value: &Value) -> ExprRef {
    let sub = |e: &ExprRef| substitute(e, name, value);
    let new = match expr.as_ref() {
        Expr::ScopeTraversal { span, root, steps } if root == name => Expr::RelativeTraversal {
            span: span.clone(),
            source: ExprRef::new(Expr::Literal {
                span: span.clone(),
                value: value.clone(),
            }),
            steps: steps.clone(),
        },
        Expr::Literal { .. } | Expr::ScopeTraversal { .. } => return expr.clone(),
        Expr::Template { span, parts } => Expr::Template {
            span: span.clone(),
            parts: parts
                .iter()
                .map(|p| match p {
                    TemplatePart::Interp(e) => TemplatePart::Interp(sub(e)),
                    lit => lit.clone(),
                })
                .collect(),
        },
        Expr::RelativeTraversal {
            span,
            source,
            steps,
        } => Expr::RelativeTraversal {
            span: span.clone(),
            source: sub(source),
            steps: steps.clone(),
        },
        Expr::Index {
            span,
            collection,
            key,
        } => Expr::Index {
            span: span.clone(),
            collection: sub(collection),
            key: sub(key),
        },
        Expr::Splat { span, source, each } => Expr::Splat {
            span: span.clone(),
            source: sub(source),
            each: each.clone(),
        },
        Expr::Tuple { span, items } => Expr::Tuple {
            span: span.clone(),
            items: items.iter().map(sub).collect(),
        },
        Expr::Object { span, items } => Expr::Object {
            span: span.clone(),
            items: items
                .iter()
                .map(|(k, v)| {
                    let k = match k {
                        ObjectKey::Expr(e) => ObjectKey::Expr(sub(e)),
                        k => k.clone(),
                    };
                    (k, sub(v))
                })
                .collect(),
        },
        Expr::FunctionCall {
            span,
            name: fname,
            args,
            expand_final,
        } => Expr::FunctionCall {
            span: span.clone(),
            name: fname.clone(),
            args: args.iter().map(sub).collect(),
            expand_final: *expand_final,
        },
        Expr::Unary { span, op, expr } => Expr::Unary {
            span: span.clone(),
            op: *op,
            expr: sub(expr),
        },
        Expr::Binary { span, op, lhs, rhs } => Expr::Binary {
            span: span.clone(),
            op: *op,
            lhs: sub(lhs),
            rhs: sub(rhs),
        },
        Expr::Conditional {
            span,
            cond,
            true_expr,
            false_expr,
        } => Expr::Conditional {
            span: span.clone(),
            cond: sub(cond),
            true_expr: sub(true_expr),
            false_expr: sub(false_expr),
        },
        Expr::For {
            span,
            key_var,
            value_var,
            collection,
            key_expr,
            value_expr,
            cond,
            group,
        } => {
            let shadowed = value_var == name || key_var.as_deref() == Some(name);
            let inner = |e: &ExprRef| match shadowed {
                true => e.clone(),
                false => sub(e),
            };
            Expr::For {
                span: span.clone(),
                key_var: key_var.clone(),
                value_var: value_var.clone(),
                collection: sub(collection),
                key_expr: key_expr.as_ref().map(inner),
                value_expr: inner(value_expr),
                cond: cond.as_ref().map(inner),
                group: *group,
            }
        }
        Expr::Parens { span, expr } => Expr::Parens {
            span: span.clone(),
            expr: sub(expr),
        },
    };
    ExprRef::new(new)
}
