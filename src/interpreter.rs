// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::addrs::references_in_expr;
use crate::ast::*;
use crate::convert::{convert, unify};
use crate::diagnostics::*;
use crate::functions;
use crate::lexer::Span;
use crate::types::Type;
use crate::value::*;

use core::mem;
use std::collections::BTreeMap;

/// Names visible to an expression, and whether impure functions may run.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub variables: BTreeMap<String, Value>,
    pub pure_only: bool,
}

type Scope = BTreeMap<String, Value>;

#[derive(Debug)]
struct EvalError {
    span: Span,
    summary: &'static str,
    detail: String,
}

impl EvalError {
    fn new(span: &Span, summary: &'static str, detail: impl Into<String>) -> Self {
        EvalError {
            span: span.clone(),
            summary,
            detail: detail.into(),
        }
    }
}

type EvalResult = core::result::Result<Value, EvalError>;

enum ForItem {
    Skip,
    Unknown,
    Item(Option<String>, Value),
}

/// Evaluates expressions against an [`EvalContext`].
///
/// Errors never abort evaluation: the failing sub-expression evaluates to an
/// unknown value and a diagnostic is recorded.
pub struct Interpreter<'ctx> {
    ctx: &'ctx EvalContext,
    // Names bound by enclosing `for` expressions, innermost last.
    scopes: Vec<Scope>,
    diags: Diagnostics,
}

/// Evaluates an expression that must not refer to anything, such as a
/// variable default.
pub fn eval_constant(expr: &Expr) -> (Value, Diagnostics) {
    let (refs, ref_diags) = references_in_expr(expr, &[]);
    let subject = match (refs.first(), ref_diags.iter().next()) {
        (Some(r), _) => Some(r.source_range.clone()),
        (None, Some(d)) => d.subject.clone(),
        (None, None) => None,
    };
    if subject.is_some() {
        let diag = Diagnostic::error(
            DiagnosticKind::Evaluation,
            "Variables not allowed",
            "Variables may not be used here.",
            subject,
        );
        return (DYNAMIC, diag.into());
    }

    let ctx = EvalContext::default();
    Interpreter::new(&ctx).evaluate(expr)
}

/// Equality as the `==` operator sees it. `None` if either side is not
/// wholly known.
pub fn values_equal(a: &Value, b: &Value) -> Option<bool> {
    let (a, _) = a.unmark_deep();
    let (b, _) = b.unmark_deep();
    if a.is_null() || b.is_null() {
        return match a.is_known() && b.is_known() {
            true => Some(a.is_null() && b.is_null()),
            false => None,
        };
    }
    if !a.is_wholly_known() || !b.is_wholly_known() {
        return None;
    }
    if a.ty() != b.ty() {
        return Some(false);
    }
    Some(a == b)
}

fn element_type(ty: &Type) -> Type {
    match ty.element_type() {
        Some(e) => e.clone(),
        None => Type::Dynamic,
    }
}

fn operand(v: &Value, ty: &Type, span: &Span, which: &str) -> EvalResult {
    if v.is_null() {
        return Err(EvalError::new(
            span,
            "Invalid operand",
            format!("Unsuitable value for {which} operand: a {ty} is required."),
        ));
    }
    convert(v, ty).map_err(|e| {
        EvalError::new(
            span,
            "Invalid operand",
            format!("Unsuitable value for {which} operand: {e}."),
        )
    })
}

impl<'ctx> Interpreter<'ctx> {
    pub fn new(ctx: &'ctx EvalContext) -> Self {
        Interpreter {
            ctx,
            scopes: vec![],
            diags: Diagnostics::new(),
        }
    }

    pub fn evaluate(mut self, expr: &Expr) -> (Value, Diagnostics) {
        let value = self.eval(expr);
        (value, self.diags)
    }

    fn eval(&mut self, expr: &Expr) -> Value {
        match self.eval_expr(expr) {
            Ok(v) => v,
            Err(e) => {
                self.diags.push(Diagnostic::error(
                    DiagnosticKind::Evaluation,
                    e.summary,
                    &e.detail,
                    Some(e.span),
                ));
                DYNAMIC
            }
        }
    }

    // Evaluates `expr`, returning its diagnostics instead of recording them.
    fn eval_captured(&mut self, expr: &Expr) -> (Value, Diagnostics) {
        let saved = mem::take(&mut self.diags);
        let value = self.eval(expr);
        let diags = mem::replace(&mut self.diags, saved);
        (value, diags)
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Some(v.clone());
            }
        }
        self.ctx.variables.get(name).cloned()
    }

    fn eval_expr(&mut self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal { value, .. } => Ok(value.clone()),
            Expr::Parens { expr, .. } => Ok(self.eval(expr)),
            Expr::Template { span, parts } => self.eval_template(span, parts),
            Expr::ScopeTraversal { span, root, steps } => {
                let mut val = match self.lookup(root) {
                    Some(v) => v,
                    None => {
                        return Err(EvalError::new(
                            span,
                            "Unknown variable",
                            format!("There is no variable named {root:?}."),
                        ))
                    }
                };
                for step in steps {
                    val = self.apply_step(val, step)?;
                }
                Ok(val)
            }
            Expr::RelativeTraversal { source, steps, .. } => {
                let mut val = self.eval(source);
                for step in steps {
                    val = self.apply_step(val, step)?;
                }
                Ok(val)
            }
            Expr::Index {
                span,
                collection,
                key,
            } => {
                let coll = self.eval(collection);
                let key = self.eval(key);
                self.index(coll, key, span)
            }
            Expr::Splat { source, each, .. } => {
                let (src, marks) = self.eval(source).unmark();
                let out = match &src {
                    Value::Null(_) => Value::tuple(vec![]),
                    Value::Unknown(_) => DYNAMIC,
                    Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items.iter() {
                            let mut v = item.clone();
                            for step in each {
                                v = self.apply_step(v, step)?;
                            }
                            out.push(v);
                        }
                        Value::tuple(out)
                    }
                    // A single value is treated as a one-element tuple.
                    v => {
                        let mut v = v.clone();
                        for step in each {
                            v = self.apply_step(v, step)?;
                        }
                        Value::tuple(vec![v])
                    }
                };
                Ok(out.mark_with(marks))
            }
            Expr::Tuple { items, .. } => {
                Ok(Value::tuple(items.iter().map(|i| self.eval(i)).collect()))
            }
            Expr::Object { items, .. } => self.eval_object(items),
            Expr::FunctionCall {
                span,
                name,
                args,
                expand_final,
            } => self.eval_call(span, name, args, *expand_final),
            Expr::Unary { span, op, expr } => {
                let (v, marks) = self.eval(expr).unmark_deep();
                let out = match op {
                    UnaryOp::Neg => {
                        let v = operand(&v, &Type::Number, span, "unary")?;
                        match v.as_number() {
                            Some(n) => Value::Number(n.neg()),
                            None => Value::Unknown(Type::Number),
                        }
                    }
                    UnaryOp::Not => {
                        let v = operand(&v, &Type::Bool, span, "unary")?;
                        match v.as_bool() {
                            Some(b) => Value::Bool(!b),
                            None => Value::Unknown(Type::Bool),
                        }
                    }
                };
                Ok(out.mark_with(marks))
            }
            Expr::Binary { span, op, lhs, rhs } => {
                let (l, mut marks) = self.eval(lhs).unmark_deep();
                let (r, rmarks) = self.eval(rhs).unmark_deep();
                marks.extend(rmarks);
                let out = self.eval_binary(*op, &l, &r, lhs.span(), rhs.span(), span)?;
                Ok(out.mark_with(marks))
            }
            Expr::Conditional {
                span,
                cond,
                true_expr,
                false_expr,
            } => self.eval_conditional(span, cond, true_expr, false_expr),
            Expr::For {
                key_var,
                value_var,
                collection,
                key_expr,
                value_expr,
                cond,
                group,
                ..
            } => {
                let (coll, mut marks) = self.eval(collection).unmark();
                let items = match &coll {
                    Value::Null(_) => {
                        return Err(EvalError::new(
                            collection.span(),
                            "Iteration over null value",
                            "A null value cannot be used as the collection in a 'for' expression.",
                        ))
                    }
                    Value::Unknown(_) => return Ok(DYNAMIC.mark_with(marks)),
                    // Set elements are their own keys.
                    Value::Set(_, items) => items.iter().map(|v| (v.clone(), v.clone())).collect(),
                    v => match v.elements() {
                        Some(elements) => elements,
                        None => {
                            return Err(EvalError::new(
                                collection.span(),
                                "Iteration over non-iterable value",
                                format!(
                                    "A value of type {} cannot be used as the collection in a 'for' expression.",
                                    v.ty()
                                ),
                            ))
                        }
                    },
                };

                let mut tuple = vec![];
                let mut object: BTreeMap<String, Value> = BTreeMap::new();
                let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
                for (k, v) in items {
                    let mut scope = Scope::new();
                    if let Some(key_var) = key_var {
                        scope.insert(key_var.clone(), k);
                    }
                    scope.insert(value_var.clone(), v);

                    self.scopes.push(scope);
                    let item = self.eval_for_item(key_expr, value_expr, cond, &mut marks);
                    self.scopes.pop();

                    match item? {
                        ForItem::Skip => (),
                        ForItem::Unknown => return Ok(DYNAMIC.mark_with(marks)),
                        ForItem::Item(None, value) => tuple.push(value),
                        ForItem::Item(Some(key), value) if *group => {
                            groups.entry(key).or_default().push(value)
                        }
                        ForItem::Item(Some(key), value) => {
                            if object.contains_key(&key) {
                                let span = match key_expr {
                                    Some(k) => k.span(),
                                    None => expr.span(),
                                };
                                return Err(EvalError::new(
                                    span,
                                    "Duplicate object key",
                                    format!(
                                        "Two different items produced the key {key:?} in this 'for' expression. If duplicates are expected, use the ellipsis (...) after the value expression to enable grouping by key."
                                    ),
                                ));
                            }
                            object.insert(key, value);
                        }
                    }
                }

                let out = match (key_expr.is_some(), *group) {
                    (false, _) => Value::tuple(tuple),
                    (true, false) => Value::object(object),
                    (true, true) => Value::object(
                        groups
                            .into_iter()
                            .map(|(k, vs)| (k, Value::tuple(vs)))
                            .collect(),
                    ),
                };
                Ok(out.mark_with(marks))
            }
        }
    }

    fn apply_step(&mut self, val: Value, step: &TraversalStep) -> EvalResult {
        match step {
            TraversalStep::Attr { span, name } => self.get_attr(val, name, span),
            TraversalStep::Index { span, key } => self.index(val, key.clone(), span),
        }
    }

    fn get_attr(&mut self, val: Value, name: &str, span: &Span) -> EvalResult {
        let (val, marks) = val.unmark();
        let out = match &val {
            Value::Null(_) => {
                return Err(EvalError::new(
                    span,
                    "Attempt to get attribute from null value",
                    "This value is null, so it does not have any attributes.",
                ))
            }
            Value::Unknown(ty) => Value::Unknown(match ty {
                Type::Object(attrs, _) => attrs.get(name).cloned().unwrap_or(Type::Dynamic),
                Type::Map(e) => e.as_ref().clone(),
                _ => Type::Dynamic,
            }),
            Value::Object(attrs) => match attrs.get(name) {
                Some(v) => v.clone(),
                None => {
                    return Err(EvalError::new(
                        span,
                        "Unsupported attribute",
                        format!("This object does not have an attribute named {name:?}."),
                    ))
                }
            },
            Value::Map(_, entries) => match entries.get(name) {
                Some(v) => v.clone(),
                None => {
                    return Err(EvalError::new(
                        span,
                        "Missing map element",
                        format!("This map does not have an element with the key {name:?}."),
                    ))
                }
            },
            Value::List(..) | Value::Set(..) | Value::Tuple(_) => {
                return Err(EvalError::new(
                    span,
                    "Unsupported attribute",
                    "Can't access attributes on a list of objects. Did you mean to access an attribute for a specific element of the list, or across all elements of the list?",
                ))
            }
            v => {
                return Err(EvalError::new(
                    span,
                    "Unsupported attribute",
                    format!("Can't access attributes on a primitive-typed value ({}).", v.ty()),
                ))
            }
        };
        Ok(out.mark_with(marks))
    }

    fn index(&mut self, coll: Value, key: Value, span: &Span) -> EvalResult {
        let (coll, mut marks) = coll.unmark();
        let (key, key_marks) = key.unmark_deep();
        marks.extend(key_marks);

        if key.is_null() {
            return Err(EvalError::new(
                span,
                "Invalid index",
                "Can't use a null value as an indexing key.",
            ));
        }
        let invalid = || {
            EvalError::new(
                span,
                "Invalid index",
                "The given key does not identify an element in this collection value.",
            )
        };

        let out = match &coll {
            Value::Null(_) => {
                return Err(EvalError::new(
                    span,
                    "Attempt to index null value",
                    "This value is null, so it does not have any indices.",
                ))
            }
            Value::Unknown(ty) => Value::Unknown(element_type(ty)),
            Value::Set(..) => {
                return Err(EvalError::new(
                    span,
                    "Invalid index",
                    "Elements of a set are identified only by their value and don't have any separate index or key to select with, so it's only possible to perform operations across all elements of the set.",
                ))
            }
            c if !key.is_known() => Value::Unknown(element_type(&c.ty())),
            Value::List(_, items) | Value::Tuple(items) => {
                let idx = convert(&key, &Type::Number)
                    .ok()
                    .and_then(|k| k.as_number().and_then(|n| n.as_i64()));
                match idx {
                    Some(i) if i >= 0 && (i as usize) < items.len() => items[i as usize].clone(),
                    _ => return Err(invalid()),
                }
            }
            Value::Map(_, entries) | Value::Object(entries) => {
                let key = match convert(&key, &Type::String) {
                    Ok(k) => k,
                    Err(_) => return Err(invalid()),
                };
                match key.as_str().and_then(|k| entries.get(k)) {
                    Some(v) => v.clone(),
                    None => return Err(invalid()),
                }
            }
            _ => {
                return Err(EvalError::new(
                    span,
                    "Invalid index",
                    "This value does not have any indices.",
                ))
            }
        };
        Ok(out.mark_with(marks))
    }

    fn eval_template(&mut self, span: &Span, parts: &[TemplatePart]) -> EvalResult {
        // A lone interpolation yields the value itself, e.g. "${var.list}".
        if let [TemplatePart::Interp(e)] = parts {
            return Ok(self.eval(e));
        }

        let mut out = String::new();
        let mut marks = Marks::new();
        let mut known = true;
        for part in parts {
            let e = match part {
                TemplatePart::Literal(s) => {
                    out.push_str(s);
                    continue;
                }
                TemplatePart::Interp(e) => e,
            };
            let (v, m) = self.eval(e).unmark_deep();
            marks.extend(m);
            if v.is_null() {
                return Err(EvalError::new(
                    e.span(),
                    "Invalid template interpolation value",
                    "The expression result is null. Cannot include a null value in a string template.",
                ));
            }
            if !v.is_known() {
                known = false;
                continue;
            }
            match convert(&v, &Type::String) {
                Ok(s) => out.push_str(s.as_str().unwrap_or_default()),
                Err(err) => {
                    return Err(EvalError::new(
                        span,
                        "Invalid template interpolation value",
                        format!("Cannot include the given value in a string template: {err}."),
                    ))
                }
            }
        }

        let out = match known {
            true => Value::from(out),
            false => Value::Unknown(Type::String),
        };
        Ok(out.mark_with(marks))
    }

    fn eval_object(&mut self, items: &[(ObjectKey, ExprRef)]) -> EvalResult {
        let mut attrs = BTreeMap::new();
        let mut marks = Marks::new();
        let mut known = true;
        for (key, value) in items {
            let key = match key {
                ObjectKey::Name(_, name) => name.clone(),
                ObjectKey::Expr(e) => {
                    let (k, m) = self.eval(e).unmark_deep();
                    marks.extend(m);
                    if k.is_null() {
                        return Err(EvalError::new(
                            e.span(),
                            "Null value as key",
                            "Can't use a null value as a key.",
                        ));
                    }
                    if !k.is_known() {
                        known = false;
                        continue;
                    }
                    match convert(&k, &Type::String) {
                        Ok(k) => k.as_str().unwrap_or_default().to_string(),
                        Err(err) => {
                            return Err(EvalError::new(
                                e.span(),
                                "Incorrect key type",
                                format!("Can't use this value as a key: {err}."),
                            ))
                        }
                    }
                }
            };
            let v = self.eval(value);
            attrs.insert(key, v);
        }

        let out = match known {
            true => Value::object(attrs),
            false => DYNAMIC,
        };
        Ok(out.mark_with(marks))
    }

    fn eval_call(
        &mut self,
        span: &Span,
        name: &str,
        args: &[ExprRef],
        expand_final: bool,
    ) -> EvalResult {
        let mut values: Vec<Value> = args.iter().map(|a| self.eval(a)).collect();

        if expand_final {
            if let (Some(last), Some(last_expr)) = (values.pop(), args.last()) {
                let (last, marks) = last.unmark();
                match &last {
                    Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => {
                        values.extend(items.iter().map(|v| v.clone().mark_with(marks.clone())))
                    }
                    Value::Unknown(_) => return Ok(DYNAMIC.mark_with(marks)),
                    Value::Null(_) => {
                        return Err(EvalError::new(
                            last_expr.span(),
                            "Invalid expanding argument value",
                            "The expanding argument (indicated by ...) must not be null.",
                        ))
                    }
                    _ => {
                        return Err(EvalError::new(
                            last_expr.span(),
                            "Invalid expanding argument value",
                            "The expanding argument (indicated by ...) must be of a tuple, list, or set type.",
                        ))
                    }
                }
            }
        }

        match functions::call(name, &values, self.ctx.pure_only) {
            None => Err(EvalError::new(
                span,
                "Call to unknown function",
                format!("There is no function named {name:?}."),
            )),
            Some(Ok(v)) => Ok(v),
            Some(Err(e)) => Err(EvalError::new(
                span,
                "Error in function call",
                format!("Call to function {name:?} failed: {e}."),
            )),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        l: &Value,
        r: &Value,
        lspan: &Span,
        rspan: &Span,
        span: &Span,
    ) -> EvalResult {
        use BinaryOp::*;
        match op {
            Eq | Ne => Ok(match values_equal(l, r) {
                Some(eq) => Value::Bool(eq == (op == Eq)),
                None => Value::Unknown(Type::Bool),
            }),
            And | Or => {
                let l = operand(l, &Type::Bool, lspan, "left")?;
                let r = operand(r, &Type::Bool, rspan, "right")?;
                Ok(match (op, l.as_bool(), r.as_bool()) {
                    (And, Some(false), _) | (And, _, Some(false)) => Value::Bool(false),
                    (Or, Some(true), _) | (Or, _, Some(true)) => Value::Bool(true),
                    (_, Some(a), Some(b)) => Value::Bool(if op == And { a && b } else { a || b }),
                    _ => Value::Unknown(Type::Bool),
                })
            }
            _ => {
                let l = operand(l, &Type::Number, lspan, "left")?;
                let r = operand(r, &Type::Number, rspan, "right")?;
                let comparison = matches!(op, Lt | Le | Gt | Ge);
                let (a, b) = match (l.as_number(), r.as_number()) {
                    (Some(a), Some(b)) => (*a, *b),
                    _ => {
                        return Ok(Value::Unknown(match comparison {
                            true => Type::Bool,
                            false => Type::Number,
                        }))
                    }
                };
                let failed = |e: anyhow::Error| {
                    EvalError::new(span, "Operation failed", format!("Error during operation: {e}."))
                };
                Ok(match op {
                    Add => a.add(&b).into(),
                    Sub => a.sub(&b).into(),
                    Mul => a.mul(&b).into(),
                    Div => a.divide(&b).map_err(failed)?.into(),
                    Mod => a.modulo(&b).map_err(failed)?.into(),
                    Lt => (a < b).into(),
                    Le => (a <= b).into(),
                    Gt => (a > b).into(),
                    _ => (a >= b).into(),
                })
            }
        }
    }

    fn eval_conditional(
        &mut self,
        span: &Span,
        cond: &Expr,
        true_expr: &Expr,
        false_expr: &Expr,
    ) -> EvalResult {
        let (c, marks) = self.eval(cond).unmark_deep();
        let (t, true_diags) = self.eval_captured(true_expr);
        let (f, false_diags) = self.eval_captured(false_expr);

        if c.is_null() {
            return Err(EvalError::new(
                cond.span(),
                "Null condition",
                "The condition value is null. Conditions must either be true or false.",
            ));
        }
        let c = convert(&c, &Type::Bool).map_err(|_| {
            EvalError::new(
                cond.span(),
                "Incorrect condition type",
                "The condition expression must be of type bool.",
            )
        })?;

        let ty = match unify(&[t.ty(), f.ty()]) {
            Some(ty) => ty,
            None => {
                self.diags.extend(true_diags);
                self.diags.extend(false_diags);
                return Err(EvalError::new(
                    span,
                    "Inconsistent conditional result types",
                    format!(
                        "The true and false result expressions must have consistent types. The 'true' value is {}, but the 'false' value is {}.",
                        t.ty(),
                        f.ty()
                    ),
                ));
            }
        };

        let out = match c.as_bool() {
            None => {
                self.diags.extend(true_diags);
                self.diags.extend(false_diags);
                Value::Unknown(ty)
            }
            Some(true) => {
                self.diags.extend(true_diags);
                convert(&t, &ty).unwrap_or(t)
            }
            Some(false) => {
                self.diags.extend(false_diags);
                convert(&f, &ty).unwrap_or(f)
            }
        };
        Ok(out.mark_with(marks))
    }

    fn eval_for_item(
        &mut self,
        key_expr: &Option<ExprRef>,
        value_expr: &Expr,
        cond: &Option<ExprRef>,
        marks: &mut Marks,
    ) -> core::result::Result<ForItem, EvalError> {
        if let Some(cond) = cond {
            let (c, m) = self.eval(cond).unmark_deep();
            marks.extend(m);
            if c.is_null() {
                return Err(EvalError::new(
                    cond.span(),
                    "Condition is null",
                    "The value of the 'if' clause must not be null.",
                ));
            }
            match convert(&c, &Type::Bool).map(|c| c.as_bool()) {
                Ok(Some(true)) => (),
                Ok(Some(false)) => return Ok(ForItem::Skip),
                Ok(None) => return Ok(ForItem::Unknown),
                Err(e) => {
                    return Err(EvalError::new(
                        cond.span(),
                        "Invalid 'for' condition",
                        format!("The 'if' clause value is invalid: {e}."),
                    ))
                }
            }
        }

        let key = match key_expr {
            Some(key_expr) => {
                let (k, m) = self.eval(key_expr).unmark_deep();
                marks.extend(m);
                if k.is_null() {
                    return Err(EvalError::new(
                        key_expr.span(),
                        "Invalid object key",
                        "Key expression in 'for' expression must not produce a null value.",
                    ));
                }
                if !k.is_known() {
                    return Ok(ForItem::Unknown);
                }
                match convert(&k, &Type::String) {
                    Ok(k) => Some(k.as_str().unwrap_or_default().to_string()),
                    Err(e) => {
                        return Err(EvalError::new(
                            key_expr.span(),
                            "Invalid object key",
                            format!("The key expression produced an invalid result: {e}."),
                        ))
                    }
                }
            }
            None => None,
        };

        Ok(ForItem::Item(key, self.eval(value_expr)))
    }
}
