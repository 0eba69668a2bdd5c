// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Type constraint expressions, e.g. `list(object({ name = string }))`.

use crate::ast::*;
use crate::convert::convert;
use crate::diagnostics::*;
use crate::interpreter::eval_constant;
use crate::types::Type;
use crate::value::Value;

use std::collections::{BTreeMap, BTreeSet};

/// Default values for the optional attributes of an object type, applied to
/// a value before it is converted to the type.
#[derive(Debug, Clone, PartialEq)]
pub struct Defaults {
    pub ty: Type,
    // Attribute name -> default value.
    pub defaults: BTreeMap<String, Value>,
    // Attribute name (objects), element index (tuples) or "" (collections)
    // -> nested defaults.
    pub children: BTreeMap<String, Defaults>,
}

impl Defaults {
    /// Fills in defaults for missing or null optional attributes, at any
    /// nesting depth. Null and unknown values are returned unchanged.
    pub fn apply(&self, val: Value) -> Value {
        let (inner, marks) = val.unmark();
        if inner.is_null() || !inner.is_known() {
            return inner.mark_with(marks);
        }

        let out = match (&self.ty, &inner) {
            (Type::Object(..), Value::Object(attrs) | Value::Map(_, attrs)) => {
                let mut attrs = attrs.as_ref().clone();
                for (name, default) in &self.defaults {
                    match attrs.get(name) {
                        Some(v) if !v.is_null() => (),
                        _ => {
                            attrs.insert(name.clone(), default.clone());
                        }
                    }
                }
                for (name, child) in &self.children {
                    if let Some(v) = attrs.remove(name) {
                        attrs.insert(name.clone(), child.apply(v));
                    }
                }
                Value::object(attrs)
            }
            (
                Type::List(_) | Type::Set(_),
                Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items),
            ) => match self.children.get("") {
                Some(child) => Value::tuple(items.iter().map(|v| child.apply(v.clone())).collect()),
                None => inner,
            },
            (Type::Map(_), Value::Map(_, entries) | Value::Object(entries)) => {
                match self.children.get("") {
                    Some(child) => Value::object(
                        entries
                            .iter()
                            .map(|(k, v)| (k.clone(), child.apply(v.clone())))
                            .collect(),
                    ),
                    None => inner,
                }
            }
            (Type::Tuple(_), Value::Tuple(items) | Value::List(_, items)) => Value::tuple(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| match self.children.get(&idx.to_string()) {
                        Some(child) => child.apply(v.clone()),
                        None => v.clone(),
                    })
                    .collect(),
            ),
            _ => inner,
        };
        out.mark_with(marks)
    }
}

fn invalid(expr: &Expr, detail: &str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::Decode,
        "Invalid type specification",
        detail,
        Some(expr.span().clone()),
    )
}

/// Parses a type constraint.
pub fn type_constraint(expr: &Expr) -> (Type, Diagnostics) {
    let (ty, _, diags) = type_constraint_with_defaults(expr);
    (ty, diags)
}

/// Parses a type constraint and the defaults of its optional attributes.
pub fn type_constraint_with_defaults(expr: &Expr) -> (Type, Option<Defaults>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let ty = parse(expr, &mut diags);
    let defaults = collect_defaults(expr, &ty, &mut diags);
    (ty, defaults, diags)
}

fn parse(expr: &Expr, diags: &mut Diagnostics) -> Type {
    if let Some(keyword) = expr.as_keyword() {
        return match keyword {
            "string" => Type::String,
            "number" => Type::Number,
            "bool" => Type::Bool,
            "any" => Type::Dynamic,
            "list" | "map" | "set" => {
                diags.push(invalid(
                    expr,
                    &format!(
                        "The {keyword} type constructor requires one argument specifying the element type."
                    ),
                ));
                Type::Dynamic
            }
            "object" => {
                diags.push(invalid(
                    expr,
                    "The object type constructor requires one argument specifying the attribute types as a map.",
                ));
                Type::Dynamic
            }
            "tuple" => {
                diags.push(invalid(
                    expr,
                    "The tuple type constructor requires one argument specifying the element types as a list.",
                ));
                Type::Dynamic
            }
            _ => {
                diags.push(invalid(
                    expr,
                    &format!("The keyword {keyword:?} is not a valid type specification."),
                ));
                Type::Dynamic
            }
        };
    }

    let (name, args) = match expr {
        Expr::FunctionCall { name, args, .. } => (name.as_str(), args),
        Expr::Parens { expr, .. } => return parse(expr, diags),
        _ => {
            diags.push(invalid(
                expr,
                "A type specification is either a primitive type keyword (bool, number, string) or a complex type constructor call, like list(string).",
            ));
            return Type::Dynamic;
        }
    };

    match name {
        "list" | "set" | "map" => {
            if args.len() != 1 {
                diags.push(invalid(
                    expr,
                    &format!("The {name} type constructor requires one argument specifying the element type."),
                ));
                return Type::Dynamic;
            }
            let elem = parse(&args[0], diags);
            match name {
                "list" => Type::list(elem),
                "set" => Type::set(elem),
                _ => Type::map(elem),
            }
        }
        "tuple" => match args.first().map(|a| a.as_ref()) {
            Some(Expr::Tuple { items, .. }) if args.len() == 1 => {
                Type::Tuple(items.iter().map(|i| parse(i, diags)).collect())
            }
            _ => {
                diags.push(invalid(
                    expr,
                    "The tuple type constructor requires one argument specifying the element types as a list.",
                ));
                Type::Dynamic
            }
        },
        "object" => match args.first().map(|a| a.as_ref()) {
            Some(Expr::Object { items, .. }) if args.len() == 1 => {
                let mut attrs = BTreeMap::new();
                let mut optional = BTreeSet::new();
                for (key, value) in items {
                    let attr_name = match object_key_name(key) {
                        Some(n) => n,
                        None => {
                            diags.push(invalid(
                                value,
                                "Object constructor map keys must be attribute names.",
                            ));
                            continue;
                        }
                    };
                    let attr_type = match value.as_ref() {
                        Expr::FunctionCall { name, args, .. } if name == "optional" => {
                            if args.is_empty() || args.len() > 2 {
                                diags.push(invalid(
                                    value,
                                    "Optional attribute modifier requires the attribute type as its first argument and an optional default value as its second.",
                                ));
                                continue;
                            }
                            optional.insert(attr_name.clone());
                            parse(&args[0], diags)
                        }
                        _ => parse(value, diags),
                    };
                    attrs.insert(attr_name, attr_type);
                }
                Type::Object(attrs, optional)
            }
            _ => {
                diags.push(invalid(
                    expr,
                    "The object type constructor requires one argument specifying the attribute types as a map.",
                ));
                Type::Dynamic
            }
        },
        "optional" => {
            diags.push(invalid(
                expr,
                "Keyword \"optional\" is valid only as a modifier for object type attributes.",
            ));
            Type::Dynamic
        }
        _ => {
            diags.push(invalid(
                expr,
                &format!("Keyword {name:?} is not a valid type constructor."),
            ));
            Type::Dynamic
        }
    }
}

fn object_key_name(key: &ObjectKey) -> Option<String> {
    match key {
        ObjectKey::Name(_, name) => Some(name.clone()),
        ObjectKey::Expr(expr) => match expr.as_ref() {
            Expr::Literal { value, .. } => value.as_str().map(str::to_string),
            Expr::Template { parts, .. } => match parts.as_slice() {
                [TemplatePart::Literal(s)] => Some(s.clone()),
                [] => Some(String::new()),
                _ => None,
            },
            e => e.as_keyword().map(str::to_string),
        },
    }
}

// Walks the constraint expression alongside its parsed type and collects
// `optional(type, default)` defaults.
fn collect_defaults(expr: &Expr, ty: &Type, diags: &mut Diagnostics) -> Option<Defaults> {
    let (name, args) = match expr {
        Expr::FunctionCall { name, args, .. } => (name.as_str(), args),
        Expr::Parens { expr, .. } => return collect_defaults(expr, ty, diags),
        _ => return None,
    };

    let mut defaults = Defaults {
        ty: ty.clone(),
        defaults: BTreeMap::new(),
        children: BTreeMap::new(),
    };

    match (name, ty) {
        ("list" | "set" | "map", Type::List(elem) | Type::Set(elem) | Type::Map(elem)) => {
            if let Some(child) = args.first().and_then(|a| collect_defaults(a, elem, diags)) {
                defaults.children.insert(String::new(), child);
            }
        }
        ("tuple", Type::Tuple(types)) => {
            if let Some(Expr::Tuple { items, .. }) = args.first().map(|a| a.as_ref()) {
                for (idx, (item, item_ty)) in items.iter().zip(types.iter()).enumerate() {
                    if let Some(child) = collect_defaults(item, item_ty, diags) {
                        defaults.children.insert(idx.to_string(), child);
                    }
                }
            }
        }
        ("object", Type::Object(attrs, _)) => {
            if let Some(Expr::Object { items, .. }) = args.first().map(|a| a.as_ref()) {
                for (key, value) in items {
                    let attr_name = match object_key_name(key) {
                        Some(n) => n,
                        None => continue,
                    };
                    let attr_ty = match attrs.get(&attr_name) {
                        Some(t) => t,
                        None => continue,
                    };
                    let type_expr = match value.as_ref() {
                        Expr::FunctionCall { name, args, .. } if name == "optional" => {
                            if let Some(default_expr) = args.get(1) {
                                let (default, default_diags) = eval_constant(default_expr);
                                diags.extend(default_diags);
                                match convert(&default, attr_ty) {
                                    Ok(v) => {
                                        defaults.defaults.insert(attr_name.clone(), v);
                                    }
                                    Err(e) => diags.push(Diagnostic::error(
                                        DiagnosticKind::Decode,
                                        "Invalid default value for optional attribute",
                                        &format!(
                                            "This default value is not compatible with the attribute's type constraint: {e}."
                                        ),
                                        Some(default_expr.span().clone()),
                                    )),
                                }
                            }
                            match args.first() {
                                Some(t) => t,
                                None => continue,
                            }
                        }
                        _ => value,
                    };
                    if let Some(child) = collect_defaults(type_expr, attr_ty, diags) {
                        defaults.children.insert(attr_name, child);
                    }
                }
            }
        }
        _ => return None,
    }

    match defaults.defaults.is_empty() && defaults.children.is_empty() {
        true => None,
        false => Some(defaults),
    }
}
