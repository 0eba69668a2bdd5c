// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Conversion of values to a type constraint.
//!
//! Conversions follow the configuration language rules: primitive types
//! convert to each other when the value permits it (`"12"` is a valid
//! number), sequences convert to lists, sets and tuples, and maps and objects
//! convert to each other. Null and unknown values convert to a null or
//! unknown value of the wanted type. Marks are preserved at every level.

use crate::number::Number;
use crate::types::Type;
use crate::value::Value;

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.render())]
pub struct ConversionError {
    // Outermost step first, e.g. `attribute "tags"`, `element 0`.
    pub path: Vec<String>,
    pub message: String,
}

impl ConversionError {
    fn new(message: impl Into<String>) -> ConversionError {
        ConversionError {
            path: vec![],
            message: message.into(),
        }
    }

    fn within(mut self, step: String) -> ConversionError {
        self.path.insert(0, step);
        self
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.path {
            out.push_str(step);
            out.push_str(": ");
        }
        out.push_str(&self.message);
        out
    }
}

pub fn convert(val: &Value, want: &Type) -> Result<Value, ConversionError> {
    let (inner, marks) = val.clone().unmark();
    Ok(convert_unmarked(&inner, want)?.mark_with(marks))
}

fn convert_unmarked(val: &Value, want: &Type) -> Result<Value, ConversionError> {
    if *want == Type::Dynamic {
        return Ok(val.clone());
    }

    match val {
        Value::Null(_) => return Ok(Value::Null(want.clone())),
        Value::Unknown(ty) => {
            return match conversion_possible(ty, want) {
                true => Ok(Value::Unknown(want.clone())),
                false => Err(ConversionError::new(format!("{want} required"))),
            }
        }
        _ => (),
    }

    match want {
        Type::Bool => match val {
            Value::Bool(_) => Ok(val.clone()),
            Value::String(s) => match s.as_ref() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(ConversionError::new("a bool is required")),
            },
            _ => Err(ConversionError::new("bool required")),
        },
        Type::Number => match val {
            Value::Number(_) => Ok(val.clone()),
            Value::String(s) => match s.parse::<Number>() {
                Ok(n) => Ok(Value::Number(n)),
                Err(e) => Err(ConversionError::new(e.to_string())),
            },
            _ => Err(ConversionError::new("number required")),
        },
        Type::String => match val {
            Value::String(_) => Ok(val.clone()),
            Value::Number(n) => Ok(Value::from(n.to_string())),
            Value::Bool(b) => Ok(Value::from(if *b { "true" } else { "false" })),
            _ => Err(ConversionError::new("string required")),
        },
        Type::List(elem) | Type::Set(elem) => {
            let items = match val {
                Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => items,
                _ => return Err(ConversionError::new(format!("{want} required"))),
            };
            let elem = match elem.has_dynamic() {
                true => {
                    let types: Vec<Type> = items.iter().map(Value::ty).collect();
                    match unify(&types) {
                        Some(t) => t,
                        None => {
                            return Err(ConversionError::new(
                                "all elements must have the same type",
                            ))
                        }
                    }
                }
                false => elem.as_ref().clone(),
            };
            let mut converted = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                converted.push(convert(item, &elem).map_err(|e| e.within(format!("element {idx}")))?);
            }
            Ok(match want {
                Type::Set(_) => Value::set(elem, converted),
                _ => Value::list(elem, converted),
            })
        }
        Type::Map(elem) => {
            let entries = match val {
                Value::Map(_, entries) | Value::Object(entries) => entries,
                _ => return Err(ConversionError::new(format!("{want} required"))),
            };
            let elem = match elem.has_dynamic() {
                true => {
                    let types: Vec<Type> = entries.values().map(Value::ty).collect();
                    match unify(&types) {
                        Some(t) => t,
                        None => {
                            return Err(ConversionError::new(
                                "all map elements must have the same type",
                            ))
                        }
                    }
                }
                false => elem.as_ref().clone(),
            };
            let mut converted = BTreeMap::new();
            for (k, v) in entries.iter() {
                let v = convert(v, &elem).map_err(|e| e.within(format!("element {k:?}")))?;
                converted.insert(k.clone(), v);
            }
            Ok(Value::map(elem, converted))
        }
        Type::Tuple(types) => {
            let items = match val {
                Value::List(_, items) | Value::Tuple(items) => items,
                _ => return Err(ConversionError::new("tuple required")),
            };
            if items.len() != types.len() {
                return Err(ConversionError::new(format!(
                    "tuple required with exactly {} elements",
                    types.len()
                )));
            }
            let mut converted = Vec::with_capacity(items.len());
            for (idx, (item, ty)) in items.iter().zip(types.iter()).enumerate() {
                converted.push(convert(item, ty).map_err(|e| e.within(format!("element {idx}")))?);
            }
            Ok(Value::tuple(converted))
        }
        Type::Object(attrs, optional) => {
            let entries = match val {
                Value::Map(_, entries) | Value::Object(entries) => entries,
                _ => return Err(ConversionError::new("object required")),
            };
            let mut converted = BTreeMap::new();
            for (name, ty) in attrs {
                match entries.get(name) {
                    Some(v) => {
                        let v = convert(v, ty)
                            .map_err(|e| e.within(format!("attribute {name:?}")))?;
                        converted.insert(name.clone(), v);
                    }
                    None if optional.contains(name) => {
                        converted.insert(name.clone(), Value::Null(ty.clone()));
                    }
                    None => {
                        return Err(ConversionError::new(format!(
                            "attribute {name:?} is required"
                        )))
                    }
                }
            }
            Ok(Value::object(converted))
        }
        // Handled above.
        Type::Dynamic => Ok(val.clone()),
    }
}

/// True if a value of type `from` could convert to `to`, ignoring the checks
/// that depend on the value itself.
pub fn conversion_possible(from: &Type, to: &Type) -> bool {
    match (from, to) {
        (Type::Dynamic, _) | (_, Type::Dynamic) => true,
        (f, t) if f.is_primitive() && t.is_primitive() => true,
        (
            Type::List(_) | Type::Set(_) | Type::Tuple(_),
            Type::List(_) | Type::Set(_) | Type::Tuple(_),
        ) => true,
        (Type::Map(_) | Type::Object(..), Type::Map(_) | Type::Object(..)) => true,
        _ => false,
    }
}

/// Finds a single type all of `types` can convert to.
pub fn unify(types: &[Type]) -> Option<Type> {
    let first = match types.first() {
        Some(t) => t,
        None => return Some(Type::Dynamic),
    };
    if types.iter().any(|t| *t == Type::Dynamic) {
        return Some(Type::Dynamic);
    }
    if types.iter().all(|t| t == first) {
        return Some(first.clone());
    }
    if types.iter().all(Type::is_primitive) {
        return Some(Type::String);
    }

    if types
        .iter()
        .all(|t| matches!(t, Type::List(_) | Type::Set(_) | Type::Tuple(_)))
    {
        let mut elems = vec![];
        for t in types {
            match t {
                Type::List(e) | Type::Set(e) => elems.push(e.as_ref().clone()),
                Type::Tuple(items) => elems.extend(items.iter().cloned()),
                _ => return None,
            }
        }
        return unify(&elems).map(Type::list);
    }

    if types.iter().all(|t| matches!(t, Type::Object(..))) {
        // Objects unify attribute-wise when they all have the same attributes.
        let names: Vec<&String> = match first {
            Type::Object(attrs, _) => attrs.keys().collect(),
            _ => return None,
        };
        let same_names = types.iter().all(|t| match t {
            Type::Object(attrs, _) => attrs.keys().collect::<Vec<_>>() == names,
            _ => false,
        });
        if same_names {
            let mut attrs = BTreeMap::new();
            for name in names {
                let attr_types: Vec<Type> = types
                    .iter()
                    .filter_map(|t| match t {
                        Type::Object(attrs, _) => attrs.get(name).cloned(),
                        _ => None,
                    })
                    .collect();
                attrs.insert(name.clone(), unify(&attr_types)?);
            }
            return Some(Type::object(attrs));
        }
    }

    if types
        .iter()
        .all(|t| matches!(t, Type::Map(_) | Type::Object(..)))
    {
        let mut elems = vec![];
        for t in types {
            match t {
                Type::Map(e) => elems.push(e.as_ref().clone()),
                Type::Object(attrs, _) => elems.extend(attrs.values().cloned()),
                _ => return None,
            }
        }
        return unify(&elems).map(Type::map);
    }

    None
}
