// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::number::Number;
use crate::types::Type;
use crate::*;

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};

/// Taint flags carried by values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mark {
    // The value must not be displayed or logged in the clear.
    Sensitive,
}

pub type Marks = BTreeSet<Mark>;

/// A configuration value.
///
/// Values are typed: a null or an unknown value still knows the type it
/// stands for. `Marked` wraps a value with one or more [`Mark`]s; marks are
/// never nested directly inside each other.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null(Type),
    // Statically unknown value of the given type.
    Unknown(Type),
    Bool(bool),
    Number(Number),
    String(Rc<str>),
    List(Type, Rc<Vec<Value>>),
    Set(Type, Rc<Vec<Value>>),
    Map(Type, Rc<BTreeMap<String, Value>>),
    Tuple(Rc<Vec<Value>>),
    Object(Rc<BTreeMap<String, Value>>),
    Marked(Rc<Value>, Marks),
}

/// Unknown value of unknown type.
pub const DYNAMIC: Value = Value::Unknown(Type::Dynamic);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl Value {
    pub fn null() -> Value {
        Value::Null(Type::Dynamic)
    }

    pub fn unknown(ty: Type) -> Value {
        Value::Unknown(ty)
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn object(attrs: BTreeMap<String, Value>) -> Value {
        Value::Object(Rc::new(attrs))
    }

    pub fn empty_object() -> Value {
        Value::object(BTreeMap::new())
    }

    pub fn list(elem: Type, items: Vec<Value>) -> Value {
        Value::List(elem, Rc::new(items))
    }

    pub fn map(elem: Type, entries: BTreeMap<String, Value>) -> Value {
        Value::Map(elem, Rc::new(entries))
    }

    /// Set of `items`. Duplicates are dropped, first occurrence wins.
    pub fn set(elem: Type, items: Vec<Value>) -> Value {
        let mut unique: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Value::Set(elem, Rc::new(unique))
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Null(t) | Value::Unknown(t) => t.clone(),
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::List(e, _) => Type::list(e.clone()),
            Value::Set(e, _) => Type::set(e.clone()),
            Value::Map(e, _) => Type::map(e.clone()),
            Value::Tuple(items) => Type::Tuple(items.iter().map(Value::ty).collect()),
            Value::Object(attrs) => {
                Type::object(attrs.iter().map(|(k, v)| (k.clone(), v.ty())).collect())
            }
            Value::Marked(v, _) => v.ty(),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null(_) => true,
            Value::Marked(v, _) => v.is_null(),
            _ => false,
        }
    }

    pub fn is_known(&self) -> bool {
        match self {
            Value::Unknown(_) => false,
            Value::Marked(v, _) => v.is_known(),
            _ => true,
        }
    }

    /// True if neither the value nor anything nested in it is unknown.
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Value::Unknown(_) => false,
            Value::Marked(v, _) => v.is_wholly_known(),
            Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => {
                items.iter().all(Value::is_wholly_known)
            }
            Value::Map(_, entries) | Value::Object(entries) => {
                entries.values().all(Value::is_wholly_known)
            }
            _ => true,
        }
    }

    pub fn mark(self, mark: Mark) -> Value {
        self.mark_with(Marks::from([mark]))
    }

    /// Adds `marks` to the value. Existing marks are kept.
    pub fn mark_with(self, marks: Marks) -> Value {
        if marks.is_empty() {
            return self;
        }
        match self {
            Value::Marked(v, mut existing) => {
                existing.extend(marks);
                Value::Marked(v, existing)
            }
            v => Value::Marked(Rc::new(v), marks),
        }
    }

    /// Removes the marks directly on this value.
    pub fn unmark(self) -> (Value, Marks) {
        match self {
            Value::Marked(v, marks) => (v.as_ref().clone(), marks),
            v => (v, Marks::new()),
        }
    }

    /// Removes all marks from the value and the values nested in it,
    /// returning the union of the removed marks.
    pub fn unmark_deep(&self) -> (Value, Marks) {
        let mut marks = Marks::new();
        let v = self.unmark_deep_into(&mut marks);
        (v, marks)
    }

    fn unmark_deep_into(&self, marks: &mut Marks) -> Value {
        match self {
            Value::Marked(v, m) => {
                marks.extend(m.iter().copied());
                v.unmark_deep_into(marks)
            }
            Value::List(e, items) => Value::list(
                e.clone(),
                items.iter().map(|v| v.unmark_deep_into(marks)).collect(),
            ),
            Value::Set(e, items) => Value::set(
                e.clone(),
                items.iter().map(|v| v.unmark_deep_into(marks)).collect(),
            ),
            Value::Tuple(items) => {
                Value::tuple(items.iter().map(|v| v.unmark_deep_into(marks)).collect())
            }
            Value::Map(e, entries) => Value::map(
                e.clone(),
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.unmark_deep_into(marks)))
                    .collect(),
            ),
            Value::Object(attrs) => Value::object(
                attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.unmark_deep_into(marks)))
                    .collect(),
            ),
            v => v.clone(),
        }
    }

    /// Marks directly on this value.
    pub fn marks(&self) -> Marks {
        match self {
            Value::Marked(_, marks) => marks.clone(),
            _ => Marks::new(),
        }
    }

    pub fn has_mark(&self, mark: Mark) -> bool {
        matches!(self, Value::Marked(_, marks) if marks.contains(&mark))
    }

    /// True if the value or anything nested in it carries `mark`.
    pub fn contains_mark(&self, mark: Mark) -> bool {
        self.unmark_deep().1.contains(&mark)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Key/value pairs of a known, unmarked collection or structural value.
    /// Sequences are keyed by index, maps and objects by attribute name.
    pub fn elements(&self) -> Option<Vec<(Value, Value)>> {
        match self {
            Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => Some(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| (Value::from(idx), v.clone()))
                    .collect(),
            ),
            Value::Map(_, entries) | Value::Object(entries) => Some(
                entries
                    .iter()
                    .map(|(k, v)| (Value::from(k.as_str()), v.clone()))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::List(..) | Value::Set(..) | Value::Tuple(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Value::Map(..) | Value::Object(_))
    }

    /// Renders the value as a configuration language expression.
    pub fn to_hcl(&self) -> Result<String> {
        let mut out = String::new();
        self.write_hcl(&mut out)?;
        Ok(out)
    }

    fn write_hcl(&self, out: &mut String) -> Result<()> {
        match self {
            Value::Null(_) => out.push_str("null"),
            Value::Unknown(_) => bail!("cannot render an unknown value"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(&n.to_string()),
            Value::String(s) => out.push_str(&quote_string(s)),
            Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => {
                out.push('[');
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    item.write_hcl(out)?;
                }
                out.push(']');
            }
            Value::Map(_, entries) | Value::Object(entries) => {
                if entries.is_empty() {
                    out.push_str("{}");
                    return Ok(());
                }
                out.push_str("{\n");
                for (k, v) in entries.iter() {
                    if is_valid_identifier(k) {
                        out.push_str(k);
                    } else {
                        out.push_str(&quote_string(k));
                    }
                    out.push_str(" = ");
                    v.write_hcl(out)?;
                    out.push('\n');
                }
                out.push('}');
            }
            Value::Marked(v, _) => v.write_hcl(out)?,
        }
        Ok(())
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::null(),
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::from(i),
                None => Value::from(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::tuple(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Value> {
        let json: serde_json::Value = serde_json::from_str(json)?;
        Ok(Value::from_json(&json))
    }

    /// JSON form of a wholly known value. Marks are ignored.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null(_) => serde_json::Value::Null,
            Value::Unknown(_) => bail!("value is not known"),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::to_value(n)?,
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect::<Result<_>>()?)
            }
            Value::Map(_, entries) | Value::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_>>()?,
            ),
            Value::Marked(v, _) => v.to_json()?,
        })
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Marked(_, marks) if marks.contains(&Mark::Sensitive) => {
                f.write_str("(sensitive value)")
            }
            v if !v.is_wholly_known() => f.write_str("(known after apply)"),
            v => match v.to_hcl() {
                Ok(s) => f.write_str(&s),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => (),
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
