// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::convert::{convert, unify};
use crate::number::Number;
use crate::types::Type;
use crate::value::Value;

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};

pub fn ensure_not_null(v: &Value) -> Result<()> {
    if v.is_null() {
        bail!("argument must not be null");
    }
    Ok(())
}

pub fn ensure_string(v: &Value) -> Result<String> {
    ensure_not_null(v)?;
    let s = convert(v, &Type::String).map_err(|e| anyhow!("{e}"))?;
    match s.as_str() {
        Some(s) => Ok(s.to_string()),
        None => bail!("string required"),
    }
}

pub fn ensure_number(v: &Value) -> Result<Number> {
    ensure_not_null(v)?;
    let n = convert(v, &Type::Number).map_err(|e| anyhow!("{e}"))?;
    match n.as_number() {
        Some(n) => Ok(*n),
        None => bail!("number required"),
    }
}

pub fn ensure_integer(v: &Value) -> Result<i64> {
    match ensure_number(v)?.as_i64() {
        Some(i) => Ok(i),
        None => bail!("value must be a whole number"),
    }
}

pub fn ensure_bool(v: &Value) -> Result<bool> {
    ensure_not_null(v)?;
    let b = convert(v, &Type::Bool).map_err(|e| anyhow!("{e}"))?;
    match b.as_bool() {
        Some(b) => Ok(b),
        None => bail!("bool required"),
    }
}

pub fn ensure_sequence(v: &Value) -> Result<&[Value]> {
    ensure_not_null(v)?;
    match v {
        Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => Ok(items.as_slice()),
        _ => bail!("list, set or tuple required, got {}", v.ty()),
    }
}

pub fn ensure_mapping(v: &Value) -> Result<&BTreeMap<String, Value>> {
    ensure_not_null(v)?;
    match v {
        Value::Map(_, entries) | Value::Object(entries) => Ok(entries.as_ref()),
        _ => bail!("map or object required, got {}", v.ty()),
    }
}

/// A list of `items` if they share a type, otherwise a tuple.
pub fn make_list(items: Vec<Value>) -> Value {
    let types: Vec<Type> = items.iter().map(Value::ty).collect();
    match unify(&types) {
        Some(ty) if !items.is_empty() => {
            let converted: Option<Vec<Value>> =
                items.iter().map(|v| convert(v, &ty).ok()).collect();
            match converted {
                Some(converted) => Value::list(ty, converted),
                None => Value::tuple(items),
            }
        }
        _ => Value::tuple(items),
    }
}

pub fn string_list(items: Vec<String>) -> Value {
    Value::list(Type::String, items.into_iter().map(Value::from).collect())
}
