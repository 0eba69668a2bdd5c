// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::convert::{convert, unify};
use crate::functions::utils::*;
use crate::functions::Function;
use crate::interpreter::values_equal;
use crate::types::Type;
use crate::value::Value;

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, bail, Result};

const MAX_RANGE: usize = 1024;

pub fn register(m: &mut HashMap<&'static str, Function>) {
    m.insert("coalesce", Function::variadic(coalesce, 1, Type::Dynamic));
    m.insert("coalescelist", Function::variadic(coalescelist, 1, Type::Dynamic));
    m.insert("compact", Function::fixed(compact, 1, Type::list(Type::String)));
    m.insert("concat", Function::variadic(concat, 1, Type::Dynamic));
    m.insert("contains", Function::fixed(contains, 2, Type::Bool));
    m.insert("distinct", Function::fixed(distinct, 1, Type::Dynamic));
    m.insert("element", Function::fixed(element, 2, Type::Dynamic));
    m.insert("flatten", Function::fixed(flatten, 1, Type::Dynamic));
    m.insert("index", Function::fixed(index, 2, Type::Number));
    m.insert("keys", Function::fixed(keys, 1, Type::list(Type::String)));
    m.insert("length", Function::fixed(length, 1, Type::Number).allow_unknown());
    m.insert("lookup", Function::new(lookup, 2, Some(3), Type::Dynamic));
    m.insert("merge", Function::variadic(merge, 0, Type::Dynamic));
    m.insert("range", Function::new(range, 1, Some(3), Type::list(Type::Number)));
    m.insert("reverse", Function::fixed(reverse, 1, Type::Dynamic));
    m.insert("slice", Function::fixed(slice, 3, Type::Dynamic));
    m.insert("sort", Function::fixed(sort, 1, Type::list(Type::String)));
    m.insert("values", Function::fixed(values, 1, Type::Dynamic));
    m.insert("zipmap", Function::fixed(zipmap, 2, Type::Dynamic));
}

fn same(a: &Value, b: &Value) -> bool {
    values_equal(a, b) == Some(true)
}

// Rebuilds a sequence of the same kind as `like`.
fn sequence_like(like: &Value, items: Vec<Value>) -> Value {
    match like {
        Value::List(ty, _) | Value::Set(ty, _) => Value::list(ty.clone(), items),
        _ => Value::tuple(items),
    }
}

fn length(args: &[Value]) -> Result<Value> {
    let v = &args[0];
    ensure_not_null(v)?;
    if !v.is_known() {
        return Ok(Value::Unknown(Type::Number));
    }
    let n = match v {
        Value::String(s) => s.chars().count(),
        Value::List(_, items) | Value::Set(_, items) | Value::Tuple(items) => items.len(),
        Value::Map(_, entries) | Value::Object(entries) => entries.len(),
        _ => bail!("argument must be a string, a collection type, or a structural type"),
    };
    Ok(Value::from(n))
}

fn concat(args: &[Value]) -> Result<Value> {
    let mut items = vec![];
    for (idx, a) in args.iter().enumerate() {
        match ensure_sequence(a) {
            Ok(seq) => items.extend(seq.iter().cloned()),
            Err(_) => bail!("all arguments must be lists or tuples; got {} for argument {idx}", a.ty()),
        }
    }
    Ok(make_list(items))
}

fn contains(args: &[Value]) -> Result<Value> {
    let items = ensure_sequence(&args[0])?;
    Ok(Value::Bool(items.iter().any(|i| same(i, &args[1]))))
}

fn index(args: &[Value]) -> Result<Value> {
    let items = ensure_sequence(&args[0])?;
    match items.iter().position(|i| same(i, &args[1])) {
        Some(idx) => Ok(Value::from(idx)),
        None => bail!("item not found"),
    }
}

fn keys(args: &[Value]) -> Result<Value> {
    let entries = ensure_mapping(&args[0])?;
    Ok(string_list(entries.keys().cloned().collect()))
}

fn values(args: &[Value]) -> Result<Value> {
    let entries = ensure_mapping(&args[0])?;
    let items: Vec<Value> = entries.values().cloned().collect();
    Ok(match &args[0] {
        Value::Map(ty, _) => Value::list(ty.clone(), items),
        _ => Value::tuple(items),
    })
}

fn lookup(args: &[Value]) -> Result<Value> {
    let entries = ensure_mapping(&args[0])?;
    let key = ensure_string(&args[1])?;
    match (entries.get(&key), args.get(2)) {
        (Some(v), _) => Ok(v.clone()),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => bail!("lookup failed to find key {key:?}"),
    }
}

fn merge(args: &[Value]) -> Result<Value> {
    let mut merged = BTreeMap::new();
    let mut all_maps = true;
    for a in args {
        if a.is_null() {
            continue;
        }
        all_maps &= matches!(a, Value::Map(..));
        let entries = ensure_mapping(a)?;
        merged.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    if all_maps && !merged.is_empty() {
        let types: Vec<Type> = merged.values().map(Value::ty).collect();
        if let Some(ty) = unify(&types) {
            let converted: Option<BTreeMap<String, Value>> = merged
                .iter()
                .map(|(k, v)| convert(v, &ty).ok().map(|v| (k.clone(), v)))
                .collect();
            if let Some(converted) = converted {
                return Ok(Value::map(ty, converted));
            }
        }
    }
    Ok(Value::object(merged))
}

fn coalesce(args: &[Value]) -> Result<Value> {
    let types: Vec<Type> = args.iter().map(Value::ty).collect();
    let ty = unify(&types).ok_or_else(|| anyhow!("all arguments must have the same type"))?;
    for a in args {
        if a.is_null() {
            continue;
        }
        let v = convert(a, &ty).map_err(|e| anyhow!("{e}"))?;
        if v.as_str() == Some("") {
            continue;
        }
        return Ok(v);
    }
    bail!("no non-null, non-empty-string arguments")
}

fn coalescelist(args: &[Value]) -> Result<Value> {
    for a in args {
        if a.is_null() {
            continue;
        }
        if !ensure_sequence(a)?.is_empty() {
            return Ok(a.clone());
        }
    }
    bail!("no non-null arguments")
}

fn compact(args: &[Value]) -> Result<Value> {
    let mut out = vec![];
    for item in ensure_sequence(&args[0])? {
        if item.is_null() {
            continue;
        }
        let s = ensure_string(item)?;
        if !s.is_empty() {
            out.push(s);
        }
    }
    Ok(string_list(out))
}

fn distinct(args: &[Value]) -> Result<Value> {
    let mut out: Vec<Value> = vec![];
    for item in ensure_sequence(&args[0])? {
        if !out.iter().any(|o| same(o, item)) {
            out.push(item.clone());
        }
    }
    Ok(sequence_like(&args[0], out))
}

fn element(args: &[Value]) -> Result<Value> {
    let items = ensure_sequence(&args[0])?;
    let idx = ensure_integer(&args[1])?;
    if items.is_empty() {
        bail!("cannot use element function with an empty list");
    }
    if idx < 0 {
        bail!("cannot use element function with a negative index");
    }
    Ok(items[idx as usize % items.len()].clone())
}

fn flatten_into(items: &[Value], out: &mut Vec<Value>) -> Result<()> {
    for item in items {
        match item {
            Value::List(_, inner) | Value::Set(_, inner) | Value::Tuple(inner) => {
                flatten_into(inner, out)?
            }
            Value::Marked(..) => bail!("cannot flatten a list containing marked values"),
            v => out.push(v.clone()),
        }
    }
    Ok(())
}

fn flatten(args: &[Value]) -> Result<Value> {
    let mut out = vec![];
    flatten_into(ensure_sequence(&args[0])?, &mut out)?;
    Ok(make_list(out))
}

fn range(args: &[Value]) -> Result<Value> {
    let nums: Vec<f64> = args
        .iter()
        .map(|a| ensure_number(a).map(|n| n.as_f64()))
        .collect::<Result<_>>()?;
    let (start, limit, step) = match nums.as_slice() {
        [limit] => (0.0, *limit, 1.0),
        [start, limit] => (*start, *limit, if start <= limit { 1.0 } else { -1.0 }),
        [start, limit, step] => (*start, *limit, *step),
        _ => bail!("must have one, two, or three arguments"),
    };
    if step == 0.0 {
        bail!("step must not be zero");
    }
    if (step < 0.0 && start < limit) || (step > 0.0 && start > limit) {
        bail!("step must be in the direction of the limit");
    }

    let mut out = vec![];
    let mut n = start;
    while (step > 0.0 && n < limit) || (step < 0.0 && n > limit) {
        if out.len() >= MAX_RANGE {
            bail!(
                "more than {MAX_RANGE} values were generated; either decrease the difference between start and end or use a smaller step"
            );
        }
        out.push(match n.fract() == 0.0 {
            true => Value::from(n as i64),
            false => Value::from(n),
        });
        n += step;
    }
    Ok(Value::list(Type::Number, out))
}

fn reverse(args: &[Value]) -> Result<Value> {
    let mut items = ensure_sequence(&args[0])?.to_vec();
    items.reverse();
    Ok(sequence_like(&args[0], items))
}

fn slice(args: &[Value]) -> Result<Value> {
    let items = ensure_sequence(&args[0])?;
    let start = ensure_integer(&args[1])?;
    let end = ensure_integer(&args[2])?;
    if start < 0 {
        bail!("the start index must not be negative");
    }
    if end as usize > items.len() || end < 0 {
        bail!("the end index must not be greater than the length of the list");
    }
    if start > end {
        bail!("the start index must not be greater than the end index");
    }
    Ok(sequence_like(
        &args[0],
        items[start as usize..end as usize].to_vec(),
    ))
}

fn sort(args: &[Value]) -> Result<Value> {
    let mut out = vec![];
    for (idx, item) in ensure_sequence(&args[0])?.iter().enumerate() {
        if item.is_null() {
            bail!("given list element {idx} is null; a null string cannot be sorted");
        }
        out.push(ensure_string(item)?);
    }
    out.sort();
    Ok(string_list(out))
}

fn zipmap(args: &[Value]) -> Result<Value> {
    let keys = ensure_sequence(&args[0])?;
    let values = ensure_sequence(&args[1])?;
    if keys.len() != values.len() {
        bail!(
            "number of keys ({}) does not match number of values ({})",
            keys.len(),
            values.len()
        );
    }
    let mut entries = BTreeMap::new();
    for (k, v) in keys.iter().zip(values.iter()) {
        entries.insert(ensure_string(k)?, v.clone());
    }
    Ok(match &args[1] {
        Value::List(ty, _) | Value::Set(ty, _) => Value::map(ty.clone(), entries),
        _ => Value::object(entries),
    })
}
