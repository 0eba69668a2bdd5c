// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::functions::utils::*;
use crate::functions::Function;
use crate::number::Number;
use crate::types::Type;
use crate::value::Value;

use std::collections::HashMap;

use anyhow::{bail, Result};

pub fn register(m: &mut HashMap<&'static str, Function>) {
    m.insert("abs", Function::fixed(abs, 1, Type::Number));
    m.insert("ceil", Function::fixed(ceil, 1, Type::Number));
    m.insert("floor", Function::fixed(floor, 1, Type::Number));
    m.insert("max", Function::variadic(max, 1, Type::Number));
    m.insert("min", Function::variadic(min, 1, Type::Number));
    m.insert("parseint", Function::fixed(parseint, 2, Type::Number));
    m.insert("pow", Function::fixed(pow, 2, Type::Number));
    m.insert("signum", Function::fixed(signum, 1, Type::Number));
}

fn abs(args: &[Value]) -> Result<Value> {
    Ok(ensure_number(&args[0])?.abs().into())
}

fn ceil(args: &[Value]) -> Result<Value> {
    Ok(ensure_number(&args[0])?.ceil().into())
}

fn floor(args: &[Value]) -> Result<Value> {
    Ok(ensure_number(&args[0])?.floor().into())
}

fn fold(args: &[Value], keep_new: fn(&Number, &Number) -> bool) -> Result<Value> {
    let mut best = ensure_number(&args[0])?;
    for a in &args[1..] {
        let n = ensure_number(a)?;
        if keep_new(&n, &best) {
            best = n;
        }
    }
    Ok(best.into())
}

fn max(args: &[Value]) -> Result<Value> {
    fold(args, |n, best| n > best)
}

fn min(args: &[Value]) -> Result<Value> {
    fold(args, |n, best| n < best)
}

fn parseint(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    let base = ensure_integer(&args[1])?;
    if !(2..=36).contains(&base) {
        bail!("base must be a whole number between 2 and 36 inclusive");
    }
    match i64::from_str_radix(&s, base as u32) {
        Ok(i) => Ok(Value::from(i)),
        Err(_) => bail!("cannot parse {s:?} as a base {base} integer"),
    }
}

fn pow(args: &[Value]) -> Result<Value> {
    let base = ensure_number(&args[0])?.as_f64();
    let exp = ensure_number(&args[1])?.as_f64();
    Ok(Value::from(base.powf(exp)))
}

fn signum(args: &[Value]) -> Result<Value> {
    let n = ensure_number(&args[0])?.as_f64();
    let s = match n {
        n if n > 0.0 => 1,
        n if n < 0.0 => -1,
        _ => 0,
    };
    Ok(Value::from(s as i64))
}
