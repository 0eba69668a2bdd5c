// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::functions::Function;
use crate::types::Type;
use crate::value::{Mark, Value};

use std::collections::HashMap;

use anyhow::{bail, Result};

// These functions see their arguments with marks and unknowns intact.
pub fn register(m: &mut HashMap<&'static str, Function>) {
    m.insert(
        "issensitive",
        Function::fixed(issensitive, 1, Type::Bool)
            .allow_marked()
            .allow_unknown(),
    );
    m.insert(
        "nonsensitive",
        Function::fixed(nonsensitive, 1, Type::Dynamic)
            .allow_marked()
            .allow_unknown(),
    );
    m.insert(
        "sensitive",
        Function::fixed(sensitive, 1, Type::Dynamic)
            .allow_marked()
            .allow_unknown(),
    );
}

fn sensitive(args: &[Value]) -> Result<Value> {
    Ok(args[0].clone().mark(Mark::Sensitive))
}

fn nonsensitive(args: &[Value]) -> Result<Value> {
    let v = &args[0];
    if v.is_known() && !v.has_mark(Mark::Sensitive) {
        bail!("the given value is not sensitive, so this call is redundant");
    }
    let (inner, mut marks) = v.clone().unmark();
    marks.remove(&Mark::Sensitive);
    Ok(inner.mark_with(marks))
}

fn issensitive(args: &[Value]) -> Result<Value> {
    let v = &args[0];
    if v.has_mark(Mark::Sensitive) {
        return Ok(Value::Bool(true));
    }
    match v.is_known() {
        true => Ok(Value::Bool(false)),
        false => Ok(Value::Unknown(Type::Bool)),
    }
}
