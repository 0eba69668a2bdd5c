// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::convert::convert;
use crate::functions::Function;
use crate::types::Type;
use crate::value::Value;

use std::collections::HashMap;

use anyhow::{anyhow, Result};

pub fn register(m: &mut HashMap<&'static str, Function>) {
    m.insert("tobool", Function::fixed(tobool, 1, Type::Bool).allow_unknown());
    m.insert("tolist", Function::fixed(tolist, 1, Type::list(Type::Dynamic)).allow_unknown());
    m.insert("tomap", Function::fixed(tomap, 1, Type::map(Type::Dynamic)).allow_unknown());
    m.insert("tonumber", Function::fixed(tonumber, 1, Type::Number).allow_unknown());
    m.insert("toset", Function::fixed(toset, 1, Type::set(Type::Dynamic)).allow_unknown());
    m.insert("tostring", Function::fixed(tostring, 1, Type::String).allow_unknown());
}

fn to(v: &Value, ty: &Type) -> Result<Value> {
    convert(v, ty).map_err(|e| anyhow!("{e}"))
}

fn tobool(args: &[Value]) -> Result<Value> {
    to(&args[0], &Type::Bool)
}

fn tonumber(args: &[Value]) -> Result<Value> {
    to(&args[0], &Type::Number)
}

fn tostring(args: &[Value]) -> Result<Value> {
    to(&args[0], &Type::String)
}

fn tolist(args: &[Value]) -> Result<Value> {
    to(&args[0], &Type::list(Type::Dynamic))
}

fn toset(args: &[Value]) -> Result<Value> {
    to(&args[0], &Type::set(Type::Dynamic))
}

fn tomap(args: &[Value]) -> Result<Value> {
    to(&args[0], &Type::map(Type::Dynamic))
}
