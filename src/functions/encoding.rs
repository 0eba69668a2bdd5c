// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::functions::utils::*;
use crate::functions::Function;
use crate::types::Type;
use crate::value::Value;

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use data_encoding::BASE64;

pub fn register(m: &mut HashMap<&'static str, Function>) {
    m.insert("base64decode", Function::fixed(base64decode, 1, Type::String));
    m.insert("base64encode", Function::fixed(base64encode, 1, Type::String));
    m.insert("jsondecode", Function::fixed(jsondecode, 1, Type::Dynamic));
    m.insert("jsonencode", Function::fixed(jsonencode, 1, Type::String));
    m.insert("yamldecode", Function::fixed(yamldecode, 1, Type::Dynamic));
    m.insert("yamlencode", Function::fixed(yamlencode, 1, Type::String));
}

fn base64encode(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    Ok(Value::from(BASE64.encode(s.as_bytes())))
}

fn base64decode(args: &[Value]) -> Result<Value> {
    let encoded = ensure_string(&args[0])?;
    let decoded = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| anyhow!("failed to decode base64 data {encoded:?}: {e}"))?;
    match String::from_utf8(decoded) {
        Ok(s) => Ok(Value::from(s)),
        Err(_) => Err(anyhow!(
            "the result of decoding the provided string is not valid UTF-8"
        )),
    }
}

fn jsonencode(args: &[Value]) -> Result<Value> {
    let json = args[0].to_json()?;
    Ok(Value::from(serde_json::to_string(&json)?))
}

fn jsondecode(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    Value::from_json_str(&s).map_err(|e| anyhow!("invalid JSON: {e}"))
}

fn yamlencode(args: &[Value]) -> Result<Value> {
    let json = args[0].to_json()?;
    Ok(Value::from(serde_yaml::to_string(&json)?))
}

fn yamldecode(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    let json: serde_json::Value =
        serde_yaml::from_str(&s).map_err(|e| anyhow!("invalid YAML: {e}"))?;
    Ok(Value::from_json(&json))
}
