// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Functions whose result differs from call to call. In pure-only scopes
//! they evaluate to unknown strings.

use crate::functions::Function;
use crate::types::Type;
use crate::value::Value;

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

pub fn register(m: &mut HashMap<&'static str, Function>) {
    m.insert("timestamp", Function::fixed(timestamp, 0, Type::String).impure());
    m.insert("uuid", Function::fixed(uuid, 0, Type::String).impure());
}

fn timestamp(_args: &[Value]) -> Result<Value> {
    Ok(Value::from(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()))
}

fn uuid(_args: &[Value]) -> Result<Value> {
    Ok(Value::from(Uuid::new_v4().to_string()))
}
