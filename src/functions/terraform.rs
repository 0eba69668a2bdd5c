// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Functions in the `provider::terraform::` namespace.

use crate::functions::utils::*;
use crate::functions::Function;
use crate::interpreter::eval_constant;
use crate::lexer::Source;
use crate::parser::parse_file;
use crate::types::Type;
use crate::value::{is_valid_identifier, Value};

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, bail, Result};

pub fn register(m: &mut HashMap<&'static str, Function>) {
    m.insert(
        "provider::terraform::decode_tfvars",
        Function::fixed(decode_tfvars, 1, Type::Dynamic),
    );
    m.insert(
        "provider::terraform::encode_expr",
        Function::fixed(encode_expr, 1, Type::String),
    );
    m.insert(
        "provider::terraform::encode_tfvars",
        Function::fixed(encode_tfvars, 1, Type::String),
    );
}

fn encode_tfvars(args: &[Value]) -> Result<Value> {
    let v = &args[0];
    if v.is_null() {
        bail!("cannot encode null value as tfvars");
    }
    let entries = match v {
        Value::Map(_, entries) | Value::Object(entries) => entries,
        _ => bail!("expected an object or map for tfvars encoding"),
    };

    let mut out = String::new();
    for (name, value) in entries.iter() {
        if !is_valid_identifier(name) {
            bail!("invalid variable name {name:?}: must be a valid identifier");
        }
        out.push_str(name);
        out.push_str(" = ");
        out.push_str(&value.to_hcl()?);
        out.push('\n');
    }
    Ok(Value::from(out))
}

fn decode_tfvars(args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        bail!("cannot decode tfvars from a null value");
    }
    let contents = ensure_string(&args[0])?;
    let source = Source::from_contents("<tfvars>".to_string(), contents)?;
    let file = parse_file(&source).map_err(|e| anyhow!("invalid tfvars syntax: {e}"))?;
    if let Some(block) = file.body.blocks.first() {
        bail!(
            "invalid tfvars content: unexpected {:?} block; only attribute definitions are allowed",
            block.type_name
        );
    }

    let mut attrs = BTreeMap::new();
    for (name, attr) in &file.body.attributes {
        let (value, diags) = eval_constant(&attr.expr);
        if let Some(d) = diags.errors().next() {
            bail!("invalid expression for variable {name:?}: {}: {}", d.summary, d.detail);
        }
        attrs.insert(name.clone(), value);
    }
    Ok(Value::object(attrs))
}

fn encode_expr(args: &[Value]) -> Result<Value> {
    Ok(Value::from(args[0].to_hcl()?))
}
