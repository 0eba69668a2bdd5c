// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared helpers for building configurations and expressions in tests.

use crate::addrs::ModuleInstance;
use crate::ast::ExprRef;
use crate::config::{Config, Module};
use crate::evaluator::{ContextMeta, Evaluator, VariableValues};
use crate::lexer::Source;
use crate::parser::{parse_expression, parse_file};
use crate::value::Value;
use crate::Rc;

use std::collections::BTreeMap;

use anyhow::{bail, Result};

pub fn expr(text: &str) -> Result<ExprRef> {
    parse_expression(&Source::from_contents("<expr>".to_string(), text.to_string())?)
}

pub fn module(hcl: &str) -> Result<Module> {
    let file = parse_file(&Source::from_contents("main.tf".to_string(), hcl.to_string())?)?;
    let (module, diags) = Module::from_files(&[file], "/work/app");
    if diags.has_errors() {
        bail!("invalid configuration: {diags}");
    }
    Ok(module)
}

/// Evaluator for a root module declared by `hcl`, with `values` supplied for
/// its variables.
pub fn evaluator(hcl: &str, values: &[(&str, Value)]) -> Result<Evaluator> {
    evaluator_with_meta(hcl, values, ContextMeta::default())
}

pub fn evaluator_with_meta(
    hcl: &str,
    values: &[(&str, Value)],
    meta: ContextMeta,
) -> Result<Evaluator> {
    let values: BTreeMap<String, Value> = values
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Ok(Evaluator::new(
        Rc::new(Config::new(module(hcl)?)),
        ModuleInstance::root(),
        Rc::new(VariableValues::from([(String::new(), values)])),
        Rc::new(meta),
    ))
}
