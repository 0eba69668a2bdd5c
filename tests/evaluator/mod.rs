// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::Deserialize;
use test_generator::test_resources;
use tfscope::unstable::*;
use tfscope::*;

#[cfg(feature = "arc")]
use std::sync::Arc as Rc;
#[cfg(not(feature = "arc"))]
use std::rc::Rc;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TestCase {
    note: String,
    // Configuration files of the root module, by file name.
    #[serde(default)]
    files: BTreeMap<String, String>,
    // Values supplied for the root module variables.
    #[serde(default)]
    variables: BTreeMap<String, Value>,
    #[serde(default)]
    workspace: Option<String>,
    expr: String,
    // Type constraint the result is converted to; `any` when omitted.
    want_type: Option<String>,
    want_result: Option<serde_json::Value>,
    want_unknown: Option<bool>,
    want_sensitive: Option<bool>,
    error: Option<String>,
    warning: Option<String>,
    skip: Option<bool>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlTest {
    cases: Vec<TestCase>,
}

// Numbers compare by value, so that `5` matches `5.0`.
fn match_json(actual: &serde_json::Value, expected: &serde_json::Value) -> Result<()> {
    use serde_json::Value as J;
    match (actual, expected) {
        (J::Number(a), J::Number(b)) if a.as_f64() == b.as_f64() => Ok(()),
        (J::Array(a), J::Array(b)) if a.len() == b.len() => {
            for (a, b) in a.iter().zip(b.iter()) {
                match_json(a, b)?;
            }
            Ok(())
        }
        (J::Object(a), J::Object(b)) if a.len() == b.len() => {
            for (k, b) in b {
                match a.get(k) {
                    Some(a) => match_json(a, b)?,
                    None => bail!("missing key {k:?} in {actual}"),
                }
            }
            Ok(())
        }
        (a, b) if a == b => Ok(()),
        _ => bail!("result mismatch\nactual:   {actual}\nexpected: {expected}"),
    }
}

fn evaluate(case: &TestCase) -> Result<(Value, Diagnostics)> {
    let mut files = vec![];
    for (name, contents) in &case.files {
        let source = Source::from_contents(name.clone(), contents.clone())?;
        files.push(parse_file(&source)?);
    }
    let (module, mut diags) = Module::from_files(&files, "/work/app");
    let config = Config::new(module);

    let values = VariableValues::from([(String::new(), case.variables.clone())]);
    let mut meta = ContextMeta::default();
    if let Some(workspace) = &case.workspace {
        meta.env = workspace.clone();
    }
    let mut runner = Runner::new(Rc::new(config), values, meta);

    let want = match &case.want_type {
        Some(ty) => {
            let source = Source::from_contents("<type>".to_string(), ty.clone())?;
            let (ty, d) = type_constraint(&*parse_expression(&source)?);
            if d.has_errors() {
                bail!("invalid want_type: {d}");
            }
            ty
        }
        None => Type::Dynamic,
    };

    let source = Source::from_contents("<expr>".to_string(), case.expr.clone())?;
    let expr = parse_expression(&source)?;
    let (value, d) = runner.evaluate_expr(&expr, &want)?;
    diags.extend(d);
    Ok((value, diags))
}

fn check(case: &TestCase) -> Result<()> {
    let (value, diags) = evaluate(case)?;

    match &case.error {
        Some(expected) => {
            let actual = diags.to_string();
            if !diags.has_errors() || !actual.contains(expected) {
                bail!("diagnostics\n`{actual}`\ndo not contain `{expected}`");
            }
        }
        None if diags.has_errors() => bail!("unexpected diagnostics: {diags}"),
        None => (),
    }
    if let Some(expected) = &case.warning {
        let found = diags
            .iter()
            .any(|d| d.severity == Severity::Warning && d.to_string().contains(expected));
        if !found {
            bail!("no warning containing `{expected}` in {diags}");
        }
    }

    if let Some(want) = case.want_unknown {
        if value.is_wholly_known() == want {
            bail!("expected wholly known = {}, got {value:?}", !want);
        }
    }
    if let Some(want) = case.want_sensitive {
        if value.contains_mark(Mark::Sensitive) != want {
            bail!("expected sensitive = {want}, got {value:?}");
        }
    }
    if let Some(expected) = &case.want_result {
        match_json(&value.to_json()?, expected)?;
    }
    Ok(())
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in &test.cases {
        print!("case {} ", case.note);
        if case.skip == Some(true) {
            println!("skipped");
            continue;
        }
        if case.error.is_none()
            && case.want_result.is_none()
            && case.want_unknown.is_none()
            && case.want_sensitive.is_none()
        {
            bail!("case {} checks nothing", case.note);
        }
        if let Err(e) = check(case) {
            bail!("case {} failed: {e}", case.note);
        }
        println!("passed");
    }
    Ok(())
}

#[test_resources("tests/evaluator/cases/*.yaml")]
fn run(path: &str) {
    yaml_test_impl(path).unwrap()
}
