// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use std::collections::BTreeMap;

use anyhow::Result;
use tfscope::unstable::*;
use tfscope::*;

#[cfg(feature = "arc")]
use std::sync::Arc as Rc;
#[cfg(not(feature = "arc"))]
use std::rc::Rc;

fn module(hcl: &str, dir: &str) -> Result<Module> {
    let source = Source::from_contents(format!("{dir}/main.tf"), hcl.to_string())?;
    let (module, diags) = Module::from_files(&[parse_file(&source)?], dir);
    assert!(!diags.has_errors(), "{diags}");
    Ok(module)
}

const ROOT: &str = r#"
variable "env" {
  default = "prod"
}

resource "aws_instance" "web" {}

module "net" {
  source = "./net"
  name   = "${var.env}-net"
  extra  = 1
}

module "dep" {
  source = "./net"
  name   = aws_instance.web.id
}

module "many" {
  source = "./net"
  count  = 2
  name   = "many"
}

module "each" {
  source   = "./net"
  for_each = toset(["a"])
  name     = each.key
}

module "missing" {
  source = "./missing"
}
"#;

const NET: &str = r#"
variable "name" {
  type = string
}

variable "unset" {
  default = "fallback"
}

locals {
  full = "${var.name}/${path.module}"
}
"#;

fn config() -> Result<Config> {
    let mut config = Config::new(module(ROOT, "/work/app")?);
    for name in ["net", "dep", "many", "each"] {
        config.children.insert(
            name.to_string(),
            Config {
                path: vec![name.to_string()],
                module: module(NET, "/work/app/net")?,
                children: BTreeMap::new(),
                source_addr: Some(ModuleSource::Local("./net".to_string())),
            },
        );
    }
    Ok(config)
}

fn eval(runner: &mut Runner, text: &str) -> Result<(Value, Diagnostics)> {
    let source = Source::from_contents("<expr>".to_string(), text.to_string())?;
    runner.evaluate_expr(&*parse_expression(&source)?, &Type::Dynamic)
}

#[test]
fn child_runners_receive_evaluated_arguments() -> Result<()> {
    let mut root = Runner::new(Rc::new(config()?), VariableValues::new(), ContextMeta::default());
    let (mut runners, diags) = root.module_runners()?;
    assert!(!diags.has_errors(), "{diags}");

    // Calls with count or for_each and calls without a loaded module are
    // skipped.
    let paths: Vec<String> = runners.iter().map(|r| r.module_path.to_string()).collect();
    assert_eq!(paths, ["module.dep", "module.net"]);
    assert!(runners.iter().all(|r| r.has_evaluator()));

    let net = &mut runners[1];
    assert_eq!(eval(net, "var.name")?.0, Value::from("prod-net"));
    assert_eq!(eval(net, "var.unset")?.0, Value::from("fallback"));
    assert_eq!(
        eval(net, "local.full")?.0,
        Value::from("prod-net//work/app/net")
    );
    assert_eq!(eval(net, "path.root")?.0, Value::from("/work/app"));

    // The argument refers to a resource attribute.
    let dep = &mut runners[0];
    let (value, diags) = eval(dep, "var.name")?;
    assert!(!diags.has_errors(), "{diags}");
    assert_eq!(value, Value::unknown(Type::String));
    Ok(())
}

#[test]
fn child_runner_sees_child_declarations() -> Result<()> {
    let mut root = Runner::new(Rc::new(config()?), VariableValues::new(), ContextMeta::default());
    let (mut runners, _) = root.module_runners()?;
    let net = &mut runners[1];

    assert!(net.module()?.variables.contains_key("unset"));
    assert!(!net.module()?.variables.contains_key("env"));

    let (value, diags) = eval(net, "var.env")?;
    assert!(diags.has_errors());
    assert_eq!(value, DYNAMIC);
    assert!(diags.to_string().contains("Reference to undeclared input variable"), "{diags}");

    // Grandchildren: the net module calls nothing.
    let (grandchildren, _) = net.module_runners()?;
    assert!(grandchildren.is_empty());
    Ok(())
}

#[test]
fn root_values_are_kept_for_the_root() -> Result<()> {
    let values = VariableValues::from([(
        String::new(),
        BTreeMap::from([("env".to_string(), Value::from("dev"))]),
    )]);
    let mut root = Runner::new(Rc::new(config()?), values, ContextMeta::default());
    let (mut runners, _) = root.module_runners()?;
    assert_eq!(eval(&mut runners[1], "var.name")?.0, Value::from("dev-net"));
    assert_eq!(eval(&mut root, "var.env")?.0, Value::from("dev"));
    Ok(())
}

#[test]
fn root_variables_take_defaults_without_supplied_values() -> Result<()> {
    let mut root = Runner::new(Rc::new(config()?), VariableValues::new(), ContextMeta::default());
    let (value, diags) = eval(&mut root, "var.env")?;
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(value, Value::from("prod"));
    assert_eq!(eval(&mut root, "\"${var.env}-net\"")?.0, Value::from("prod-net"));
    Ok(())
}

#[test]
fn runners_without_evaluator() -> Result<()> {
    let config = Rc::new(config()?);
    let mut root = Runner::without_evaluator(config, ModuleInstance::root());
    assert!(!root.has_evaluator());
    assert_eq!(root.module()?.module_calls.len(), 5);

    let (mut runners, diags) = root.module_runners()?;
    assert!(diags.is_empty());
    assert_eq!(runners.len(), 2);
    assert!(runners.iter().all(|r| !r.has_evaluator()));
    assert!(runners[1].module()?.variables.contains_key("name"));

    let source = Source::from_contents("<expr>".to_string(), "1".to_string())?;
    let expr = parse_expression(&source)?;
    assert!(runners[1].evaluate_expr(&expr, &Type::Dynamic).is_err());
    Ok(())
}
