// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::Result;
use tfscope::unstable::*;
use tfscope::*;

#[cfg(feature = "arc")]
use std::sync::Arc as Rc;
#[cfg(not(feature = "arc"))]
use std::rc::Rc;

fn runner_for(hcl: &str) -> Result<Runner> {
    let source = Source::from_contents("main.tf".to_string(), hcl.to_string())?;
    let file = parse_file(&source)?;
    let (module, diags) = Module::from_files(&[file], "/work/app");
    assert!(!diags.has_errors(), "{diags}");
    Ok(Runner::new(
        Rc::new(Config::new(module)),
        VariableValues::new(),
        ContextMeta::default(),
    ))
}

// Expands the body of the first `example` resource of the module.
fn expand(runner: &mut Runner, schema: &BodySchema) -> Result<(Body, Diagnostics)> {
    let module = runner.module()?.clone();
    let resource = module
        .managed_resources
        .values()
        .find(|r| r.type_name == "example")
        .expect("an example resource is declared");
    runner.expand_block(&resource.config, schema)
}

fn eval_attr(runner: &mut Runner, body: &Body, name: &str) -> Result<Value> {
    let attr = body.attribute(name).expect("attribute is present");
    let (value, diags) = runner.evaluate_expr(&attr.expr, &Type::Dynamic)?;
    assert!(!diags.has_errors(), "{diags}");
    Ok(value)
}

fn type_names(body: &Body) -> Vec<&str> {
    body.blocks.iter().map(|b| b.type_name.as_str()).collect()
}

#[test]
fn expands_over_a_list() -> Result<()> {
    let mut runner = runner_for(
        r#"
variable "ports" {
  default = [80, 443]
}

resource "example" "r" {
  name = "sg"

  dynamic "ingress" {
    for_each = var.ports
    content {
      from_port = ingress.value
      position  = ingress.key
    }
  }

  egress {
    to_port = 0
  }
}
"#,
    )?;
    let schema = BodySchema::new()
        .block("ingress", BodySchema::new())
        .block("egress", BodySchema::new());
    let (body, diags) = expand(&mut runner, &schema)?;
    assert!(diags.is_empty(), "{diags}");

    assert_eq!(type_names(&body), ["ingress", "ingress", "egress"]);
    assert!(body.attribute("name").is_some());
    assert_eq!(eval_attr(&mut runner, &body.blocks[0].body, "from_port")?, Value::from(80i64));
    assert_eq!(eval_attr(&mut runner, &body.blocks[1].body, "from_port")?, Value::from(443i64));
    assert_eq!(eval_attr(&mut runner, &body.blocks[1].body, "position")?, Value::from(1i64));
    Ok(())
}

#[test]
fn iterator_and_labels() -> Result<()> {
    let mut runner = runner_for(
        r#"
locals {
  settings = {
    a = "1"
    b = "2"
  }
}

resource "example" "r" {
  dynamic "setting" {
    for_each = local.settings
    iterator = s
    labels   = [upper(s.key)]
    content {
      pair = "${s.key}=${s.value}"
    }
  }
}
"#,
    )?;
    let schema = BodySchema::new().block("setting", BodySchema::new());
    let (body, diags) = expand(&mut runner, &schema)?;
    assert!(diags.is_empty(), "{diags}");

    assert_eq!(body.blocks.len(), 2);
    assert_eq!(body.blocks[0].labels, ["A"]);
    assert_eq!(body.blocks[1].labels, ["B"]);
    assert_eq!(eval_attr(&mut runner, &body.blocks[0].body, "pair")?, Value::from("a=1"));
    assert_eq!(eval_attr(&mut runner, &body.blocks[1].body, "pair")?, Value::from("b=2"));
    Ok(())
}

#[test]
fn nested_dynamic_blocks() -> Result<()> {
    let mut runner = runner_for(
        r#"
resource "example" "nested" {
  dynamic "outer" {
    for_each = ["a", "b"]
    content {
      name = outer.value
      dynamic "inner" {
        for_each = [1, 2]
        content {
          pair = "${outer.value}-${inner.value}"
        }
      }
    }
  }
}
"#,
    )?;
    let schema = BodySchema::new().block("outer", BodySchema::new().block("inner", BodySchema::new()));
    let (body, diags) = expand(&mut runner, &schema)?;
    assert!(diags.is_empty(), "{diags}");

    assert_eq!(type_names(&body), ["outer", "outer"]);
    let second = &body.blocks[1].body;
    assert_eq!(eval_attr(&mut runner, second, "name")?, Value::from("b"));
    assert_eq!(type_names(second), ["inner", "inner"]);
    assert_eq!(eval_attr(&mut runner, &second.blocks[0].body, "pair")?, Value::from("b-1"));
    assert_eq!(eval_attr(&mut runner, &second.blocks[1].body, "pair")?, Value::from("b-2"));
    Ok(())
}

#[test]
fn unknown_for_each_gives_one_block() -> Result<()> {
    let mut runner = runner_for(
        r#"
resource "aws_instance" "web" {}

resource "example" "unknown" {
  dynamic "tag" {
    for_each = aws_instance.web.tags
    content {
      key = tag.key
    }
  }
}
"#,
    )?;
    let schema = BodySchema::new().block("tag", BodySchema::new());
    let (body, diags) = expand(&mut runner, &schema)?;
    assert!(!diags.has_errors(), "{diags}");
    assert_eq!(body.blocks.len(), 1);
    assert!(!eval_attr(&mut runner, &body.blocks[0].body, "key")?.is_known());
    Ok(())
}

#[test]
fn sensitive_for_each_is_expanded() -> Result<()> {
    let mut runner = runner_for(
        r#"
variable "names" {
  default   = ["x", "y", "z"]
  sensitive = true
}

resource "example" "sensitive" {
  dynamic "item" {
    for_each = var.names
    content {}
  }
}
"#,
    )?;
    let schema = BodySchema::new().block("item", BodySchema::new());
    let (body, diags) = expand(&mut runner, &schema)?;
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(body.blocks.len(), 3);
    Ok(())
}

fn expansion_error(hcl: &str) -> Result<String> {
    let mut runner = runner_for(hcl)?;
    let schema = BodySchema::new().block("item", BodySchema::new());
    let (body, diags) = expand(&mut runner, &schema)?;
    assert!(body.blocks.is_empty());
    assert!(diags.has_errors());
    Ok(diags.to_string())
}

#[test]
fn invalid_dynamic_blocks() -> Result<()> {
    let err = expansion_error(
        r#"
resource "example" "e" {
  dynamic "item" {
    content {}
  }
}
"#,
    )?;
    assert!(err.contains("Missing required argument"), "{err}");

    let err = expansion_error(
        r#"
resource "example" "e" {
  dynamic "item" {
    for_each = [1]
  }
}
"#,
    )?;
    assert!(err.contains("Missing content block"), "{err}");

    let err = expansion_error(
        r#"
resource "example" "e" {
  dynamic "item" {
    for_each = [1]
    iterator = "it"
    content {}
  }
}
"#,
    )?;
    assert!(err.contains("Invalid dynamic iterator name"), "{err}");

    let err = expansion_error(
        r#"
resource "example" "e" {
  dynamic "item" {
    for_each = null
    content {}
  }
}
"#,
    )?;
    assert!(err.contains("Cannot use a null value in for_each."), "{err}");

    let err = expansion_error(
        r#"
resource "example" "e" {
  dynamic "item" {
    for_each = 5
    content {}
  }
}
"#,
    )?;
    assert!(err.contains("Cannot use a number value in for_each"), "{err}");

    let err = expansion_error(
        r#"
resource "example" "e" {
  dynamic "item" {
    for_each = ["a"]
    labels   = "a"
    content {}
  }
}
"#,
    )?;
    assert!(err.contains("Invalid dynamic block labels"), "{err}");
    Ok(())
}

#[test]
fn blocks_outside_the_schema_are_kept() -> Result<()> {
    let hcl = r#"
resource "example" "kept" {
  dynamic "other" {
    for_each = [1, 2]
    content {}
  }
}
"#;
    let mut runner = runner_for(hcl)?;
    let (body, diags) = expand(&mut runner, &BodySchema::new())?;
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(type_names(&body), ["dynamic"]);

    let module = runner.module()?.clone();
    let mut plain = Runner::without_evaluator(runner.config.clone(), ModuleInstance::root());
    let schema = BodySchema::new().block("other", BodySchema::new());
    let resource = &module.managed_resources["example.kept"];
    let (body, diags) = plain.expand_block(&resource.config, &schema)?;
    assert!(diags.is_empty());
    assert_eq!(type_names(&body), ["dynamic"]);
    Ok(())
}
