// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use std::path::Path;

use anyhow::Result;
use tfscope::*;

#[cfg(feature = "arc")]
use std::sync::Arc as Rc;
#[cfg(not(feature = "arc"))]
use std::rc::Rc;

fn write(dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn options(call_module_type: CallModuleType) -> LoaderOptions {
    LoaderOptions {
        call_module_type,
        ..LoaderOptions::default()
    }
}

const ROOT_WITH_MODULES: &str = r#"
module "net" {
  source = "./modules/net"
  cidr   = "10.0.0.0/16"
}

module "vpc" {
  source  = "terraform-aws-modules/vpc/aws"
  version = "5.0.0"
}
"#;

const MANIFEST: &str = r#"{
  "Modules": [
    { "Key": "", "Source": "", "Dir": "." },
    { "Key": "net", "Source": "./modules/net", "Dir": "modules/net" },
    { "Key": "vpc", "Source": "registry.terraform.io/terraform-aws-modules/vpc/aws", "Version": "5.0.0", "Dir": ".terraform/modules/vpc" }
  ]
}"#;

fn module_tree(dir: &Path) -> Result<()> {
    init_logging();
    write(dir, "main.tf", ROOT_WITH_MODULES)?;
    write(
        dir,
        "modules/net/main.tf",
        r#"
variable "cidr" {}

module "subnets" {
  source = "./subnets"
}
"#,
    )?;
    write(dir, "modules/net/subnets/main.tf", "variable \"count_per_az\" { default = 2 }\n")?;
    write(dir, ".terraform/modules/vpc/main.tf", "variable \"name\" { default = \"vpc\" }\n")?;
    write(dir, ".terraform/modules/modules.json", MANIFEST)?;
    Ok(())
}

#[test]
fn only_configuration_files_are_loaded() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    write(dir.path(), "main.tf", "variable \"a\" {}\n")?;
    write(dir.path(), "variables.tf", "variable \"b\" {}\nlocals { c = 1 }\n")?;
    write(dir.path(), "notes.txt", "variable \"ignored\" {}\n")?;
    write(dir.path(), "main.tf.bak", "variable \"ignored_too\" {}\n")?;

    let loader = Loader::new(dir.path(), LoaderOptions::default())?;
    let (config, diags) = loader.load_config()?;
    assert!(!diags.has_errors(), "{diags}");
    assert!(config.is_root());
    let names: Vec<&String> = config.module.variables.keys().collect();
    assert_eq!(names, ["a", "b"]);
    assert!(config.module.locals.contains_key("c"));
    assert!(config.children.is_empty());
    Ok(())
}

#[test]
fn syntax_errors_fail_loading() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(dir.path(), "main.tf", "variable \"a\" {\n")?;
    let loader = Loader::new(dir.path(), LoaderOptions::default())?;
    let err = match loader.load_config() {
        Ok(_) => panic!("loading should fail"),
        Err(e) => e.to_string(),
    };
    assert!(err.contains("main.tf:2"), "{err}");
    assert!(err.contains("unexpected end of file"), "{err}");
    Ok(())
}

#[test]
fn all_module_calls() -> Result<()> {
    let dir = tempfile::tempdir()?;
    module_tree(dir.path())?;

    let loader = Loader::new(dir.path(), options(CallModuleType::All))?;
    let (config, diags) = loader.load_config()?;
    assert!(!diags.has_errors(), "{diags}");

    let net = &config.children["net"];
    assert_eq!(net.path, ["net"]);
    assert!(matches!(&net.source_addr, Some(ModuleSource::Local(s)) if s == "./modules/net"));
    assert!(net.module.variables.contains_key("cidr"));

    let subnets = &net.children["subnets"];
    assert_eq!(subnets.path, ["net", "subnets"]);
    assert!(subnets.module.variables.contains_key("count_per_az"));
    assert!(config
        .descendent(&["net".to_string(), "subnets".to_string()])
        .is_some());

    let vpc = &config.children["vpc"];
    assert!(matches!(&vpc.source_addr, Some(ModuleSource::Registry(_))));
    assert!(vpc.module.variables.contains_key("name"));
    Ok(())
}

#[test]
fn local_module_calls() -> Result<()> {
    let dir = tempfile::tempdir()?;
    module_tree(dir.path())?;

    let loader = Loader::new(dir.path(), options(CallModuleType::Local))?;
    let (config, _) = loader.load_config()?;
    assert!(config.children.contains_key("net"));
    assert!(config.children["net"].children.contains_key("subnets"));
    assert!(!config.children.contains_key("vpc"));
    Ok(())
}

#[test]
fn no_module_calls() -> Result<()> {
    let dir = tempfile::tempdir()?;
    module_tree(dir.path())?;

    let loader = Loader::new(dir.path(), options(CallModuleType::None))?;
    let (config, _) = loader.load_config()?;
    assert!(config.children.is_empty());
    // The calls themselves are still declared.
    assert_eq!(config.module.module_calls.len(), 2);
    Ok(())
}

#[test]
fn uninstalled_modules_are_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(dir.path(), "main.tf", ROOT_WITH_MODULES)?;

    let loader = Loader::new(dir.path(), LoaderOptions::default())?;
    let (config, diags) = loader.load_config()?;
    assert!(!diags.has_errors(), "{diags}");
    assert!(config.children.is_empty());
    Ok(())
}

#[test]
fn invalid_manifest() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(dir.path(), "main.tf", "")?;
    write(dir.path(), ".terraform/modules/modules.json", "{ not json")?;
    let err = match Loader::new(dir.path(), LoaderOptions::default()) {
        Ok(_) => panic!("manifest should be rejected"),
        Err(e) => e.to_string(),
    };
    assert!(err.contains("modules.json"), "{err}");
    Ok(())
}

const VARIABLES: &str = r#"
variable "a" {}
variable "b" {}
variable "c" {}
variable "d" {}
variable "list" {
  type = list(string)
}
variable "text" {
  type = string
}
"#;

fn value_of<'a>(values: &'a VariableValues, name: &str) -> Option<&'a Value> {
    values.get("").and_then(|v| v.get(name))
}

#[test]
fn variable_definition_file_precedence() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    write(dir.path(), "variables.tf", VARIABLES)?;
    write(
        dir.path(),
        "terraform.tfvars",
        "a = \"tfvars\"\nb = \"tfvars\"\nc = \"tfvars\"\nd = \"tfvars\"\n",
    )?;
    write(dir.path(), "terraform.tfvars.json", r#"{"b": "json", "c": "json", "d": "json"}"#)?;
    write(dir.path(), "a.auto.tfvars", "c = \"auto\"\nd = \"auto\"\n")?;
    write(dir.path(), "b.auto.tfvars.json", r#"{"d": "auto-json"}"#)?;
    write(dir.path(), "extra.tfvars", "list = [\"x\", \"y\"]\n")?;

    let loader = Loader::new(
        dir.path(),
        LoaderOptions {
            var_files: vec!["extra.tfvars".to_string()],
            variables: vec!["text=k=v".to_string()],
            ..LoaderOptions::default()
        },
    )?;
    let (config, diags) = loader.load_config()?;
    assert!(!diags.has_errors(), "{diags}");
    let (values, diags) = loader.load_variable_values(&config)?;
    assert!(diags.is_empty(), "{diags}");

    assert_eq!(value_of(&values, "a"), Some(&Value::from("tfvars")));
    assert_eq!(value_of(&values, "b"), Some(&Value::from("json")));
    assert_eq!(value_of(&values, "c"), Some(&Value::from("auto")));
    assert_eq!(value_of(&values, "d"), Some(&Value::from("auto-json")));
    assert_eq!(
        value_of(&values, "list"),
        Some(&Value::tuple(vec![Value::from("x"), Value::from("y")]))
    );
    // Primitive variables take the raw text after the first `=`.
    assert_eq!(value_of(&values, "text"), Some(&Value::from("k=v")));
    Ok(())
}

#[test]
fn command_line_overrides_win() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(dir.path(), "variables.tf", VARIABLES)?;
    write(dir.path(), "terraform.tfvars", "a = \"tfvars\"\n")?;

    let loader = Loader::new(
        dir.path(),
        LoaderOptions {
            variables: vec![
                "a=first".to_string(),
                "a=second".to_string(),
                "list=[\"p\"]".to_string(),
            ],
            ..LoaderOptions::default()
        },
    )?;
    let (config, _) = loader.load_config()?;
    let (values, diags) = loader.load_variable_values(&config)?;
    assert!(!diags.has_errors(), "{diags}");
    assert_eq!(value_of(&values, "a"), Some(&Value::from("second")));
    assert_eq!(
        value_of(&values, "list"),
        Some(&Value::tuple(vec![Value::from("p")]))
    );
    Ok(())
}

#[test]
fn unconstrained_overrides_keep_raw_text() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(dir.path(), "variables.tf", VARIABLES)?;

    let loader = Loader::new(
        dir.path(),
        LoaderOptions {
            variables: vec![
                "a=var.other".to_string(),
                "b=[1, 2]".to_string(),
                "text=plain words".to_string(),
            ],
            ..LoaderOptions::default()
        },
    )?;
    let (config, _) = loader.load_config()?;
    let (values, diags) = loader.load_variable_values(&config)?;
    assert!(!diags.has_errors(), "{diags}");
    assert_eq!(value_of(&values, "a"), Some(&Value::from("var.other")));
    assert_eq!(value_of(&values, "b"), Some(&Value::from("[1, 2]")));
    assert_eq!(value_of(&values, "text"), Some(&Value::from("plain words")));
    Ok(())
}

#[test]
fn invalid_values() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(dir.path(), "variables.tf", VARIABLES)?;
    write(
        dir.path(),
        "terraform.tfvars",
        "a = 1\nunknown = 2\nblock {}\n",
    )?;

    let loader = Loader::new(
        dir.path(),
        LoaderOptions {
            variables: vec!["novalue".to_string(), "=x".to_string(), "missing=1".to_string()],
            ..LoaderOptions::default()
        },
    )?;
    let (config, _) = loader.load_config()?;
    let (values, diags) = loader.load_variable_values(&config)?;

    let summaries: Vec<(Severity, &str)> = diags
        .iter()
        .map(|d| (d.severity, d.summary.as_str()))
        .collect();
    assert_eq!(
        summaries,
        [
            (Severity::Error, "Unexpected block"),
            (Severity::Warning, "Value for undeclared variable"),
            (Severity::Error, "Invalid -var option"),
            (Severity::Error, "Invalid -var option"),
            (Severity::Warning, "Value for undeclared variable"),
        ]
    );
    assert!(diags.to_string().contains("the command line"), "{diags}");

    assert_eq!(value_of(&values, "a"), Some(&Value::from(1i64)));
    assert!(value_of(&values, "unknown").is_none());
    Ok(())
}

#[test]
fn options_from_json_and_yaml() -> Result<()> {
    let from_json = LoaderOptions::from_json_str(
        r#"{"call_module_type": "local", "var_files": ["prod.tfvars"], "variables": ["a=1"]}"#,
    )?;
    let from_yaml = LoaderOptions::from_yaml_str(
        "call_module_type: local\nvar_files: [prod.tfvars]\nvariables: [a=1]\n",
    )?;
    assert_eq!(from_json, from_yaml);
    assert_eq!(from_json.call_module_type, CallModuleType::Local);

    assert_eq!(LoaderOptions::from_json_str("{}")?, LoaderOptions::default());
    assert_eq!(
        LoaderOptions::default().call_module_type,
        CallModuleType::All
    );

    let err = match LoaderOptions::from_yaml_str("call_module_type: remote") {
        Ok(_) => panic!("invalid call module type accepted"),
        Err(e) => e.to_string(),
    };
    assert!(err.contains("invalid call module type"), "{err}");
    Ok(())
}

#[test]
fn loaded_values_reach_the_evaluator() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write(
        dir.path(),
        "main.tf",
        r#"
variable "instance_type" {
  default = "t2.micro"
}

resource "aws_instance" "web" {
  instance_type = var.instance_type
}
"#,
    )?;
    write(dir.path(), "terraform.tfvars", "instance_type = \"m5.large\"\n")?;

    let loader = Loader::new(dir.path(), LoaderOptions::default())?;
    let (config, _) = loader.load_config()?;
    let (values, _) = loader.load_variable_values(&config)?;
    let mut runner = Runner::new(Rc::new(config), values, ContextMeta::default());

    let module = runner.module()?.clone();
    let resource = &module.managed_resources["aws_instance.web"];
    let attr = resource.config.attribute("instance_type").unwrap();
    let (value, diags) = runner.evaluate_expr(&attr.expr, &Type::String)?;
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(value, Value::from("m5.large"));
    Ok(())
}
