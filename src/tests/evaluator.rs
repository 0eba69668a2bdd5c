// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::common::*;
use crate::diagnostics::*;
use crate::evaluator::*;
use crate::types::Type;
use crate::value::*;

use anyhow::Result;

fn eval(evaluator: &mut Evaluator, text: &str) -> Result<(Value, Diagnostics)> {
    evaluator.evaluate_expr(&*expr(text)?, &Type::Dynamic)
}

fn circular_chains(diags: &Diagnostics) -> Vec<String> {
    diags
        .iter()
        .filter_map(|d| match &d.kind {
            DiagnosticKind::CircularReference { chain } => Some(chain.clone()),
            _ => None,
        })
        .collect()
}

const CYCLE: &str = r#"
locals {
  a = local.b
  b = "${local.c}-x"
  c = upper(local.a)
  ok = 1
}
"#;

#[test]
fn cycles_report_the_chain_from_the_entry_point() -> Result<()> {
    let mut evaluator = evaluator(CYCLE, &[])?;

    let (value, diags) = eval(&mut evaluator, "local.a")?;
    assert_eq!(value, DYNAMIC);
    assert_eq!(
        circular_chains(&diags),
        ["local.a -> local.b -> local.c -> local.a"]
    );
    assert!(evaluator.call_stack.is_empty());

    let (_, diags) = eval(&mut evaluator, "local.c")?;
    assert_eq!(
        circular_chains(&diags),
        ["local.c -> local.a -> local.b -> local.c"]
    );
    assert!(evaluator.call_stack.is_empty());

    // Locals outside the cycle are unaffected.
    let (value, diags) = eval(&mut evaluator, "local.ok + 1")?;
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(value, Value::from(2i64));
    Ok(())
}

#[test]
fn shared_dependencies_are_not_cycles() -> Result<()> {
    let mut evaluator = evaluator(
        r#"
locals {
  top   = local.left + local.right
  left  = local.base * 2
  right = local.base * 3
  base  = 1
}
"#,
        &[],
    )?;
    let (value, diags) = eval(&mut evaluator, "local.top + local.base")?;
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(value, Value::from(6i64));
    assert!(evaluator.call_stack.is_empty());
    Ok(())
}

const VARIABLES: &str = r#"
variable "with_default" {
  default = "fallback"
}

variable "nullable_default" {
  default = "fallback"
}

variable "not_nullable" {
  default  = "fallback"
  nullable = false
}

variable "required" {
  type = list(string)
}

variable "replicas" {
  type = number
}

variable "secret" {
  default   = "hunter2"
  sensitive = true
}

variable "strict_secret" {
  default   = "hunter2"
  sensitive = true
  nullable  = false
}
"#;

#[test]
fn variable_value_precedence() -> Result<()> {
    let mut evaluator = evaluator(
        VARIABLES,
        &[
            ("nullable_default", Value::null()),
            ("not_nullable", Value::null()),
        ],
    )?;

    assert_eq!(eval(&mut evaluator, "var.with_default")?.0, Value::from("fallback"));
    // A null value replaces the default unless the variable is not nullable.
    assert!(eval(&mut evaluator, "var.nullable_default")?.0.is_null());
    assert_eq!(eval(&mut evaluator, "var.not_nullable")?.0, Value::from("fallback"));

    let (value, diags) = eval(&mut evaluator, "var.required")?;
    assert!(diags.is_empty(), "{diags}");
    assert_eq!(value, Value::Unknown(Type::list(Type::String)));
    Ok(())
}

#[test]
fn values_are_converted_to_the_variable_type() -> Result<()> {
    let mut evaluator = evaluator(
        VARIABLES,
        &[
            ("replicas", Value::from("3")),
            ("required", Value::tuple(vec![Value::from(1i64)])),
        ],
    )?;
    assert_eq!(eval(&mut evaluator, "var.replicas")?.0, Value::from(3i64));
    assert_eq!(
        eval(&mut evaluator, "var.required")?.0,
        Value::list(Type::String, vec![Value::from("1")])
    );
    Ok(())
}

#[test]
fn type_mismatch_degrades_to_unknown() -> Result<()> {
    let mut evaluator = evaluator(VARIABLES, &[("replicas", Value::from("three"))])?;
    let (value, diags) = eval(&mut evaluator, "var.replicas")?;
    assert_eq!(value, DYNAMIC);
    let diag = diags.iter().next().unwrap();
    assert_eq!(diag.summary, "Incorrect variable type");
    assert!(matches!(diag.kind, DiagnosticKind::TypeMismatch));
    // Points at the declaration, not at the reference.
    assert_eq!(diag.subject.as_ref().map(|s| s.line), Some(19));

    // With a wanted type the result is unknown of that type.
    let (value, _) = evaluator.evaluate_expr(&*expr("var.replicas")?, &Type::Number)?;
    assert_eq!(value, Value::Unknown(Type::Number));
    Ok(())
}

#[test]
fn sensitive_variables_are_marked() -> Result<()> {
    let mut evaluator = evaluator(VARIABLES, &[])?;
    let (value, _) = eval(&mut evaluator, "var.secret")?;
    assert!(value.has_mark(Mark::Sensitive));
    assert_eq!(value.to_string(), "(sensitive value)");

    let (value, _) = eval(&mut evaluator, "{ password = var.secret, user = \"admin\" }")?;
    assert!(value.contains_mark(Mark::Sensitive));
    assert!(!value.has_mark(Mark::Sensitive));

    let (value, diags) = eval(&mut evaluator, "nonsensitive(var.secret)")?;
    assert!(diags.is_empty(), "{diags}");
    assert!(!value.contains_mark(Mark::Sensitive));
    Ok(())
}

#[test]
fn supplied_sensitive_values_are_marked() -> Result<()> {
    let mut evaluator = evaluator(
        VARIABLES,
        &[
            ("secret", Value::from("supplied")),
            ("strict_secret", Value::null()),
        ],
    )?;

    let (value, diags) = eval(&mut evaluator, "var.secret")?;
    assert!(diags.is_empty(), "{diags}");
    assert!(value.has_mark(Mark::Sensitive));
    assert_eq!(value.unmark().0, Value::from("supplied"));

    // A null supplied for a non-nullable variable takes the default, still marked.
    let (value, diags) = eval(&mut evaluator, "var.strict_secret")?;
    assert!(diags.is_empty(), "{diags}");
    assert!(value.has_mark(Mark::Sensitive));
    assert_eq!(value.unmark().0, Value::from("hunter2"));
    Ok(())
}

#[test]
fn suggestion_threshold() {
    let candidates = ["instance_type", "module", "region"];
    assert_eq!(name_suggestion("instance_typ", candidates), Some("instance_type"));
    assert_eq!(name_suggestion("regoin", candidates), Some("region"));
    // Three edits away.
    assert_eq!(name_suggestion("regixyz", candidates), None);
    assert_eq!(name_suggestion("modul", Vec::<&str>::new()), None);
}

#[test]
fn undeclared_names_get_suggestions() -> Result<()> {
    let mut evaluator = evaluator(VARIABLES, &[])?;
    let (value, diags) = eval(&mut evaluator, "var.secert")?;
    assert_eq!(value, DYNAMIC);
    let diag = diags.iter().next().unwrap();
    assert_eq!(diag.summary, "Reference to undeclared input variable");
    match &diag.kind {
        DiagnosticKind::UndeclaredSymbol { suggestion } => {
            assert_eq!(suggestion.as_deref(), Some("secret"))
        }
        k => panic!("unexpected diagnostic kind {k:?}"),
    }

    let (_, diags) = eval(&mut evaluator, "var.zzzzzzzz")?;
    assert!(diags.to_string().contains("This variable can be declared"), "{diags}");
    Ok(())
}

#[test]
fn path_attributes() -> Result<()> {
    let mut evaluator = evaluator("", &[])?;
    assert_eq!(eval(&mut evaluator, "path.module")?.0, Value::from("/work/app"));
    assert_eq!(eval(&mut evaluator, "path.root")?.0, Value::from("/work/app"));

    let (value, diags) = eval(&mut evaluator, "path.modle")?;
    assert_eq!(value, DYNAMIC);
    assert!(diags.to_string().contains("Did you mean \"module\"?"), "{diags}");

    let (value, diags) = eval(&mut evaluator, "path.cwd")?;
    assert!(diags.is_empty(), "{diags}");
    assert!(value.as_str().is_some_and(|s| !s.is_empty()));
    Ok(())
}

#[cfg(unix)]
#[test]
fn cwd_follows_the_original_working_directory() -> Result<()> {
    let meta = ContextMeta {
        original_working_dir: "/tmp/project".to_string(),
        ..ContextMeta::default()
    };
    let mut evaluator = evaluator_with_meta("", &[], meta)?;
    assert_eq!(eval(&mut evaluator, "path.cwd")?.0, Value::from("/tmp/project"));
    Ok(())
}

#[test]
fn workspace() -> Result<()> {
    let mut evaluator = evaluator("", &[])?;
    assert_eq!(eval(&mut evaluator, "terraform.workspace")?.0, Value::from("default"));

    let meta = ContextMeta {
        env: "staging".to_string(),
        ..ContextMeta::default()
    };
    let mut evaluator = evaluator_with_meta("", &[], meta)?;
    assert_eq!(eval(&mut evaluator, "terraform.workspace")?.0, Value::from("staging"));

    let (value, diags) = eval(&mut evaluator, "terraform.env")?;
    assert_eq!(value, DYNAMIC);
    assert!(matches!(
        diags.iter().next().map(|d| &d.kind),
        Some(DiagnosticKind::DeprecatedAttribute)
    ));
    Ok(())
}

#[test]
fn values_only_known_after_apply() -> Result<()> {
    let mut evaluator = evaluator(
        r#"
resource "aws_instance" "web" {
  count = 2
}
"#,
        &[],
    )?;
    for text in ["aws_instance.web[0].id", "count.index", "each.key", "module.net.out"] {
        let (value, diags) = eval(&mut evaluator, text)?;
        assert!(!diags.has_errors(), "{text}: {diags}");
        assert!(!value.is_known(), "{text}");
    }
    Ok(())
}
