// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use test_generator::test_resources;
use tfscope::unstable::*;
use tfscope::*;

macro_rules! my_assert_eq {
    ($left:expr, $right:expr, $($arg:tt)+) => {
	match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
		    return Err(anyhow!("mismatch:\nleft  = {}\nright = {}\n{}",
		     		       &$left, &$right, format_args!($($arg)+)));
                }
            }
	}
    }
}

fn render_steps(steps: &[TraversalStep]) -> Result<String> {
    let mut out = String::new();
    for step in steps {
        match step {
            TraversalStep::Attr { name, .. } => {
                out.push('.');
                out.push_str(name);
            }
            TraversalStep::Index { key, .. } => {
                out.push_str(&format!("[{}]", key.to_hcl()?));
            }
        }
    }
    Ok(out)
}

fn render_list(items: &[ExprRef]) -> Result<String> {
    let items: Result<Vec<String>> = items.iter().map(|e| render(e)).collect();
    Ok(items?.join(", "))
}

// Renders an expression as a compact prefix form that makes the shape of
// the tree visible.
fn render(expr: &Expr) -> Result<String> {
    Ok(match expr {
        Expr::Literal { value, .. } => value.to_hcl()?,
        Expr::Template { parts, .. } => {
            let mut out = "(template".to_string();
            for part in parts {
                out.push(' ');
                match part {
                    TemplatePart::Literal(s) => out.push_str(&format!("{s:?}")),
                    TemplatePart::Interp(e) => out.push_str(&render(e)?),
                }
            }
            out.push(')');
            out
        }
        Expr::ScopeTraversal { root, steps, .. } => format!("{root}{}", render_steps(steps)?),
        Expr::RelativeTraversal { source, steps, .. } => {
            format!("(rel {} {})", render(source)?, render_steps(steps)?)
        }
        Expr::Index {
            collection, key, ..
        } => format!("(index {} {})", render(collection)?, render(key)?),
        Expr::Splat { source, each, .. } => {
            format!("(splat {} {})", render(source)?, render_steps(each)?)
        }
        Expr::Tuple { items, .. } => format!("[{}]", render_list(items)?),
        Expr::Object { items, .. } => {
            let mut rendered = vec![];
            for (key, value) in items {
                let key = match key {
                    ObjectKey::Name(_, name) => name.clone(),
                    ObjectKey::Expr(e) => format!("[{}]", render(e)?),
                };
                rendered.push(format!("{key} = {}", render(value)?));
            }
            format!("{{{}}}", rendered.join(", "))
        }
        Expr::FunctionCall {
            name,
            args,
            expand_final,
            ..
        } => format!(
            "{name}({}{})",
            render_list(args)?,
            if *expand_final { "..." } else { "" }
        ),
        Expr::Unary { op, expr, .. } => {
            let op = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "!",
            };
            format!("({op} {})", render(expr)?)
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            format!("({op} {} {})", render(lhs)?, render(rhs)?)
        }
        Expr::Conditional {
            cond,
            true_expr,
            false_expr,
            ..
        } => format!(
            "(? {} {} {})",
            render(cond)?,
            render(true_expr)?,
            render(false_expr)?
        ),
        Expr::For {
            key_var,
            value_var,
            collection,
            key_expr,
            value_expr,
            cond,
            group,
            ..
        } => {
            let mut out = "(for ".to_string();
            if let Some(k) = key_var {
                out.push_str(&format!("{k}, "));
            }
            out.push_str(&format!("{value_var} in {} : ", render(collection)?));
            if let Some(k) = key_expr {
                out.push_str(&format!("{} => ", render(k)?));
            }
            out.push_str(&render(value_expr)?);
            if *group {
                out.push_str(" ...");
            }
            if let Some(c) = cond {
                out.push_str(&format!(" if {}", render(c)?));
            }
            out.push(')');
            out
        }
        Expr::Parens { expr, .. } => format!("(paren {})", render(expr)?),
    })
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
#[serde(deny_unknown_fields)]
struct Case {
    note: String,
    expr: Option<String>,
    hcl: Option<String>,
    ast: Option<String>,
    // Text covered by the span of the parsed expression.
    span: Option<String>,
    error: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    cases: Vec<Case>,
}

fn check_expr(case: &Case, text: &str) -> Result<()> {
    let source = Source::from_contents("expr.tf".to_string(), text.to_string())?;
    match (parse_expression(&source), &case.error) {
        (Ok(expr), None) => {
            if let Some(ast) = &case.ast {
                my_assert_eq!(render(&expr)?, *ast, "case {}", case.note);
            }
            if let Some(span) = &case.span {
                my_assert_eq!(expr.span().text(), span.as_str(), "case {}", case.note);
            }
            Ok(())
        }
        (Ok(expr), Some(_)) => bail!("parsing succeeded: {}", render(&expr)?),
        (Err(e), Some(expected)) => {
            let actual = e.to_string();
            if !actual.contains(expected.as_str()) {
                bail!("error\n`{actual}`\ndoes not contain `{expected}`");
            }
            Ok(())
        }
        (Err(e), None) => Err(e),
    }
}

fn check_file(case: &Case, text: &str) -> Result<()> {
    let source = Source::from_contents("main.tf".to_string(), text.to_string())?;
    match (parse_file(&source), &case.error) {
        (Ok(_), None) => Ok(()),
        (Ok(_), Some(_)) => bail!("parsing succeeded"),
        (Err(e), Some(expected)) => {
            let actual = e.to_string();
            if !actual.contains(expected.as_str()) {
                bail!("error\n`{actual}`\ndoes not contain `{expected}`");
            }
            Ok(())
        }
        (Err(e), None) => Err(e),
    }
}

fn yaml_test_impl(file: &str) -> Result<()> {
    println!("\nrunning {file}");
    let yaml = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml)?;

    for case in &test.cases {
        print!("case {} ", case.note);
        match (&case.expr, &case.hcl) {
            (Some(expr), None) => check_expr(case, expr)?,
            (None, Some(hcl)) => check_file(case, hcl)?,
            _ => bail!("case {} needs exactly one of expr or hcl", case.note),
        }
        println!("passed");
    }
    Ok(())
}

#[test_resources("tests/parser/cases/*.yaml")]
fn run(path: &str) {
    yaml_test_impl(path).unwrap()
}

fn parse(text: &str) -> Result<File> {
    parse_file(&Source::from_contents("main.tf".to_string(), text.to_string())?)
}

#[test]
fn blocks_and_attributes() -> Result<()> {
    let file = parse(
        r#"
variable "region" {
  type    = string
  default = "westus"
}

resource "aws_instance" "web" {
  ami = "ami-123"
  ebs_block_device {
    size = 10
  }
}

locals { a = 1 }
"#,
    )?;

    assert!(file.body.attributes.is_empty());
    assert_eq!(file.body.blocks.len(), 3);

    let variable = &file.body.blocks[0];
    assert_eq!(variable.type_name, "variable");
    assert_eq!(variable.labels, ["region"]);
    assert!(variable.def_span.text().starts_with("variable \"region"));
    let default = variable.body.attribute("default").unwrap();
    assert_eq!(render(&default.expr)?, "(template \"westus\")");
    assert_eq!(default.span.text(), "default = \"westus\"");

    let resource = &file.body.blocks[1];
    assert_eq!(resource.labels, ["aws_instance", "web"]);
    assert_eq!(resource.label_spans[1].text(), "web");
    let nested: Vec<_> = resource.body.blocks_of_type("ebs_block_device").collect();
    assert_eq!(nested.len(), 1);
    assert!(nested[0].body.attribute("size").is_some());

    let locals = &file.body.blocks[2];
    assert_eq!(locals.labels.len(), 0);
    assert_eq!(render(&locals.body.attribute("a").unwrap().expr)?, "1");
    Ok(())
}

#[test]
fn attribute_positions() -> Result<()> {
    let file = parse("a = 1\n\n  b = var.x\n")?;
    let b = file.body.attribute("b").unwrap();
    assert_eq!((b.name_span.line, b.name_span.col), (3, 3));
    assert_eq!(b.expr.span().text(), "var.x");
    Ok(())
}

#[test]
fn expressions_span_lines_inside_brackets() -> Result<()> {
    let file = parse(
        r#"
a = [
  1,
  2,
]
b = max(
  1,
  2
)
c = (
  1 +
  2
)
"#,
    )?;
    assert_eq!(render(&file.body.attribute("a").unwrap().expr)?, "[1, 2]");
    assert_eq!(render(&file.body.attribute("b").unwrap().expr)?, "max(1, 2)");
    assert_eq!(
        render(&file.body.attribute("c").unwrap().expr)?,
        "(paren (+ 1 2))"
    );
    Ok(())
}

#[test]
fn literal_values() -> Result<()> {
    let source = Source::from_contents("x".to_string(), "\"a${b}\"".to_string())?;
    let expr = parse_expression(&source)?;
    assert!(literal_value(&expr).is_none());

    let source = Source::from_contents("x".to_string(), "\"plain\"".to_string())?;
    let expr = parse_expression(&source)?;
    assert_eq!(literal_value(&expr), Some(Value::from("plain")));

    let source = Source::from_contents("x".to_string(), "-1.5".to_string())?;
    let expr = parse_expression(&source)?;
    assert_eq!(literal_value(&expr), Some(Value::from(-1.5)));
    Ok(())
}
