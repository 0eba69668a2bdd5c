// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Evaluation of expressions within one module instance.

use crate::addrs::*;
use crate::ast::*;
use crate::callstack::CallStack;
use crate::config::Config;
use crate::convert::convert;
use crate::diagnostics::*;
use crate::lexer::Span;
use crate::scope::{BodySchema, Data, Scope};
use crate::types::Type;
use crate::value::*;
use crate::Rc;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Values supplied for input variables, keyed by module instance address
/// (`""` for the root module) and then by variable name.
///
/// A missing module instance entry means nothing was supplied for that
/// instance; a missing variable entry means no value was supplied for that
/// variable. An explicit null is a supplied value.
pub type VariableValues = BTreeMap<String, BTreeMap<String, Value>>;

/// Session metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ContextMeta {
    // Name of the active workspace.
    pub env: String,
    // Overrides the process working directory for `path.cwd` when not empty.
    pub original_working_dir: String,
}

impl Default for ContextMeta {
    fn default() -> Self {
        ContextMeta {
            env: "default".to_string(),
            original_working_dir: String::new(),
        }
    }
}

/// Evaluates expressions of one module instance.
///
/// Local values are resolved by evaluating their expressions recursively;
/// the call stack catches local values that depend on themselves.
#[derive(Debug, Clone)]
pub struct Evaluator {
    pub meta: Rc<ContextMeta>,
    pub module_path: ModuleInstance,
    pub config: Rc<Config>,
    pub variable_values: Rc<VariableValues>,
    pub call_stack: CallStack,
}

impl Evaluator {
    pub fn new(
        config: Rc<Config>,
        module_path: ModuleInstance,
        variable_values: Rc<VariableValues>,
        meta: Rc<ContextMeta>,
    ) -> Self {
        Evaluator {
            meta,
            module_path,
            config,
            variable_values,
            call_stack: CallStack::new(),
        }
    }

    pub fn evaluate_expr(&mut self, expr: &Expr, want: &Type) -> Result<(Value, Diagnostics)> {
        let mut data = EvaluationData { evaluator: self };
        Scope::new(&mut data).eval_expr(expr, want)
    }

    pub fn expand_block(&mut self, body: &Body, schema: &BodySchema) -> Result<(Body, Diagnostics)> {
        let mut data = EvaluationData { evaluator: self };
        Scope::new(&mut data).expand_block(body, schema)
    }
}

/// Resolves references against the configuration and variable values of an
/// [`Evaluator`].
pub struct EvaluationData<'a> {
    evaluator: &'a mut Evaluator,
}

impl Data for EvaluationData<'_> {
    fn static_validate_references(
        &self,
        _refs: &[Reference],
        _self_addr: Option<&Referenceable>,
        _source_addr: Option<&Referenceable>,
    ) -> Diagnostics {
        Diagnostics::new()
    }

    fn get_reference(&mut self, reference: &Reference) -> Result<(Value, Diagnostics)> {
        let range = &reference.source_range;
        match &reference.subject {
            Referenceable::InputVariable(name) => self.input_variable(name, range),
            Referenceable::LocalValue(name) => self.local_value(name, range),
            Referenceable::PathAttr(name) => self.path_attr(name, range),
            Referenceable::TerraformAttr(name) => Ok(self.terraform_attr(name, range)),
            Referenceable::CountAttr(_) => Ok((Value::Unknown(Type::Number), Diagnostics::new())),
            Referenceable::ForEachAttr(_) => Ok((DYNAMIC, Diagnostics::new())),
            Referenceable::OutputValue(_)
            | Referenceable::Resource { .. }
            | Referenceable::ModuleCall(_)
            | Referenceable::SelfRef => Ok((DYNAMIC, Diagnostics::new())),
        }
    }
}

/// The first candidate less than three edits away from `given`.
pub fn name_suggestion<'a>(given: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .into_iter()
        .find(|c| strsim::levenshtein(given, c) < 3)
}

fn error(kind: DiagnosticKind, summary: &str, detail: &str, range: &Span) -> Diagnostics {
    Diagnostic::error(kind, summary, detail, Some(range.clone())).into()
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

impl EvaluationData<'_> {
    fn module_config(&self, what: &str) -> Result<&Config> {
        let path = &self.evaluator.module_path;
        self.evaluator
            .config
            .descendent_for_instance(path)
            .ok_or_else(|| anyhow!("internal error: {what} read from {path}, which has no configuration"))
    }

    fn input_variable(&mut self, name: &str, range: &Span) -> Result<(Value, Diagnostics)> {
        let module = &self.module_config("input variable")?.module;
        let config = match module.variables.get(name) {
            Some(v) => v,
            None => {
                let suggestion = name_suggestion(name, module.variables.keys().map(String::as_str))
                    .map(String::from);
                let detail = match &suggestion {
                    Some(s) => format!(
                        "An input variable with the name {name:?} has not been declared. Did you mean {s:?}?"
                    ),
                    None => format!(
                        "An input variable with the name {name:?} has not been declared. This variable can be declared with a variable {name:?} {{}} block."
                    ),
                };
                let diags = error(
                    DiagnosticKind::UndeclaredSymbol { suggestion },
                    "Reference to undeclared input variable",
                    &detail,
                    range,
                );
                return Ok((DYNAMIC, diags));
            }
        };

        let vals = match self
            .evaluator
            .variable_values
            .get(&self.evaluator.module_path.to_string())
        {
            Some(vals) => vals,
            None => return Ok((Value::Unknown(config.ty.clone()), Diagnostics::new())),
        };

        // A required variable without a value stays unknown.
        let mut val = match (vals.get(name), &config.default) {
            (None, Some(default)) => default.clone(),
            (None, None) => Value::Unknown(config.ty.clone()),
            (Some(v), Some(default)) if v.is_null() && !config.nullable => default.clone(),
            (Some(v), _) => v.clone(),
        };

        if let Some(defaults) = &config.type_defaults {
            if !val.is_null() {
                val = defaults.apply(val);
            }
        }

        let mut diags = Diagnostics::new();
        val = match convert(&val, &config.constraint_type) {
            Ok(v) => v,
            Err(e) => {
                diags = error(
                    DiagnosticKind::TypeMismatch,
                    "Incorrect variable type",
                    &format!("The resolved value of variable {name:?} is not appropriate: {e}."),
                    &config.decl_range,
                );
                Value::Unknown(config.ty.clone())
            }
        };

        if config.sensitive {
            val = val.mark(Mark::Sensitive);
        }
        log::debug!("resolved var.{name}");
        Ok((val, diags))
    }

    fn local_value(&mut self, name: &str, range: &Span) -> Result<(Value, Diagnostics)> {
        let module = &self.module_config("local value")?.module;
        let expr = match module.locals.get(name) {
            Some(l) => l.expr.clone(),
            None => {
                let suggestion =
                    name_suggestion(name, module.locals.keys().map(String::as_str)).map(String::from);
                let detail = match &suggestion {
                    Some(s) => format!(
                        "A local value with the name {name:?} has not been declared. Did you mean {s:?}?"
                    ),
                    None => format!("A local value with the name {name:?} has not been declared."),
                };
                let diags = error(
                    DiagnosticKind::UndeclaredSymbol { suggestion },
                    "Reference to undeclared local value",
                    &detail,
                    range,
                );
                return Ok((DYNAMIC, diags));
            }
        };

        let reference = Reference::new(Referenceable::LocalValue(name.to_string()), range.clone());
        let diags = self.evaluator.call_stack.push(&reference);
        if diags.has_errors() {
            return Ok((DYNAMIC, diags));
        }

        let result = self.evaluator.evaluate_expr(&expr, &Type::Dynamic);
        self.evaluator.call_stack.pop()?;
        result
    }

    fn path_attr(&mut self, name: &str, range: &Span) -> Result<(Value, Diagnostics)> {
        let value = match name {
            "cwd" => {
                let wd = match self.evaluator.meta.original_working_dir.as_str() {
                    "" => std::env::current_dir(),
                    dir => std::path::absolute(dir),
                };
                match wd.and_then(std::path::absolute) {
                    Ok(wd) => Value::from(to_slash(&wd)),
                    Err(e) => {
                        let diags = error(
                            DiagnosticKind::System,
                            "Failed to get working directory",
                            &format!("System error: {e}"),
                            range,
                        );
                        return Ok((DYNAMIC, diags));
                    }
                }
            }
            "module" => {
                let module = &self.module_config("path.module")?.module;
                Value::from(to_slash(Path::new(&module.source_dir)))
            }
            "root" => Value::from(to_slash(Path::new(&self.evaluator.config.module.source_dir))),
            _ => {
                let suggestion =
                    name_suggestion(name, ["cwd", "module", "root"]).map(String::from);
                let detail = match &suggestion {
                    Some(s) => format!(
                        "The \"path\" object does not have an attribute named {name:?}. Did you mean {s:?}?"
                    ),
                    None => format!("The \"path\" object does not have an attribute named {name:?}."),
                };
                let diags = error(
                    DiagnosticKind::InvalidAttribute { suggestion },
                    "Invalid \"path\" attribute",
                    &detail,
                    range,
                );
                return Ok((DYNAMIC, diags));
            }
        };
        Ok((value, Diagnostics::new()))
    }

    fn terraform_attr(&mut self, name: &str, range: &Span) -> (Value, Diagnostics) {
        match name {
            "workspace" => (Value::from(self.evaluator.meta.env.as_str()), Diagnostics::new()),
            "env" => (
                DYNAMIC,
                error(
                    DiagnosticKind::DeprecatedAttribute,
                    "Invalid \"terraform\" attribute",
                    "The terraform.env attribute was deprecated and removed. Use terraform.workspace instead.",
                    range,
                ),
            ),
            _ => (
                DYNAMIC,
                error(
                    DiagnosticKind::InvalidAttribute { suggestion: None },
                    "Invalid \"terraform\" attribute",
                    &format!("The \"terraform\" object does not have an attribute named {name:?}."),
                    range,
                ),
            ),
        }
    }
}
