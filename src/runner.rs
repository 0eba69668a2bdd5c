// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::addrs::{InstanceKey, ModuleInstance};
use crate::ast::*;
use crate::config::{Config, Module, MODULE_META_ARGUMENTS};
use crate::diagnostics::*;
use crate::evaluator::*;
use crate::scope::BodySchema;
use crate::types::Type;
use crate::value::Value;
use crate::Rc;

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};

/// Handle through which rules inspect one module instance.
///
/// A runner without an evaluator only gives access to the raw
/// configuration.
#[derive(Debug, Clone)]
pub struct Runner {
    pub config: Rc<Config>,
    pub module_path: ModuleInstance,
    evaluator: Option<Evaluator>,
}

impl Runner {
    /// Runner for the root module, evaluating with `variable_values`.
    ///
    /// The root module always has an entry in the table, so root variables
    /// without a supplied value take their defaults.
    pub fn new(config: Rc<Config>, mut variable_values: VariableValues, meta: ContextMeta) -> Self {
        variable_values.entry(String::new()).or_default();
        let evaluator = Evaluator::new(
            config.clone(),
            ModuleInstance::root(),
            Rc::new(variable_values),
            Rc::new(meta),
        );
        Runner {
            config,
            module_path: ModuleInstance::root(),
            evaluator: Some(evaluator),
        }
    }

    pub fn without_evaluator(config: Rc<Config>, module_path: ModuleInstance) -> Self {
        Runner {
            config,
            module_path,
            evaluator: None,
        }
    }

    pub fn has_evaluator(&self) -> bool {
        self.evaluator.is_some()
    }

    /// Declarations of this runner's module.
    pub fn module(&self) -> Result<&Module> {
        match self.config.descendent_for_instance(&self.module_path) {
            Some(c) => Ok(&c.module),
            None => bail!(
                "internal error: module {} has no configuration",
                self.module_path
            ),
        }
    }

    pub fn evaluate_expr(&mut self, expr: &Expr, want: &Type) -> Result<(Value, Diagnostics)> {
        match &mut self.evaluator {
            Some(evaluator) => evaluator.evaluate_expr(expr, want),
            None => bail!("internal error: evaluate_expr called without an evaluator"),
        }
    }

    /// Expands dynamic blocks. Without an evaluator the body is returned
    /// as is.
    pub fn expand_block(&mut self, body: &Body, schema: &BodySchema) -> Result<(Body, Diagnostics)> {
        match &mut self.evaluator {
            Some(evaluator) => evaluator.expand_block(body, schema),
            None => Ok((body.clone(), Diagnostics::new())),
        }
    }

    /// Runners for the modules called by this one.
    ///
    /// Calls using `count` or `for_each` and calls whose module was not
    /// loaded are skipped. The arguments of each call are evaluated here and
    /// become the variable values of the child.
    pub fn module_runners(&mut self) -> Result<(Vec<Runner>, Diagnostics)> {
        let config = self.config.clone();
        let current = config
            .descendent_for_instance(&self.module_path)
            .ok_or_else(|| {
                anyhow!(
                    "internal error: module {} has no configuration",
                    self.module_path
                )
            })?;

        let mut runners = vec![];
        let mut diags = Diagnostics::new();
        for (name, call) in &current.module.module_calls {
            let child = match current.children.get(name) {
                Some(child) => child,
                None => continue,
            };
            if call.count.is_some() || call.for_each.is_some() {
                log::debug!("module.{name} uses count or for_each; skipping");
                continue;
            }
            let child_path = self.module_path.child(name, InstanceKey::None);

            let evaluator = match &mut self.evaluator {
                Some(evaluator) => evaluator,
                None => {
                    runners.push(Runner::without_evaluator(config.clone(), child_path));
                    continue;
                }
            };

            let mut values = BTreeMap::new();
            for (arg, attr) in &call.config.attributes {
                if MODULE_META_ARGUMENTS.contains(&arg.as_str())
                    || !child.module.variables.contains_key(arg)
                {
                    continue;
                }
                let (value, d) = evaluator.evaluate_expr(&attr.expr, &Type::Dynamic)?;
                diags.extend(d);
                values.insert(arg.clone(), value);
            }

            let mut variable_values = evaluator.variable_values.as_ref().clone();
            variable_values.insert(child_path.to_string(), values);
            let child_evaluator = Evaluator::new(
                config.clone(),
                child_path.clone(),
                Rc::new(variable_values),
                evaluator.meta.clone(),
            );
            runners.push(Runner {
                config: config.clone(),
                module_path: child_path,
                evaluator: Some(child_evaluator),
            });
        }
        Ok((runners, diags))
    }
}
