// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Addresses of the things an expression can refer to.

use crate::ast::*;
use crate::diagnostics::*;
use crate::lexer::Span;
use crate::value::Value;

use core::fmt;
use std::collections::BTreeSet;

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceMode {
    Managed,
    Data,
}

/// Something an expression can refer to.
///
/// The text form (`var.x`, `local.y`, `path.cwd`, ...) is used in diagnostics
/// and as the identity of a subject in the call stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Referenceable {
    InputVariable(String),
    LocalValue(String),
    OutputValue(String),
    PathAttr(String),
    TerraformAttr(String),
    CountAttr(String),
    ForEachAttr(String),
    Resource {
        mode: ResourceMode,
        type_name: String,
        name: String,
    },
    ModuleCall(String),
    SelfRef,
}

impl fmt::Display for Referenceable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Referenceable::InputVariable(n) => write!(f, "var.{n}"),
            Referenceable::LocalValue(n) => write!(f, "local.{n}"),
            Referenceable::OutputValue(n) => write!(f, "output.{n}"),
            Referenceable::PathAttr(n) => write!(f, "path.{n}"),
            Referenceable::TerraformAttr(n) => write!(f, "terraform.{n}"),
            Referenceable::CountAttr(n) => write!(f, "count.{n}"),
            Referenceable::ForEachAttr(n) => write!(f, "each.{n}"),
            Referenceable::Resource {
                mode: ResourceMode::Managed,
                type_name,
                name,
            } => write!(f, "{type_name}.{name}"),
            Referenceable::Resource {
                mode: ResourceMode::Data,
                type_name,
                name,
            } => write!(f, "data.{type_name}.{name}"),
            Referenceable::ModuleCall(n) => write!(f, "module.{n}"),
            Referenceable::SelfRef => f.write_str("self"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub subject: Referenceable,
    pub source_range: Span,
}

fn invalid_reference(detail: &str, span: &Span) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::InvalidReference,
        "Invalid reference",
        detail,
        Some(span.clone()),
    )
}

impl Reference {
    pub fn new(subject: Referenceable, source_range: Span) -> Self {
        Reference {
            subject,
            source_range,
        }
    }

    /// Reference named by the leading steps of `root.steps...`.
    pub fn from_traversal(
        root: &str,
        steps: &[TraversalStep],
        span: &Span,
    ) -> Result<Reference, Diagnostic> {
        let attr = |idx: usize| match steps.get(idx) {
            Some(TraversalStep::Attr { name, span }) => Some((name.clone(), span.clone())),
            _ => None,
        };
        // Range covering the root and the first `n` steps.
        let range = |n: usize| match steps.get(n.max(1) - 1) {
            Some(step) if n > 0 => span.to(step.span()),
            _ => span.clone(),
        };

        let single = |make: fn(String) -> Referenceable| match attr(0) {
            Some((name, _)) => Ok(Reference::new(make(name), range(1))),
            None if steps.is_empty() => Err(invalid_reference(
                &format!(
                    "The {root:?} object cannot be accessed directly. Instead, access one of its attributes."
                ),
                span,
            )),
            None => Err(invalid_reference(
                &format!("The {root:?} object does not support this operation."),
                span,
            )),
        };

        match root {
            "var" => single(Referenceable::InputVariable),
            "local" => single(Referenceable::LocalValue),
            "path" => single(Referenceable::PathAttr),
            "terraform" => single(Referenceable::TerraformAttr),
            "module" => single(Referenceable::ModuleCall),
            "count" => match attr(0) {
                Some((name, _)) if name == "index" => {
                    Ok(Reference::new(Referenceable::CountAttr(name), range(1)))
                }
                Some((name, name_span)) => Err(Diagnostic::error(
                    DiagnosticKind::InvalidReference,
                    "Invalid \"count\" attribute",
                    &format!(
                        "The \"count\" object does not have an attribute named {name:?}. The only supported attribute is count.index, which is the index of each instance of a resource block that has the \"count\" argument set."
                    ),
                    Some(name_span),
                )),
                None => single(Referenceable::CountAttr),
            },
            "each" => match attr(0) {
                Some((name, _)) if name == "key" || name == "value" => {
                    Ok(Reference::new(Referenceable::ForEachAttr(name), range(1)))
                }
                Some((name, name_span)) => Err(Diagnostic::error(
                    DiagnosticKind::InvalidReference,
                    "Invalid \"each\" attribute",
                    &format!(
                        "The \"each\" object does not have an attribute named {name:?}. The supported attributes are each.key and each.value, the current key and value pair of the \"for_each\" attribute set."
                    ),
                    Some(name_span),
                )),
                None => single(Referenceable::ForEachAttr),
            },
            "self" => Ok(Reference::new(Referenceable::SelfRef, span.clone())),
            "data" => match (attr(0), attr(1)) {
                (Some((type_name, _)), Some((name, _))) => Ok(Reference::new(
                    Referenceable::Resource {
                        mode: ResourceMode::Data,
                        type_name,
                        name,
                    },
                    range(2),
                )),
                _ => Err(invalid_reference(
                    "The \"data\" object must be followed by two attribute names: the data source type and the resource name.",
                    span,
                )),
            },
            type_name => match attr(0) {
                Some((name, _)) => Ok(Reference::new(
                    Referenceable::Resource {
                        mode: ResourceMode::Managed,
                        type_name: type_name.to_string(),
                        name,
                    },
                    range(1),
                )),
                None => Err(invalid_reference(
                    "A reference to a resource type must be followed by at least one attribute access, specifying the resource name.",
                    span,
                )),
            },
        }
    }
}

/// References made by `expr`. Names bound by `for` expressions and the
/// names in `bound` are not references.
pub fn references_in_expr(expr: &Expr, bound: &[String]) -> (Vec<Reference>, Diagnostics) {
    let mut collector = ReferenceCollector {
        bound: bound.iter().cloned().collect(),
        refs: vec![],
        diags: Diagnostics::new(),
    };
    collector.visit(expr);
    (collector.refs, collector.diags)
}

struct ReferenceCollector {
    bound: BTreeSet<String>,
    refs: Vec<Reference>,
    diags: Diagnostics,
}

impl ReferenceCollector {
    fn visit(&mut self, expr: &Expr) {
        use Expr::*;
        match expr {
            Literal { .. } => (),
            ScopeTraversal { span, root, steps } => {
                if self.bound.contains(root) {
                    return;
                }
                match Reference::from_traversal(root, steps, span) {
                    Ok(r) => self.refs.push(r),
                    Err(d) => self.diags.push(d),
                }
            }
            Template { parts, .. } => {
                for part in parts {
                    if let TemplatePart::Interp(e) = part {
                        self.visit(e);
                    }
                }
            }
            RelativeTraversal { source, .. } | Splat { source, .. } => self.visit(source),
            Index {
                collection, key, ..
            } => {
                self.visit(collection);
                self.visit(key);
            }
            Tuple { items, .. } => items.iter().for_each(|i| self.visit(i)),
            Object { items, .. } => {
                for (key, value) in items {
                    if let ObjectKey::Expr(k) = key {
                        self.visit(k);
                    }
                    self.visit(value);
                }
            }
            FunctionCall { args, .. } => args.iter().for_each(|a| self.visit(a)),
            Unary { expr, .. } | Parens { expr, .. } => self.visit(expr),
            Binary { lhs, rhs, .. } => {
                self.visit(lhs);
                self.visit(rhs);
            }
            Conditional {
                cond,
                true_expr,
                false_expr,
                ..
            } => {
                self.visit(cond);
                self.visit(true_expr);
                self.visit(false_expr);
            }
            For {
                key_var,
                value_var,
                collection,
                key_expr,
                value_expr,
                cond,
                ..
            } => {
                self.visit(collection);

                let saved = self.bound.clone();
                if let Some(k) = key_var {
                    self.bound.insert(k.clone());
                }
                self.bound.insert(value_var.clone());
                if let Some(k) = key_expr {
                    self.visit(k);
                }
                self.visit(value_expr);
                if let Some(c) = cond {
                    self.visit(c);
                }
                self.bound = saved;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstanceKey {
    None,
    Int(i64),
    String(String),
}

impl InstanceKey {
    pub fn from_value(val: &Value) -> Result<InstanceKey> {
        match val {
            Value::Null(_) => Ok(InstanceKey::None),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(InstanceKey::Int(i)),
                None => bail!("instance key must be a whole number, not {n}"),
            },
            Value::String(s) => Ok(InstanceKey::String(s.to_string())),
            v => bail!("instance key must be a number or a string, not {}", v.ty()),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::None => Ok(()),
            InstanceKey::Int(i) => write!(f, "[{i}]"),
            InstanceKey::String(s) => write!(f, "[{s:?}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleInstanceStep {
    pub name: String,
    pub key: InstanceKey,
}

/// Path from the root module to one instance of a module. The root module
/// instance has no steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleInstance(pub Vec<ModuleInstanceStep>);

impl ModuleInstance {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: &str, key: InstanceKey) -> ModuleInstance {
        let mut steps = self.0.clone();
        steps.push(ModuleInstanceStep {
            name: name.to_string(),
            key,
        });
        ModuleInstance(steps)
    }

    /// Static module path, with the instance keys dropped.
    pub fn module(&self) -> Vec<String> {
        self.0.iter().map(|s| s.name.clone()).collect()
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, step) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            write!(f, "module.{}{}", step.name, step.key)?;
        }
        Ok(())
    }
}

/// Where a module call finds its module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    // A relative path such as `./modules/vpc`.
    Local(String),
    // `[host/]namespace/name/provider[//subdir]`.
    Registry(String),
    // Any address the module installer understands, e.g. git or https.
    Remote(String),
}

const LOCAL_SOURCE_PREFIXES: [&str; 4] = ["./", "../", ".\\", "..\\"];

impl ModuleSource {
    pub fn parse(raw: &str) -> Result<ModuleSource> {
        if raw.is_empty() {
            bail!("a module source address must not be empty");
        }
        if LOCAL_SOURCE_PREFIXES.iter().any(|p| raw.starts_with(p)) {
            return Ok(ModuleSource::Local(raw.replace('\\', "/")));
        }
        if raw.starts_with('/') || std::path::Path::new(raw).is_absolute() {
            bail!(
                "absolute module paths are not supported; use a relative path prefixed with \"./\""
            );
        }
        if is_registry_address(raw) {
            return Ok(ModuleSource::Registry(raw.to_string()));
        }
        Ok(ModuleSource::Remote(raw.to_string()))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ModuleSource::Local(_))
    }
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::Local(s) | ModuleSource::Registry(s) | ModuleSource::Remote(s) => {
                f.write_str(s)
            }
        }
    }
}

fn is_registry_address(raw: &str) -> bool {
    if raw.contains("::") || raw.contains("://") || raw.contains('?') {
        return false;
    }
    let package = match raw.split_once("//") {
        Some((package, _subdir)) => package,
        None => raw,
    };
    let parts: Vec<&str> = package.split('/').collect();
    let is_name = |s: &&str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };
    match parts.as_slice() {
        [host, rest @ ..] if rest.len() == 3 => {
            host.contains('.')
                && !matches!(*host, "github.com" | "bitbucket.org")
                && rest.iter().all(is_name)
        }
        [first, ..] if parts.len() == 3 => !first.contains('.') && parts.iter().all(is_name),
        _ => false,
    }
}
