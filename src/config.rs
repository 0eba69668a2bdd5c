// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Declarations of a module and the tree of loaded modules.

use crate::addrs::*;
use crate::ast::*;
use crate::convert::convert;
use crate::diagnostics::*;
use crate::interpreter::eval_constant;
use crate::lexer::Span;
use crate::typeexpr::{type_constraint_with_defaults, Defaults};
use crate::types::Type;
use crate::value::{is_valid_identifier, Value};

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const BAD_IDENTIFIER_DETAIL: &str = "A name must start with a letter or underscore and may contain only letters, digits, underscores, and dashes.";

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub description: Option<String>,
    pub default: Option<Value>,
    // Type of the unknown value standing in for the variable.
    pub ty: Type,
    // Type supplied values are converted to; may have optional attributes.
    pub constraint_type: Type,
    pub type_defaults: Option<Defaults>,
    pub nullable: bool,
    pub sensitive: bool,
    pub decl_range: Span,
}

#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub expr: ExprRef,
    pub decl_range: Span,
}

#[derive(Debug, Clone)]
pub struct Output {
    pub name: String,
    pub description: Option<String>,
    pub expr: ExprRef,
    pub sensitive: bool,
    pub decl_range: Span,
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
    pub config: Body,
    pub count: Option<ExprRef>,
    pub for_each: Option<ExprRef>,
    pub decl_range: Span,
    pub type_range: Span,
}

#[derive(Debug, Clone)]
pub struct ModuleCall {
    pub name: String,
    pub source_addr: ModuleSource,
    pub source_addr_raw: String,
    // Arguments passed to the module, plus the meta-arguments.
    pub config: Body,
    pub count: Option<ExprRef>,
    pub for_each: Option<ExprRef>,
    pub decl_range: Span,
}

/// Meta-arguments of a module block, never passed to the module itself.
pub const MODULE_META_ARGUMENTS: [&str; 6] =
    ["source", "version", "providers", "depends_on", "count", "for_each"];

/// Which module calls the loader follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallModuleType {
    // Local and remote modules.
    #[default]
    All,
    Local,
    None,
}

impl FromStr for CallModuleType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(CallModuleType::All),
            "local" => Ok(CallModuleType::Local),
            "none" => Ok(CallModuleType::None),
            _ => bail!("{s} is invalid call module type. Allowed values are: all, local, none"),
        }
    }
}

impl fmt::Display for CallModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallModuleType::All => "all",
            CallModuleType::Local => "local",
            CallModuleType::None => "none",
        })
    }
}

impl Serialize for CallModuleType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CallModuleType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Declarations of a single module, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub source_dir: String,
    pub variables: BTreeMap<String, Variable>,
    pub locals: BTreeMap<String, Local>,
    pub outputs: BTreeMap<String, Output>,
    pub module_calls: BTreeMap<String, ModuleCall>,
    pub managed_resources: BTreeMap<String, Resource>,
    pub data_resources: BTreeMap<String, Resource>,
}

fn duplicate(summary: &str, detail: String, span: &Span) -> Diagnostic {
    Diagnostic::error(DiagnosticKind::Decode, summary, &detail, Some(span.clone()))
}

fn decode_error(summary: &str, detail: &str, span: &Span) -> Diagnostic {
    Diagnostic::error(DiagnosticKind::Decode, summary, detail, Some(span.clone()))
}

// Checks the labels of a block against the names it expects.
fn check_labels(block: &Block, names: &[&str], diags: &mut Diagnostics) -> bool {
    let expected = format!("{} labels ({})", names.len(), names.join(", "));
    if block.labels.len() < names.len() {
        diags.push(decode_error(
            &format!("Missing name for {}", block.type_name),
            &format!("All {} blocks must have {expected}.", block.type_name),
            &block.def_span,
        ));
        return false;
    }
    if block.labels.len() > names.len() {
        diags.push(decode_error(
            &format!("Extraneous label for {}", block.type_name),
            &format!("Only {expected} are expected for {} blocks.", block.type_name),
            &block.label_spans[names.len()],
        ));
        return false;
    }
    true
}

fn check_name(block: &Block, kind: &str, diags: &mut Diagnostics) -> bool {
    if is_valid_identifier(&block.labels[0]) {
        return true;
    }
    diags.push(decode_error(
        &format!("Invalid {kind} name"),
        BAD_IDENTIFIER_DETAIL,
        &block.label_spans[0],
    ));
    false
}

// Value of a constant attribute converted to `ty`.
fn constant(attr: &Attribute, ty: &Type, diags: &mut Diagnostics) -> Option<Value> {
    let (value, d) = eval_constant(&attr.expr);
    let failed = d.has_errors();
    diags.extend(d);
    if failed {
        return None;
    }
    match convert(&value, ty) {
        Ok(v) => Some(v),
        Err(e) => {
            diags.push(decode_error(
                "Unsuitable value type",
                &format!("Unsuitable value: {e}."),
                attr.expr.span(),
            ));
            None
        }
    }
}

fn constant_bool(body: &Body, name: &str, diags: &mut Diagnostics) -> Option<bool> {
    let attr = body.attribute(name)?;
    constant(attr, &Type::Bool, diags).and_then(|v| v.as_bool())
}

fn constant_string(body: &Body, name: &str, diags: &mut Diagnostics) -> Option<String> {
    let attr = body.attribute(name)?;
    constant(attr, &Type::String, diags).and_then(|v| v.as_str().map(String::from))
}

fn decode_variable(block: &Block, diags: &mut Diagnostics) -> Option<Variable> {
    if !check_labels(block, &["name"], diags) || !check_name(block, "variable", diags) {
        return None;
    }
    let body = &block.body;

    let (constraint_type, type_defaults) = match body.attribute("type") {
        Some(attr) => {
            let (ty, defaults, d) = type_constraint_with_defaults(&attr.expr);
            diags.extend(d);
            (ty, defaults)
        }
        None => (Type::Dynamic, None),
    };
    let mut v = Variable {
        name: block.labels[0].clone(),
        description: constant_string(body, "description", diags),
        default: None,
        ty: constraint_type.without_optional_attrs_deep(),
        constraint_type,
        type_defaults,
        nullable: constant_bool(body, "nullable", diags).unwrap_or(true),
        sensitive: constant_bool(body, "sensitive", diags).unwrap_or(false),
        decl_range: block.def_span.clone(),
    };

    if let Some(attr) = body.attribute("default") {
        let (mut value, d) = eval_constant(&attr.expr);
        let failed = d.has_errors();
        diags.extend(d);
        if !failed {
            if let Some(defaults) = &v.type_defaults {
                value = defaults.apply(value);
            }
            match convert(&value, &v.constraint_type) {
                Ok(value) => {
                    if value.is_null() && !v.nullable {
                        diags.push(decode_error(
                            "Invalid default value for variable",
                            "A null default value is not valid when nullable=false.",
                            attr.expr.span(),
                        ));
                    }
                    v.default = Some(value);
                }
                Err(e) => diags.push(decode_error(
                    "Invalid default value for variable",
                    &format!(
                        "This default value is not compatible with the variable's type constraint: {e}."
                    ),
                    attr.expr.span(),
                )),
            }
        }
    }
    Some(v)
}

fn decode_output(block: &Block, diags: &mut Diagnostics) -> Option<Output> {
    if !check_labels(block, &["name"], diags) || !check_name(block, "output", diags) {
        return None;
    }
    let body = &block.body;
    let expr = match body.attribute("value") {
        Some(attr) => attr.expr.clone(),
        None => {
            diags.push(decode_error(
                "Missing required argument",
                "The argument \"value\" is required, but no definition was found.",
                &block.def_span,
            ));
            return None;
        }
    };
    Some(Output {
        name: block.labels[0].clone(),
        description: constant_string(body, "description", diags),
        expr,
        sensitive: constant_bool(body, "sensitive", diags).unwrap_or(false),
        decl_range: block.def_span.clone(),
    })
}

fn decode_module_call(block: &Block, diags: &mut Diagnostics) -> Option<ModuleCall> {
    if !check_labels(block, &["name"], diags) || !check_name(block, "module", diags) {
        return None;
    }
    let body = &block.body;
    let attr = match body.attribute("source") {
        Some(attr) => attr,
        None => {
            diags.push(decode_error(
                "Missing required argument",
                "The argument \"source\" is required, but no definition was found.",
                &block.def_span,
            ));
            return None;
        }
    };
    let raw = constant(attr, &Type::String, diags)?.as_str()?.to_string();
    let source_addr = match ModuleSource::parse(&raw) {
        Ok(addr) => addr,
        Err(e) => {
            diags.push(decode_error(
                "Invalid module source address",
                &format!("Failed to parse module source address: {e}"),
                attr.expr.span(),
            ));
            return None;
        }
    };

    Some(ModuleCall {
        name: block.labels[0].clone(),
        source_addr,
        source_addr_raw: raw,
        config: body.clone(),
        count: body.attribute("count").map(|a| a.expr.clone()),
        for_each: body.attribute("for_each").map(|a| a.expr.clone()),
        decl_range: block.def_span.clone(),
    })
}

fn decode_resource(block: &Block, mode: ResourceMode, diags: &mut Diagnostics) -> Option<Resource> {
    if !check_labels(block, &["type", "name"], diags) {
        return None;
    }
    let kind = match mode {
        ResourceMode::Managed => "resource",
        ResourceMode::Data => "data source",
    };
    if !is_valid_identifier(&block.labels[1]) {
        diags.push(decode_error(
            &format!("Invalid {kind} name"),
            BAD_IDENTIFIER_DETAIL,
            &block.label_spans[1],
        ));
        return None;
    }
    let body = &block.body;
    Some(Resource {
        mode,
        type_name: block.labels[0].clone(),
        name: block.labels[1].clone(),
        config: body.clone(),
        count: body.attribute("count").map(|a| a.expr.clone()),
        for_each: body.attribute("for_each").map(|a| a.expr.clone()),
        decl_range: block.def_span.clone(),
        type_range: block.label_spans[0].clone(),
    })
}

impl Resource {
    /// Key of the resource within its module, e.g. `aws_instance.web`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.type_name, self.name)
    }
}

impl Module {
    /// Decodes the declarations of the files of one module directory.
    /// Blocks of other types are ignored.
    pub fn from_files(files: &[File], source_dir: &str) -> (Module, Diagnostics) {
        let mut module = Module {
            source_dir: source_dir.to_string(),
            ..Module::default()
        };
        let mut diags = Diagnostics::new();

        for file in files {
            for block in &file.body.blocks {
                match block.type_name.as_str() {
                    "variable" => {
                        if let Some(v) = decode_variable(block, &mut diags) {
                            module.add_variable(v, &mut diags);
                        }
                    }
                    "locals" => {
                        for attr in block.body.attributes.values() {
                            module.add_local(
                                Local {
                                    name: attr.name.clone(),
                                    expr: attr.expr.clone(),
                                    decl_range: attr.span.clone(),
                                },
                                &mut diags,
                            );
                        }
                    }
                    "output" => {
                        if let Some(o) = decode_output(block, &mut diags) {
                            module.add_output(o, &mut diags);
                        }
                    }
                    "module" => {
                        if let Some(mc) = decode_module_call(block, &mut diags) {
                            module.add_module_call(mc, &mut diags);
                        }
                    }
                    "resource" => {
                        if let Some(r) = decode_resource(block, ResourceMode::Managed, &mut diags) {
                            module.add_resource(r, &mut diags);
                        }
                    }
                    "data" => {
                        if let Some(r) = decode_resource(block, ResourceMode::Data, &mut diags) {
                            module.add_resource(r, &mut diags);
                        }
                    }
                    _ => (),
                }
            }
        }
        (module, diags)
    }

    fn add_variable(&mut self, v: Variable, diags: &mut Diagnostics) {
        if let Some(existing) = self.variables.get(&v.name) {
            diags.push(duplicate(
                "Duplicate variable declaration",
                format!(
                    "A variable named {:?} was already declared at {}. Variable names must be unique within a module.",
                    v.name, existing.decl_range
                ),
                &v.decl_range,
            ));
            return;
        }
        self.variables.insert(v.name.clone(), v);
    }

    fn add_local(&mut self, l: Local, diags: &mut Diagnostics) {
        if let Some(existing) = self.locals.get(&l.name) {
            diags.push(duplicate(
                "Duplicate local value definition",
                format!(
                    "A local value named {:?} was already defined at {}. Local value names must be unique within a module.",
                    l.name, existing.decl_range
                ),
                &l.decl_range,
            ));
            return;
        }
        self.locals.insert(l.name.clone(), l);
    }

    fn add_output(&mut self, o: Output, diags: &mut Diagnostics) {
        if let Some(existing) = self.outputs.get(&o.name) {
            diags.push(duplicate(
                "Duplicate output definition",
                format!(
                    "An output named {:?} was already defined at {}. Output names must be unique within a module.",
                    o.name, existing.decl_range
                ),
                &o.decl_range,
            ));
            return;
        }
        self.outputs.insert(o.name.clone(), o);
    }

    fn add_module_call(&mut self, mc: ModuleCall, diags: &mut Diagnostics) {
        if let Some(existing) = self.module_calls.get(&mc.name) {
            diags.push(duplicate(
                "Duplicate module call",
                format!(
                    "A module call named {:?} was already defined at {}. Module calls must have unique names within a module.",
                    mc.name, existing.decl_range
                ),
                &mc.decl_range,
            ));
            return;
        }
        self.module_calls.insert(mc.name.clone(), mc);
    }

    fn add_resource(&mut self, r: Resource, diags: &mut Diagnostics) {
        let (resources, kind) = match r.mode {
            ResourceMode::Managed => (&mut self.managed_resources, "resource"),
            ResourceMode::Data => (&mut self.data_resources, "data"),
        };
        let key = r.key();
        if let Some(existing) = resources.get(&key) {
            diags.push(duplicate(
                &format!("Duplicate {kind} {:?} configuration", r.type_name),
                format!(
                    "A {} {kind} named {:?} was already declared at {}. Resource names must be unique per type in each module.",
                    r.type_name, r.name, existing.decl_range
                ),
                &r.decl_range,
            ));
            return;
        }
        resources.insert(key, r);
    }
}

/// A module together with the modules it calls.
#[derive(Debug, Clone, Default)]
pub struct Config {
    // Module call names leading from the root module to this one.
    pub path: Vec<String>,
    pub module: Module,
    pub children: BTreeMap<String, Config>,
    // None for the root module.
    pub source_addr: Option<ModuleSource>,
}

impl Config {
    pub fn new(module: Module) -> Self {
        Config {
            module,
            ..Config::default()
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Descendent at the static module `path`, relative to this config.
    pub fn descendent(&self, path: &[String]) -> Option<&Config> {
        let mut current = self;
        for name in path {
            current = current.children.get(name)?;
        }
        Some(current)
    }

    pub fn descendent_for_instance(&self, instance: &ModuleInstance) -> Option<&Config> {
        self.descendent(&instance.module())
    }
}
