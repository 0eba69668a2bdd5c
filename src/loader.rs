// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Loading of module directories and variable definition files.

use crate::addrs::ModuleSource;
use crate::ast::File;
use crate::config::*;
use crate::diagnostics::*;
use crate::evaluator::VariableValues;
use crate::interpreter::eval_constant;
use crate::lexer::Source;
use crate::parser::{parse_expression, parse_file};
use crate::types::Type;
use crate::value::Value;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

const MANIFEST_PATH: &str = ".terraform/modules/modules.json";

/// What the loader reads besides the root module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LoaderOptions {
    pub call_module_type: CallModuleType,
    // Extra variable definition files, relative to the root directory.
    pub var_files: Vec<String>,
    // `name=value` overrides, applied last.
    pub variables: Vec<String>,
}

impl LoaderOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestRecord {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Dir")]
    dir: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Manifest {
    #[serde(rename = "Modules", default)]
    modules: Vec<ManifestRecord>,
}

/// Reads a configuration tree from disk.
pub struct Loader {
    base_dir: PathBuf,
    options: LoaderOptions,
    // Installed remote modules, keyed by dot-separated module call path.
    installed: BTreeMap<String, PathBuf>,
}

fn read_sorted_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = vec![];
    for entry in std::fs::read_dir(dir).map_err(|e| anyhow!("failed to read {}: {e}", dir.display()))? {
        paths.push(entry?.path());
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

impl Loader {
    pub fn new<P: AsRef<Path>>(base_dir: P, options: LoaderOptions) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let mut installed = BTreeMap::new();

        let manifest_path = base_dir.join(MANIFEST_PATH);
        if manifest_path.is_file() {
            let contents = std::fs::read_to_string(&manifest_path)?;
            let manifest: Manifest = serde_json::from_str(&contents)
                .map_err(|e| anyhow!("failed to read {}: {e}", manifest_path.display()))?;
            for record in manifest.modules {
                if !record.key.is_empty() {
                    installed.insert(record.key, base_dir.join(record.dir));
                }
            }
            log::info!("{} installed modules found", installed.len());
        }

        Ok(Loader {
            base_dir,
            options,
            installed,
        })
    }

    /// Parses the `*.tf` files of `dir` in name order.
    pub fn load_module(&self, dir: &Path) -> Result<(Module, Diagnostics)> {
        let mut files: Vec<File> = vec![];
        for path in read_sorted_dir(dir)? {
            if path.is_file() && file_name(&path).ends_with(".tf") {
                log::info!("loading {}", path.display());
                files.push(parse_file(&Source::from_file(&path)?)?);
            }
        }
        Ok(Module::from_files(&files, &dir.to_string_lossy()))
    }

    /// Loads the root module and the modules it calls.
    pub fn load_config(&self) -> Result<(Config, Diagnostics)> {
        let (module, mut diags) = self.load_module(&self.base_dir)?;
        let mut config = Config::new(module);
        diags.extend(self.load_children(&mut config, &self.base_dir)?);
        Ok((config, diags))
    }

    fn load_children(&self, parent: &mut Config, dir: &Path) -> Result<Diagnostics> {
        let mut diags = Diagnostics::new();
        if self.options.call_module_type == CallModuleType::None {
            return Ok(diags);
        }

        let calls: Vec<ModuleCall> = parent.module.module_calls.values().cloned().collect();
        for call in calls {
            let mut path = parent.path.clone();
            path.push(call.name.clone());
            let key = path.join(".");

            let child_dir = match (&call.source_addr, self.options.call_module_type) {
                (ModuleSource::Local(rel), _) => dir.join(rel),
                (_, CallModuleType::All) => match self.installed.get(&key) {
                    Some(dir) => dir.clone(),
                    None => {
                        log::warn!(
                            "module {key} ({}) is not installed; skipping",
                            call.source_addr_raw
                        );
                        continue;
                    }
                },
                _ => continue,
            };
            if !child_dir.is_dir() {
                log::warn!(
                    "module {key}: directory {} does not exist; skipping",
                    child_dir.display()
                );
                continue;
            }

            let (module, d) = self.load_module(&child_dir)?;
            diags.extend(d);
            let mut child = Config {
                path,
                module,
                children: BTreeMap::new(),
                source_addr: Some(call.source_addr.clone()),
            };
            diags.extend(self.load_children(&mut child, &child_dir)?);
            parent.children.insert(call.name.clone(), child);
        }
        Ok(diags)
    }

    /// Values for the root module variables, from the automatically loaded
    /// definition files, then the extra files, then the overrides.
    pub fn load_variable_values(&self, config: &Config) -> Result<(VariableValues, Diagnostics)> {
        let mut files = vec![];
        for name in ["terraform.tfvars", "terraform.tfvars.json"] {
            let path = self.base_dir.join(name);
            if path.is_file() {
                files.push(path);
            }
        }
        for path in read_sorted_dir(&self.base_dir)? {
            let name = file_name(&path);
            if path.is_file() && (name.ends_with(".auto.tfvars") || name.ends_with(".auto.tfvars.json")) {
                files.push(path);
            }
        }
        files.extend(self.options.var_files.iter().map(|f| self.base_dir.join(f)));

        let mut values = BTreeMap::new();
        let mut diags = Diagnostics::new();
        for path in files {
            log::info!("loading variable values from {}", path.display());
            let (file_values, d) = match file_name(&path).ends_with(".json") {
                true => load_json_values(&path)?,
                false => load_tfvars(&path)?,
            };
            diags.extend(d);
            for (name, value) in file_values {
                if !config.module.variables.contains_key(&name) {
                    diags.push(undeclared_value(&name, &path.to_string_lossy()));
                    continue;
                }
                values.insert(name, value);
            }
        }

        for raw in &self.options.variables {
            let (name, value) = match raw.split_once('=') {
                Some((name, value)) if !name.is_empty() => (name, value),
                _ => {
                    diags.push(Diagnostic::error(
                        DiagnosticKind::Decode,
                        "Invalid -var option",
                        &format!(
                            "The given -var option {raw:?} is not correctly specified. Must be a variable name and value separated by an equals sign, like -var=\"key=value\"."
                        ),
                        None,
                    ));
                    continue;
                }
            };
            let variable = match config.module.variables.get(name) {
                Some(v) => v,
                None => {
                    diags.push(undeclared_value(name, "the command line"));
                    continue;
                }
            };
            let (value, d) = parse_override(name, value, &variable.constraint_type)?;
            diags.extend(d);
            values.insert(name.to_string(), value);
        }

        Ok((VariableValues::from([(String::new(), values)]), diags))
    }
}

fn undeclared_value(name: &str, origin: &str) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticKind::UndeclaredSymbol { suggestion: None },
        "Value for undeclared variable",
        &format!(
            "The root module does not declare a variable named {name:?} but a value was found in {origin}."
        ),
        None,
    )
}

// Unconstrained and primitive typed variables take the raw text; others
// are parsed as a constant expression.
fn parse_override(name: &str, raw: &str, ty: &Type) -> Result<(Value, Diagnostics)> {
    if matches!(ty, Type::Dynamic | Type::String | Type::Number | Type::Bool) {
        return Ok((Value::from(raw), Diagnostics::new()));
    }
    let source = Source::from_contents(format!("<value for var.{name}>"), raw.to_string())?;
    let expr = parse_expression(&source)?;
    Ok(eval_constant(&expr))
}

fn load_tfvars(path: &Path) -> Result<(BTreeMap<String, Value>, Diagnostics)> {
    let file = parse_file(&Source::from_file(path)?)?;
    let mut diags = Diagnostics::new();
    for block in &file.body.blocks {
        diags.push(Diagnostic::error(
            DiagnosticKind::Decode,
            "Unexpected block",
            &format!(
                "Blocks are not allowed in a variable definitions file; found {:?}.",
                block.type_name
            ),
            Some(block.def_span.clone()),
        ));
    }

    let mut values = BTreeMap::new();
    for (name, attr) in &file.body.attributes {
        let (value, d) = eval_constant(&attr.expr);
        let failed = d.has_errors();
        diags.extend(d);
        if !failed {
            values.insert(name.clone(), value);
        }
    }
    Ok((values, diags))
}

fn load_json_values(path: &Path) -> Result<(BTreeMap<String, Value>, Diagnostics)> {
    let contents = std::fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
    let fields = match json {
        serde_json::Value::Object(fields) => fields,
        _ => bail!(
            "{}: the root value of a variable definitions file must be an object",
            path.display()
        ),
    };
    let values = fields
        .iter()
        .map(|(k, v)| (k.clone(), Value::from_json(v)))
        .collect();
    Ok((values, Diagnostics::new()))
}
