// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod addrs;
mod ast;
mod callstack;
mod config;
mod convert;
mod diagnostics;
mod evaluator;
mod functions;
mod interpreter;
mod lexer;
mod loader;
mod number;
mod parser;
mod runner;
mod scope;
mod typeexpr;
mod types;
mod value;

#[cfg(feature = "arc")]
pub(crate) use std::sync::Arc as Rc;
#[cfg(not(feature = "arc"))]
pub(crate) use std::rc::Rc;

pub use addrs::{
    InstanceKey, ModuleInstance, ModuleInstanceStep, ModuleSource, Reference, Referenceable,
    ResourceMode,
};
pub use callstack::CallStack;
pub use config::{
    CallModuleType, Config, Local, Module, ModuleCall, Output, Resource, Variable,
};
pub use convert::{convert, ConversionError};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use evaluator::{name_suggestion, ContextMeta, EvaluationData, Evaluator, VariableValues};
pub use loader::{Loader, LoaderOptions};
pub use number::Number;
pub use runner::Runner;
pub use scope::{BlockSchema, BodySchema, Data, Scope};
pub use typeexpr::Defaults;
pub use types::Type;
pub use value::{Mark, Marks, Value, DYNAMIC};

/// Items in `unstable` are likely to change.
pub mod unstable {
    pub use crate::addrs::references_in_expr;
    pub use crate::ast::*;
    pub use crate::interpreter::{eval_constant, values_equal, EvalContext, Interpreter};
    pub use crate::lexer::*;
    pub use crate::parser::*;
    pub use crate::typeexpr::{type_constraint, type_constraint_with_defaults};
}

#[cfg(test)]
mod tests;
