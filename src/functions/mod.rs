// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builtin functions callable from expressions.

pub mod collections;
pub mod conversions;
pub mod encoding;
pub mod impure;
pub mod numbers;
pub mod sensitivity;
pub mod strings;
pub mod terraform;
pub mod utils;

use crate::types::Type;
use crate::value::{Marks, Value};

use std::collections::HashMap;

use anyhow::{bail, Result};
use lazy_static::lazy_static;

/// Implementation of a function. Arguments are unmarked and wholly known
/// unless the function opts out of that.
pub type FunctionFn = fn(&[Value]) -> Result<Value>;

#[derive(Clone)]
pub struct Function {
    pub func: FunctionFn,
    pub min_args: usize,
    // None for variadic functions.
    pub max_args: Option<usize>,
    // Type of the unknown result returned for unknown arguments.
    pub ret: Type,
    pub allow_unknown: bool,
    pub allow_marked: bool,
    pub impure: bool,
}

impl Function {
    pub fn fixed(func: FunctionFn, args: usize, ret: Type) -> Self {
        Self::new(func, args, Some(args), ret)
    }

    pub fn variadic(func: FunctionFn, min_args: usize, ret: Type) -> Self {
        Self::new(func, min_args, None, ret)
    }

    pub fn new(func: FunctionFn, min_args: usize, max_args: Option<usize>, ret: Type) -> Self {
        Function {
            func,
            min_args,
            max_args,
            ret,
            allow_unknown: false,
            allow_marked: false,
            impure: false,
        }
    }

    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn allow_marked(mut self) -> Self {
        self.allow_marked = true;
        self
    }

    pub fn impure(mut self) -> Self {
        self.impure = true;
        self
    }

    pub fn call(&self, args: &[Value], pure_only: bool) -> Result<Value> {
        if args.len() < self.min_args {
            bail!(
                "not enough arguments; at least {} expected, got {}",
                self.min_args,
                args.len()
            );
        }
        if let Some(max) = self.max_args {
            if args.len() > max {
                bail!("too many arguments; at most {max} expected, got {}", args.len());
            }
        }
        if self.impure && pure_only {
            return Ok(Value::Unknown(self.ret.clone()));
        }

        if self.allow_marked {
            if !self.allow_unknown && args.iter().any(|a| !a.is_wholly_known()) {
                let mut marks = Marks::new();
                args.iter().for_each(|a| marks.extend(a.unmark_deep().1));
                return Ok(Value::Unknown(self.ret.clone()).mark_with(marks));
            }
            return (self.func)(args);
        }

        let mut marks = Marks::new();
        let args: Vec<Value> = args
            .iter()
            .map(|a| {
                let (v, m) = a.unmark_deep();
                marks.extend(m);
                v
            })
            .collect();
        if !self.allow_unknown && args.iter().any(|a| !a.is_wholly_known()) {
            return Ok(Value::Unknown(self.ret.clone()).mark_with(marks));
        }
        Ok((self.func)(&args)?.mark_with(marks))
    }
}

#[rustfmt::skip]
lazy_static! {
    pub static ref FUNCTIONS: HashMap<&'static str, Function> = {
	let mut m: HashMap<&'static str, Function> = HashMap::new();

	collections::register(&mut m);
	conversions::register(&mut m);
	encoding::register(&mut m);
	impure::register(&mut m);
	numbers::register(&mut m);
	sensitivity::register(&mut m);
	strings::register(&mut m);
	terraform::register(&mut m);

	m
    };
}

/// Calls the function `name`. Returns None if there is no such function.
pub fn call(name: &str, args: &[Value], pure_only: bool) -> Option<Result<Value>> {
    FUNCTIONS.get(name).map(|f| f.call(args, pure_only))
}
