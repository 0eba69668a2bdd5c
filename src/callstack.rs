// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::addrs::Reference;
use crate::diagnostics::*;

use core::fmt;
use std::collections::BTreeMap;

use anyhow::{bail, Result};

/// Chain of references whose resolution is in progress.
///
/// Resolving a reference that is already in the chain means the
/// configuration refers to itself, e.g. `local.a -> local.b -> local.a`.
#[derive(Debug, Clone, Default)]
pub struct CallStack {
    addrs: BTreeMap<String, Reference>,
    stack: Vec<String>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts resolving `reference`. Returns a circular reference error when
    /// the reference is already being resolved; the stack is left unchanged in
    /// that case.
    pub fn push(&mut self, reference: &Reference) -> Diagnostics {
        let addr = reference.subject.to_string();

        if self.addrs.contains_key(&addr) {
            let chain = self.chain_with(&addr);
            log::debug!("circular reference: {chain}");
            return Diagnostic::error(
                DiagnosticKind::CircularReference {
                    chain: chain.clone(),
                },
                "circular reference found",
                &chain,
                Some(reference.source_range.clone()),
            )
            .into();
        }

        log::debug!("push {addr}");
        self.addrs.insert(addr.clone(), reference.clone());
        self.stack.push(addr);
        Diagnostics::new()
    }

    pub fn pop(&mut self) -> Result<()> {
        let addr = match self.stack.pop() {
            Some(addr) => addr,
            None => bail!("internal error: cannot pop from empty call stack"),
        };
        log::debug!("pop {addr}");
        self.addrs.remove(&addr);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.addrs.clear();
        self.stack.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    fn chain_with(&self, addr: &str) -> String {
        let mut chain = self.stack.clone();
        chain.push(addr.to_string());
        chain.join(" -> ")
    }
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stack.join(" -> "))
    }
}
