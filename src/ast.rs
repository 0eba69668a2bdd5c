// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::lexer::*;
use crate::value::Value;
use crate::*;

use core::{cmp, fmt, ops::Deref};
use std::collections::BTreeMap;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        })
    }
}

pub struct NodeRef<T> {
    r: Rc<T>,
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T> cmp::PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.r).eq(&Rc::as_ptr(&other.r))
    }
}

impl<T> cmp::Eq for NodeRef<T> {}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.r
    }
}

impl<T> AsRef<T> for NodeRef<T> {
    fn as_ref(&self) -> &T {
        self.deref()
    }
}

impl<T> NodeRef<T> {
    pub fn new(t: T) -> Self {
        Self { r: Rc::new(t) }
    }
}

pub type Ref<T> = NodeRef<T>;

pub type ExprRef = Ref<Expr>;

/// A `.name` or `[key]` step following the root of a traversal.
#[derive(Debug, Clone)]
pub enum TraversalStep {
    Attr { span: Span, name: String },
    Index { span: Span, key: Value },
}

impl TraversalStep {
    pub fn span(&self) -> &Span {
        match self {
            TraversalStep::Attr { span, .. } | TraversalStep::Index { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Literal(String),
    Interp(ExprRef),
}

#[derive(Debug, Clone)]
pub enum ObjectKey {
    // A bare identifier, always taken literally.
    Name(Span, String),
    Expr(ExprRef),
}

#[derive(Debug)]
pub enum Expr {
    Literal {
        span: Span,
        value: Value,
    },
    Template {
        span: Span,
        parts: Vec<TemplatePart>,
    },
    ScopeTraversal {
        span: Span,
        root: String,
        steps: Vec<TraversalStep>,
    },
    RelativeTraversal {
        span: Span,
        source: ExprRef,
        steps: Vec<TraversalStep>,
    },
    Index {
        span: Span,
        collection: ExprRef,
        key: ExprRef,
    },
    Splat {
        span: Span,
        source: ExprRef,
        each: Vec<TraversalStep>,
    },
    Tuple {
        span: Span,
        items: Vec<ExprRef>,
    },
    Object {
        span: Span,
        items: Vec<(ObjectKey, ExprRef)>,
    },
    FunctionCall {
        span: Span,
        name: String,
        args: Vec<ExprRef>,
        expand_final: bool,
    },
    Unary {
        span: Span,
        op: UnaryOp,
        expr: ExprRef,
    },
    Binary {
        span: Span,
        op: BinaryOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    Conditional {
        span: Span,
        cond: ExprRef,
        true_expr: ExprRef,
        false_expr: ExprRef,
    },
    For {
        span: Span,
        key_var: Option<String>,
        value_var: String,
        collection: ExprRef,
        key_expr: Option<ExprRef>,
        value_expr: ExprRef,
        cond: Option<ExprRef>,
        group: bool,
    },
    Parens {
        span: Span,
        expr: ExprRef,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        use Expr::*;
        match self {
            Literal { span, .. }
            | Template { span, .. }
            | ScopeTraversal { span, .. }
            | RelativeTraversal { span, .. }
            | Index { span, .. }
            | Splat { span, .. }
            | Tuple { span, .. }
            | Object { span, .. }
            | FunctionCall { span, .. }
            | Unary { span, .. }
            | Binary { span, .. }
            | Conditional { span, .. }
            | For { span, .. }
            | Parens { span, .. } => span,
        }
    }

    /// The identifier of a single-name traversal such as `string` or `foo`.
    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            Expr::ScopeTraversal { root, steps, .. } if steps.is_empty() => Some(root.as_str()),
            Expr::Parens { expr, .. } => expr.as_keyword(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub span: Span,
    pub name_span: Span,
    pub name: String,
    pub expr: ExprRef,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub span: Span,
    // Covers the type and the labels, used to point at a block declaration.
    pub def_span: Span,
    pub type_name: String,
    pub labels: Vec<String>,
    pub label_spans: Vec<Span>,
    pub body: Body,
}

#[derive(Debug, Clone)]
pub struct Body {
    pub span: Span,
    pub attributes: BTreeMap<String, Attribute>,
    pub blocks: Vec<Block>,
}

impl Body {
    pub fn empty(span: Span) -> Body {
        Body {
            span,
            attributes: BTreeMap::new(),
            blocks: vec![],
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn blocks_of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Block> {
        self.blocks.iter().filter(move |b| b.type_name == type_name)
    }
}

#[derive(Debug, Clone)]
pub struct File {
    pub source: Source,
    pub body: Body,
}
