// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

/// Type of a configuration value.
///
/// `Dynamic` stands for "any type": it is the type of values whose type is
/// not known statically and, as a constraint, accepts a value of any type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Dynamic,
    Bool,
    Number,
    String,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Tuple(Vec<Type>),
    // Attribute types and the names of the optional attributes.
    Object(BTreeMap<String, Type>, BTreeSet<String>),
}

impl Type {
    pub fn list(ty: Type) -> Type {
        Type::List(Box::new(ty))
    }

    pub fn set(ty: Type) -> Type {
        Type::Set(Box::new(ty))
    }

    pub fn map(ty: Type) -> Type {
        Type::Map(Box::new(ty))
    }

    pub fn object(attrs: BTreeMap<String, Type>) -> Type {
        Type::Object(attrs, BTreeSet::new())
    }

    pub fn empty_object() -> Type {
        Type::object(BTreeMap::new())
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Number | Type::String)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Type::List(_) | Type::Set(_) | Type::Map(_))
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(e) | Type::Set(e) | Type::Map(e) => Some(e),
            _ => None,
        }
    }

    /// True if the type is, or contains, `Dynamic`.
    pub fn has_dynamic(&self) -> bool {
        match self {
            Type::Dynamic => true,
            Type::Bool | Type::Number | Type::String => false,
            Type::List(e) | Type::Set(e) | Type::Map(e) => e.has_dynamic(),
            Type::Tuple(items) => items.iter().any(Type::has_dynamic),
            Type::Object(attrs, _) => attrs.values().any(Type::has_dynamic),
        }
    }

    /// The same type with every optional attribute marker removed, at all
    /// nesting levels.
    pub fn without_optional_attrs_deep(&self) -> Type {
        match self {
            Type::List(e) => Type::list(e.without_optional_attrs_deep()),
            Type::Set(e) => Type::set(e.without_optional_attrs_deep()),
            Type::Map(e) => Type::map(e.without_optional_attrs_deep()),
            Type::Tuple(items) => {
                Type::Tuple(items.iter().map(Type::without_optional_attrs_deep).collect())
            }
            Type::Object(attrs, _) => Type::object(
                attrs
                    .iter()
                    .map(|(k, t)| (k.clone(), t.without_optional_attrs_deep()))
                    .collect(),
            ),
            t => t.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dynamic => f.write_str("dynamic"),
            Type::Bool => f.write_str("bool"),
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::List(e) => write!(f, "list of {e}"),
            Type::Set(e) => write!(f, "set of {e}"),
            Type::Map(e) => write!(f, "map of {e}"),
            Type::Tuple(_) => f.write_str("tuple"),
            Type::Object(_, _) => f.write_str("object"),
        }
    }
}
