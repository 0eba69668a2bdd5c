// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp::Ordering;
use core::fmt::{self, Debug, Formatter};
use core::str::FromStr;

use anyhow::{bail, Result};
use serde::ser::Serializer;
use serde::Serialize;

const F64_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

/// Configuration language number. Integers stay exact as long as they fit
/// in an i64; everything else is a double.
#[derive(Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn from_float(f: f64) -> Number {
        if f.is_finite() && f.fract() == 0.0 && f.abs() <= F64_SAFE_INTEGER {
            Number::Int(f as i64)
        } else {
            Number::Float(f)
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(*i),
            Number::Float(f) if f.fract() == 0.0 && f.abs() <= F64_SAFE_INTEGER => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.as_i64().is_some()
    }

    pub fn add(&self, rhs: &Number) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_add(*b) {
                Some(v) => Number::Int(v),
                None => Number::Float(*a as f64 + *b as f64),
            },
            _ => Number::from_float(self.as_f64() + rhs.as_f64()),
        }
    }

    pub fn sub(&self, rhs: &Number) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_sub(*b) {
                Some(v) => Number::Int(v),
                None => Number::Float(*a as f64 - *b as f64),
            },
            _ => Number::from_float(self.as_f64() - rhs.as_f64()),
        }
    }

    pub fn mul(&self, rhs: &Number) -> Number {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => match a.checked_mul(*b) {
                Some(v) => Number::Int(v),
                None => Number::Float(*a as f64 * *b as f64),
            },
            _ => Number::from_float(self.as_f64() * rhs.as_f64()),
        }
    }

    pub fn divide(&self, rhs: &Number) -> Result<Number> {
        if rhs.as_f64() == 0.0 {
            bail!("can't divide by zero");
        }
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) if a.checked_rem(*b) == Some(0) => {
                Ok(Number::Int(a / b))
            }
            _ => Ok(Number::from_float(self.as_f64() / rhs.as_f64())),
        }
    }

    pub fn modulo(&self, rhs: &Number) -> Result<Number> {
        if rhs.as_f64() == 0.0 {
            bail!("can't use modulus with zero");
        }
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => Ok(Number::Int(a.checked_rem(*b).unwrap_or(0))),
            _ => Ok(Number::from_float(self.as_f64() % rhs.as_f64())),
        }
    }

    pub fn neg(&self) -> Number {
        match self {
            Number::Int(i) => match i.checked_neg() {
                Some(v) => Number::Int(v),
                None => Number::Float(-(*i as f64)),
            },
            Number::Float(f) => Number::Float(-f),
        }
    }

    pub fn abs(&self) -> Number {
        match self {
            Number::Int(i) if *i < 0 => self.neg(),
            Number::Float(f) => Number::Float(f.abs()),
            _ => *self,
        }
    }

    pub fn ceil(&self) -> Number {
        Number::from_float(self.as_f64().ceil())
    }

    pub fn floor(&self) -> Number {
        Number::from_float(self.as_f64().floor())
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::Int(n)
    }
}

impl From<usize> for Number {
    fn from(n: usize) -> Self {
        match i64::try_from(n) {
            Ok(i) => Number::Int(i),
            Err(_) => Number::Float(n as f64),
        }
    }
}

impl From<f64> for Number {
    fn from(n: f64) -> Self {
        Number::from_float(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseNumberError;

impl fmt::Display for ParseNumberError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a number is required")
    }
}

impl std::error::Error for ParseNumberError {}

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Number::Int(i));
        }
        match s.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Number::from_float(f)),
            _ => Err(ParseNumberError),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

impl Debug for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Number::Int(i) => serializer.serialize_i64(*i),
            Number::Float(f) => serializer.serialize_f64(*f),
        }
    }
}
