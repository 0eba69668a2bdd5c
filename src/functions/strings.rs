// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::functions::utils::*;
use crate::functions::Function;
use crate::types::Type;
use crate::value::{quote_string, Value};

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, bail, Result};
use regex::Regex;

pub fn register(m: &mut HashMap<&'static str, Function>) {
    m.insert("chomp", Function::fixed(chomp, 1, Type::String));
    m.insert("endswith", Function::fixed(endswith, 2, Type::Bool));
    m.insert("format", Function::variadic(format, 1, Type::String));
    m.insert("join", Function::variadic(join, 2, Type::String));
    m.insert("lower", Function::fixed(lower, 1, Type::String));
    m.insert("regex", Function::fixed(regex, 2, Type::Dynamic));
    m.insert("regexall", Function::fixed(regexall, 2, Type::list(Type::Dynamic)));
    m.insert("replace", Function::fixed(replace, 3, Type::String));
    m.insert("split", Function::fixed(split, 2, Type::list(Type::String)));
    m.insert("startswith", Function::fixed(startswith, 2, Type::Bool));
    m.insert("strrev", Function::fixed(strrev, 1, Type::String));
    m.insert("substr", Function::fixed(substr, 3, Type::String));
    m.insert("title", Function::fixed(title, 1, Type::String));
    m.insert("trim", Function::fixed(trim, 2, Type::String));
    m.insert("trimprefix", Function::fixed(trimprefix, 2, Type::String));
    m.insert("trimspace", Function::fixed(trimspace, 1, Type::String));
    m.insert("trimsuffix", Function::fixed(trimsuffix, 2, Type::String));
    m.insert("upper", Function::fixed(upper, 1, Type::String));
}

fn chomp(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    Ok(Value::from(s.trim_end_matches(['\n', '\r'])))
}

fn endswith(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    let suffix = ensure_string(&args[1])?;
    Ok(Value::Bool(s.ends_with(&suffix)))
}

fn startswith(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    let prefix = ensure_string(&args[1])?;
    Ok(Value::Bool(s.starts_with(&prefix)))
}

fn lower(args: &[Value]) -> Result<Value> {
    Ok(Value::from(ensure_string(&args[0])?.to_lowercase()))
}

fn upper(args: &[Value]) -> Result<Value> {
    Ok(Value::from(ensure_string(&args[0])?.to_uppercase()))
}

fn title(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    Ok(Value::from(out))
}

fn strrev(args: &[Value]) -> Result<Value> {
    Ok(Value::from(ensure_string(&args[0])?.chars().rev().collect::<String>()))
}

fn trim(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    let cutset: Vec<char> = ensure_string(&args[1])?.chars().collect();
    Ok(Value::from(s.trim_matches(cutset.as_slice())))
}

fn trimprefix(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    let prefix = ensure_string(&args[1])?;
    Ok(Value::from(s.strip_prefix(prefix.as_str()).unwrap_or(&s)))
}

fn trimsuffix(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    let suffix = ensure_string(&args[1])?;
    Ok(Value::from(s.strip_suffix(suffix.as_str()).unwrap_or(&s)))
}

fn trimspace(args: &[Value]) -> Result<Value> {
    Ok(Value::from(ensure_string(&args[0])?.trim()))
}

fn join(args: &[Value]) -> Result<Value> {
    let sep = ensure_string(&args[0])?;
    let mut parts = vec![];
    for (idx, list) in args[1..].iter().enumerate() {
        for item in ensure_sequence(list)? {
            if item.is_null() {
                bail!("element {idx} of list is null; cannot concatenate null values");
            }
            parts.push(ensure_string(item)?);
        }
    }
    Ok(Value::from(parts.join(sep.as_str())))
}

fn split(args: &[Value]) -> Result<Value> {
    let sep = ensure_string(&args[0])?;
    let s = ensure_string(&args[1])?;
    let parts: Vec<String> = match sep.is_empty() {
        true => s.chars().map(String::from).collect(),
        false => s.split(sep.as_str()).map(String::from).collect(),
    };
    Ok(string_list(parts))
}

// A substring wrapped in forward slashes is a regular expression.
fn as_pattern(s: &str) -> Option<&str> {
    match s.len() > 1 && s.starts_with('/') && s.ends_with('/') {
        true => Some(&s[1..s.len() - 1]),
        false => None,
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| anyhow!("invalid regular expression {pattern:?}: {e}"))
}

fn replace(args: &[Value]) -> Result<Value> {
    let s = ensure_string(&args[0])?;
    let substr = ensure_string(&args[1])?;
    let replacement = ensure_string(&args[2])?;
    match as_pattern(&substr) {
        Some(pattern) => {
            let re = compile(pattern)?;
            Ok(Value::from(re.replace_all(&s, replacement.as_str()).to_string()))
        }
        None => Ok(Value::from(s.replace(&substr, &replacement))),
    }
}

fn captures_value(re: &Regex, caps: &regex::Captures<'_>) -> Value {
    let names: Vec<Option<&str>> = re.capture_names().skip(1).collect();
    let group = |idx: usize| match caps.get(idx) {
        Some(m) => Value::from(m.as_str()),
        None => Value::Null(Type::String),
    };
    if names.is_empty() {
        return Value::from(caps.get(0).map(|m| m.as_str()).unwrap_or_default());
    }
    if names.iter().all(Option::is_some) {
        let mut attrs = BTreeMap::new();
        for (idx, name) in names.iter().enumerate() {
            if let Some(name) = name {
                attrs.insert(name.to_string(), group(idx + 1));
            }
        }
        return Value::object(attrs);
    }
    Value::list(Type::String, (1..=names.len()).map(group).collect())
}

fn regex(args: &[Value]) -> Result<Value> {
    let pattern = ensure_string(&args[0])?;
    let s = ensure_string(&args[1])?;
    let re = compile(&pattern)?;
    match re.captures(&s) {
        Some(caps) => Ok(captures_value(&re, &caps)),
        None => bail!("pattern did not match any part of the given string"),
    }
}

fn regexall(args: &[Value]) -> Result<Value> {
    let pattern = ensure_string(&args[0])?;
    let s = ensure_string(&args[1])?;
    let re = compile(&pattern)?;
    let matches: Vec<Value> = re
        .captures_iter(&s)
        .map(|caps| captures_value(&re, &caps))
        .collect();
    Ok(make_list(matches))
}

fn substr(args: &[Value]) -> Result<Value> {
    let chars: Vec<char> = ensure_string(&args[0])?.chars().collect();
    let offset = ensure_integer(&args[1])?;
    let length = ensure_integer(&args[2])?;
    let len = chars.len() as i64;

    let start = match offset {
        o if o < 0 => (len + o).max(0),
        o => o,
    };
    if start >= len {
        return Ok(Value::from(""));
    }
    let end = match length {
        -1 => len,
        l if l < -1 => bail!("length must be non-negative or -1"),
        l => start.saturating_add(l).min(len),
    };
    Ok(Value::from(
        chars[start as usize..end as usize].iter().collect::<String>(),
    ))
}

const MAX_FORMAT_WIDTH: usize = 1_000_000;

struct Verb {
    left_align: bool,
    zero_pad: bool,
    plus: bool,
    sharp: bool,
    width: Option<usize>,
    precision: Option<usize>,
    verb: char,
}

fn parse_verb(chars: &mut core::iter::Peekable<core::str::Chars<'_>>) -> Result<Verb> {
    let mut directive = Verb {
        left_align: false,
        zero_pad: false,
        plus: false,
        sharp: false,
        width: None,
        precision: None,
        verb: '%',
    };
    while let Some(c) = chars.peek() {
        match c {
            '-' => directive.left_align = true,
            '0' => directive.zero_pad = true,
            '+' => directive.plus = true,
            '#' => directive.sharp = true,
            ' ' => (),
            _ => break,
        }
        chars.next();
    }
    let digits = |chars: &mut core::iter::Peekable<core::str::Chars<'_>>| -> Result<Option<usize>> {
        let mut n: Option<usize> = None;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            n = match n.unwrap_or(0).checked_mul(10).and_then(|n| n.checked_add(d as usize)) {
                Some(n) if n <= MAX_FORMAT_WIDTH => Some(n),
                _ => bail!("width or precision must not exceed {MAX_FORMAT_WIDTH}"),
            };
            chars.next();
        }
        Ok(n)
    };
    directive.width = digits(&mut *chars)?;
    if chars.peek() == Some(&'.') {
        chars.next();
        directive.precision = Some(digits(&mut *chars)?.unwrap_or(0));
    }
    directive.verb = match chars.next() {
        Some(c) => c,
        None => bail!("unterminated format verb at end of string"),
    };
    Ok(directive)
}

fn pad(s: String, directive: &Verb) -> String {
    let width = match directive.width {
        Some(w) if w > s.chars().count() => w,
        _ => return s,
    };
    let fill = width - s.chars().count();
    match (directive.left_align, directive.zero_pad) {
        (true, _) => format!("{s}{}", " ".repeat(fill)),
        (false, true) => match s.strip_prefix('-') {
            Some(digits) => format!("-{}{digits}", "0".repeat(fill)),
            None => format!("{}{s}", "0".repeat(fill)),
        },
        (false, false) => format!("{}{s}", " ".repeat(fill)),
    }
}

fn format_arg(directive: &Verb, arg: &Value) -> Result<String> {
    let signed = |s: String, positive: bool| match directive.plus && positive {
        true => format!("+{s}"),
        false => s,
    };
    Ok(match directive.verb {
        'v' if directive.sharp => serde_json::to_string(&arg.to_json()?)?,
        'v' => match arg {
            Value::String(s) => s.to_string(),
            Value::Null(_) => "null".to_string(),
            v if v.is_sequence() || v.is_mapping() => serde_json::to_string(&v.to_json()?)?,
            v => ensure_string(v)?,
        },
        's' => ensure_string(arg)?,
        'q' => quote_string(&ensure_string(arg)?),
        't' => ensure_bool(arg)?.to_string(),
        'd' => {
            let n = ensure_number(arg)?;
            match n.as_i64() {
                Some(i) => signed(i.to_string(), i >= 0),
                None => bail!("value must be a whole number for %d"),
            }
        }
        'f' => {
            let n = ensure_number(arg)?.as_f64();
            signed(format!("{:.*}", directive.precision.unwrap_or(6), n), n >= 0.0)
        }
        'e' => {
            let n = ensure_number(arg)?.as_f64();
            signed(format!("{:.*e}", directive.precision.unwrap_or(6), n), n >= 0.0)
        }
        'x' | 'X' | 'o' | 'b' => {
            let i = ensure_integer(arg)?;
            match directive.verb {
                'x' => format!("{i:x}"),
                'X' => format!("{i:X}"),
                'o' => format!("{i:o}"),
                _ => format!("{i:b}"),
            }
        }
        c => bail!("unsupported format verb %{c}"),
    })
}

fn format(args: &[Value]) -> Result<Value> {
    let fmt = ensure_string(&args[0])?;
    let values = &args[1..];
    let mut next = 0;
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let directive = parse_verb(&mut chars)?;
        let arg = match values.get(next) {
            Some(a) => a,
            None => bail!(
                "not enough arguments for \"%{}\" at {}: need index {} but have {} total",
                directive.verb,
                out.chars().count(),
                next + 1,
                values.len()
            ),
        };
        if arg.is_null() && directive.verb != 'v' {
            bail!("unsupported value for \"%{}\" at {}: null value cannot be formatted", directive.verb, out.chars().count());
        }
        next += 1;
        out.push_str(&pad(format_arg(&directive, arg)?, &directive));
    }

    if next < values.len() {
        bail!("too many arguments; no verbs left for argument {}", next + 1);
    }
    Ok(Value::from(out))
}
