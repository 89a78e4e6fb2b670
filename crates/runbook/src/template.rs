// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Aura Authors

//! `{{ expr }}` template rendering: dotted-path lookups plus a small,
//! closed set of filters (equality, comparison, `not`). No method calls,
//! no arbitrary evaluation — unknown identifiers are a hard error rather
//! than a silent empty substitution.

use indexmap::IndexMap;
use std::sync::LazyLock;
use thiserror::Error;

/// Pattern matching a `{{ ... }}` block, capturing its inner expression.
#[allow(clippy::expect_used)]
static EXPR_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\{\{\s*(.*?)\s*\}\}").expect("constant regex pattern is valid"));

/// A rendered value. Lists and maps let `loop` and `returns` carry
/// structured results through the grammar without a general evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn render_to_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(_) | Value::Map(_) => serde_json::to_string(&self.to_json()).unwrap_or_default(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::json!(f),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Value::Map(m) => {
                serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }

    /// Converts a rendered value back into JSON, for callers (the
    /// Execution Engine) that need to pass a rendered param or loop
    /// element on to code speaking `serde_json::Value`.
    pub fn into_json(self) -> serde_json::Value {
        self.to_json()
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
    #[error("invalid expression: {0}")]
    ParseError(String),
}

/// Resolves a dotted path (`inputs.name`, `steps.a.output.field`, `item`,
/// `loop.index`, ...) to a [`Value`]. Implemented by the execution context.
pub trait Scope {
    fn resolve(&self, path: &[&str]) -> Option<Value>;
}

/// Render every `{{ expr }}` block in `template` against `scope`.
///
/// If the entire (trimmed) template is a single `{{ expr }}` block, the
/// expression's native [`Value`] is preserved (so a `params` field bound
/// to `{{ inputs.items }}` gets a real list, not its string form).
/// Otherwise every block is stringified and spliced into the surrounding
/// literal text.
pub fn render(template: &str, scope: &dyn Scope) -> Result<Value, TemplateError> {
    if let Some(inner) = sole_expr(template) {
        return eval(&inner, scope);
    }

    let mut err = None;
    let rendered = EXPR_PATTERN.replace_all(template, |caps: &regex::Captures| {
        if err.is_some() {
            return String::new();
        }
        match eval(&caps[1], scope) {
            Ok(v) => v.render_to_string(),
            Err(e) => {
                err = Some(e);
                String::new()
            }
        }
    });
    if let Some(e) = err {
        return Err(e);
    }
    Ok(Value::Str(rendered.into_owned()))
}

/// Render a template that must produce a plain string (params, messages).
pub fn render_str(template: &str, scope: &dyn Scope) -> Result<String, TemplateError> {
    Ok(render(template, scope)?.render_to_string())
}

/// Render a `when` guard to a boolean.
pub fn render_bool(template: &str, scope: &dyn Scope) -> Result<bool, TemplateError> {
    Ok(render(template, scope)?.as_bool())
}

fn sole_expr(template: &str) -> Option<String> {
    let trimmed = template.trim();
    let caps = EXPR_PATTERN.captures(trimmed)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == trimmed.len() {
        Some(caps[1].to_string())
    } else {
        None
    }
}

fn eval(expr: &str, scope: &dyn Scope) -> Result<Value, TemplateError> {
    let expr = expr.trim();
    if let Some(rest) = expr.strip_prefix("not ") {
        return Ok(Value::Bool(!eval(rest, scope)?.as_bool()));
    }

    for op in ["==", "!=", "<=", ">=", "<", ">"] {
        if let Some(idx) = find_operator(expr, op) {
            let lhs = eval_operand(expr[..idx].trim(), scope)?;
            let rhs = eval_operand(expr[idx + op.len()..].trim(), scope)?;
            return Ok(Value::Bool(compare(op, &lhs, &rhs)?));
        }
    }

    eval_operand(expr, scope)
}

/// Finds `op` outside of any quoted literal, so e.g. `"a==b"` is not split.
fn find_operator(expr: &str, op: &str) -> Option<usize> {
    let bytes = expr.as_bytes();
    let mut in_quote: Option<u8> = None;
    let mut i = 0;
    while i + op.len() <= bytes.len() {
        let c = bytes[i];
        match in_quote {
            Some(q) if c == q => in_quote = None,
            Some(_) => {}
            None if c == b'\'' || c == b'"' => in_quote = Some(c),
            None if expr[i..].starts_with(op) => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

fn eval_operand(token: &str, scope: &dyn Scope) -> Result<Value, TemplateError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(TemplateError::ParseError("empty operand".into()));
    }
    if let Some(lit) = parse_literal(token) {
        return Ok(lit);
    }
    let path: Vec<&str> = token.split('.').collect();
    scope
        .resolve(&path)
        .ok_or_else(|| TemplateError::UnknownIdentifier(token.to_string()))
}

fn parse_literal(token: &str) -> Option<Value> {
    match token {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" => return Some(Value::Null),
        _ => {}
    }
    if (token.starts_with('\'') && token.ends_with('\'') && token.len() >= 2)
        || (token.starts_with('"') && token.ends_with('"') && token.len() >= 2)
    {
        return Some(Value::Str(token[1..token.len() - 1].to_string()));
    }
    if let Ok(i) = token.parse::<i64>() {
        return Some(Value::Int(i));
    }
    if let Ok(f) = token.parse::<f64>() {
        return Some(Value::Float(f));
    }
    None
}

fn compare(op: &str, lhs: &Value, rhs: &Value) -> Result<bool, TemplateError> {
    if op == "==" {
        return Ok(values_eq(lhs, rhs));
    }
    if op == "!=" {
        return Ok(!values_eq(lhs, rhs));
    }
    let (l, r) = match (numeric(lhs), numeric(rhs)) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            return Err(TemplateError::ParseError(format!(
                "cannot compare non-numeric values with {op}"
            )))
        }
    };
    Ok(match op {
        "<" => l < r,
        "<=" => l <= r,
        ">" => l > r,
        ">=" => l >= r,
        _ => unreachable!("operator set is exhaustive"),
    })
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn values_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        _ => lhs == rhs,
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
