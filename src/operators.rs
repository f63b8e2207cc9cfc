//! Operator semantics for the interpreter
//!
//! Covers the JavaScript operators that survive CPS transformation: binary
//! arithmetic and comparison, unary operators, and property access on arrays
//! and strings. Arithmetic is only defined on numbers (with `+` also joining
//! strings); there are no implicit numeric coercions.

use crate::eval::{EvalError, Value};

pub fn binary(op: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
    use Value::*;

    match (op, left, right) {
        ("+", Number(a), Number(b)) => Ok(Number(a + b)),
        ("+", String(_), _) | ("+", _, String(_)) => Ok(Value::string(format!("{}{}", left, right))),
        ("-", Number(a), Number(b)) => Ok(Number(a - b)),
        ("*", Number(a), Number(b)) => Ok(Number(a * b)),
        ("/", Number(a), Number(b)) => Ok(Number(a / b)),
        ("%", Number(a), Number(b)) => Ok(Number(a % b)),

        ("==" | "===", _, _) => Ok(Bool(left == right)),
        ("!=" | "!==", _, _) => Ok(Bool(left != right)),

        ("<", Number(a), Number(b)) => Ok(Bool(a < b)),
        ("<=", Number(a), Number(b)) => Ok(Bool(a <= b)),
        (">", Number(a), Number(b)) => Ok(Bool(a > b)),
        (">=", Number(a), Number(b)) => Ok(Bool(a >= b)),
        ("<", String(a), String(b)) => Ok(Bool(a < b)),
        ("<=", String(a), String(b)) => Ok(Bool(a <= b)),
        (">", String(a), String(b)) => Ok(Bool(a > b)),
        (">=", String(a), String(b)) => Ok(Bool(a >= b)),

        ("+" | "-" | "*" | "/" | "%" | "<" | "<=" | ">" | ">=", _, _) => Err(EvalError::TypeError(format!(
            "cannot apply {} to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ))),
        _ => Err(EvalError::TypeError(format!("unknown binary operator {}", op))),
    }
}

pub fn unary(op: &str, value: &Value) -> Result<Value, EvalError> {
    match (op, value) {
        ("-", Value::Number(n)) => Ok(Value::Number(-n)),
        ("+", Value::Number(n)) => Ok(Value::Number(*n)),
        ("!", v) => Ok(Value::Bool(!v.is_truthy())),
        ("typeof", v) => Ok(Value::string(type_of(v))),
        ("void", _) => Ok(Value::Undefined),
        ("-" | "+", v) => Err(EvalError::TypeError(format!(
            "cannot apply unary {} to {}",
            op,
            v.type_name()
        ))),
        _ => Err(EvalError::TypeError(format!("unknown unary operator {}", op))),
    }
}

/// `typeof` as JavaScript reports it
fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null | Value::Array(_) | Value::Erp(_) => "object",
        other => other.type_name(),
    }
}

/// `object[key]`
pub fn member(object: &Value, key: &Value) -> Result<Value, EvalError> {
    match (object, key) {
        (Value::Undefined | Value::Null, _) => Err(EvalError::TypeError(format!(
            "cannot read property {} of {}",
            key, object
        ))),
        (Value::Array(items), Value::String(name)) if &**name == "length" => {
            Ok(Value::Number(items.len() as f64))
        }
        (Value::Array(items), Value::Number(n)) => Ok(index(*n, items.len())
            .map(|i| items[i].clone())
            .unwrap_or(Value::Undefined)),
        (Value::String(s), Value::String(name)) if &**name == "length" => {
            Ok(Value::Number(s.chars().count() as f64))
        }
        (Value::String(s), Value::Number(n)) => Ok(index(*n, usize::MAX)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::string(c.to_string()))
            .unwrap_or(Value::Undefined)),
        _ => Ok(Value::Undefined),
    }
}

fn index(n: f64, len: usize) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 && n < len as f64 {
        Some(n as usize)
    } else {
        None
    }
}
