//! Prelude: the header program and the host primitive table
//!
//! The header is a direct-style program compiled ahead of user code. It
//! defines the sampling helpers built on the runtime's `sample`/`factor`:
//! - `flip(p)`, `randomInteger(n)`, `uniform(a, b)`, `discrete(weights)`
//! - `condition(b)` = `factor(b ? 0 : -Infinity)`
//!
//! Host primitives are ordinary functions (`plus`, `times`, `display`, ...)
//! that compiled programs reach through generated CPS wrappers.

use crate::ast::Node;
use crate::eval::{EvalError, Interpreter, Value};
use crate::operators;

/// The header program as ESTree JSON, embedded in the binary
pub const HEADER_SOURCE: &str = include_str!("../stdlib/header.json");

/// Parse the header program and return its statements
///
/// Parsed fresh on every call since `Node` holds `Rc` bodies and cannot be
/// cached in a static.
pub fn header_statements() -> Result<Vec<Node>, serde_json::Error> {
    match Node::from_json(HEADER_SOURCE)? {
        Node::Program { body } => Ok(body),
        other => Ok(vec![other]),
    }
}

/// Names the header program declares
pub fn header_names() -> Result<Vec<String>, serde_json::Error> {
    Ok(header_statements()?
        .iter()
        .filter_map(|stmt| match stmt {
            Node::VariableDeclaration { declarations, .. } => Some(declarations),
            _ => None,
        })
        .flatten()
        .map(|decl| decl.id.name.clone())
        .collect())
}

fn arg<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a Value, EvalError> {
    args.get(index).ok_or_else(|| {
        EvalError::InvalidArgument(format!("{} expects at least {} arguments", name, index + 1))
    })
}

fn number(name: &str, args: &[Value], index: usize) -> Result<f64, EvalError> {
    match arg(name, args, index)? {
        Value::Number(n) => Ok(*n),
        other => Err(EvalError::TypeError(format!(
            "{} expects a number, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn array<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a [Value], EvalError> {
    match arg(name, args, index)? {
        Value::Array(items) => Ok(&items[..]),
        other => Err(EvalError::TypeError(format!(
            "{} expects an array, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn fold(name: &'static str, op: &'static str, args: &[Value]) -> Result<Value, EvalError> {
    let (first, rest) = args.split_first().ok_or_else(|| {
        EvalError::InvalidArgument(format!("{} expects at least one argument", name))
    })?;
    rest.iter()
        .try_fold(first.clone(), |acc, v| operators::binary(op, &acc, v))
}

fn math(interp: &mut Interpreter, name: &'static str, f: fn(f64) -> f64) {
    interp.define_native(name, move |args| Ok(Value::Number(f(number(name, args, 0)?))));
}

fn compare(interp: &mut Interpreter, name: &'static str, op: &'static str) {
    interp.define_native(name, move |args| {
        operators::binary(op, arg(name, args, 0)?, arg(name, args, 1)?)
    });
}

/// Bind the host primitives and the default top-level continuation
pub fn install_host_primitives(interp: &mut Interpreter) {
    // Identity: the value handed to the top continuation is the run's result
    interp.define_native("topK", |args| Ok(args.first().cloned().unwrap_or(Value::Undefined)));

    interp.define_native("plus", |args| fold("plus", "+", args));
    interp.define_native("times", |args| fold("times", "*", args));
    compare(interp, "minus", "-");
    compare(interp, "div", "/");
    compare(interp, "mod", "%");

    compare(interp, "eq", "===");
    compare(interp, "neq", "!==");
    compare(interp, "lt", "<");
    compare(interp, "leq", "<=");
    compare(interp, "gt", ">");
    compare(interp, "geq", ">=");

    interp.define_native("and", |args| Ok(Value::Bool(args.iter().all(Value::is_truthy))));
    interp.define_native("or", |args| Ok(Value::Bool(args.iter().any(Value::is_truthy))));
    interp.define_native("not", |args| Ok(Value::Bool(!arg("not", args, 0)?.is_truthy())));
    interp.define_native("neg", |args| Ok(Value::Number(-number("neg", args, 0)?)));

    math(interp, "abs", f64::abs);
    math(interp, "log", f64::ln);
    math(interp, "exp", f64::exp);
    math(interp, "sqrt", f64::sqrt);
    interp.define_native("pow", |args| {
        Ok(Value::Number(number("pow", args, 0)?.powf(number("pow", args, 1)?)))
    });
    interp.define_native("min", |args| {
        Ok(Value::Number(number("min", args, 0)?.min(number("min", args, 1)?)))
    });
    interp.define_native("max", |args| {
        Ok(Value::Number(number("max", args, 0)?.max(number("max", args, 1)?)))
    });

    interp.define_native("list", |args| Ok(Value::array(args.to_vec())));
    interp.define_native("first", |args| {
        Ok(array("first", args, 0)?.first().cloned().unwrap_or(Value::Undefined))
    });
    interp.define_native("rest", |args| {
        Ok(Value::array(array("rest", args, 0)?.iter().skip(1).cloned().collect()))
    });
    interp.define_native("length", |args| Ok(Value::Number(array("length", args, 0)?.len() as f64)));
    interp.define_native("append", |args| {
        let mut items = Vec::new();
        for i in 0..args.len() {
            items.extend(array("append", args, i)?.iter().cloned());
        }
        Ok(Value::array(items))
    });

    interp.define_native("display", |args| {
        let line = args
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        println!("{}", line);
        Ok(Value::Undefined)
    });
}
