//! Trampolined interpreter for CPS programs
//!
//! Runs the output of [`crate::codegen::compile`] as well as plain
//! direct-style programs. A call in `return` position is never performed on
//! the native stack: it is handed back as a [`Tail`] and the driver loop in
//! [`Interpreter::call_value`] performs it. Continuation-passing code only
//! calls in tail position, so the native stack stays flat however long a
//! probabilistic program runs.
//!
//! `sample`, `factor`, `exit` and the inference entry points are
//! [`Builtin`]s. Applying one routes through the [`Runtime`]'s handler stack
//! and yields the next [`Tail`] to run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::{trace, warn};

use crate::ast::{LiteralValue, Node};
use crate::erp::{Bernoulli, Discrete, Erp, RandomInteger, Uniform};
use crate::infer::{Enumerate, Forward, ParticleFilter};
use crate::operators;
use crate::prelude;
use crate::runtime::{self, Runtime, RuntimeConfig};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("not callable: {0}")]
    NotCallable(String),
    #[error("unsupported syntax at runtime: {0}")]
    Unsupported(&'static str),
    #[error("cannot enumerate a distribution without finite support: {0}")]
    MissingSupport(String),
    #[error("factor is not allowed outside of a conditioning inference")]
    InvalidConditioning,
    #[error("every execution path has zero probability")]
    ZeroMarginal,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("step budget of {0} applications exceeded")]
    BudgetExceeded(u64),
}

// ============================================================================
// Values
// ============================================================================

/// Host function called with already-evaluated arguments
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, EvalError>>;

pub struct Native {
    pub name: String,
    pub func: NativeFn,
}

/// Runtime operations that take a continuation as their first argument
/// (`exit` takes only the final value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Sample,
    Factor,
    Exit,
    Enumerate,
    Forward,
    ParticleFilter,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::Sample,
        Builtin::Factor,
        Builtin::Exit,
        Builtin::Enumerate,
        Builtin::Forward,
        Builtin::ParticleFilter,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Sample => "sample",
            Builtin::Factor => "factor",
            Builtin::Exit => "exit",
            Builtin::Enumerate => "Enumerate",
            Builtin::Forward => "Forward",
            Builtin::ParticleFilter => "ParticleFilter",
        }
    }
}

pub struct Closure {
    pub name: Option<String>,
    pub params: Vec<Node>,
    pub body: Rc<Node>,
    pub env: Env,
}

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<[Value]>),
    Closure(Rc<Closure>),
    Native(Rc<Native>),
    Builtin(Builtin),
    Erp(Rc<dyn Erp>),
}

/// Hashable identity of a plain-data value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    String(Rc<str>),
    Array(Vec<ValueKey>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(items.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Closure(_) | Value::Native(_) | Value::Builtin(_) => "function",
            Value::Erp(_) => "erp",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Native(_) | Value::Builtin(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Key for grouping equal values; `None` for functions and ERPs
    pub fn key(&self) -> Option<ValueKey> {
        Some(match self {
            Value::Undefined => ValueKey::Undefined,
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            // -0 and 0 compare equal, as do all NaNs
            Value::Number(n) if *n == 0.0 => ValueKey::Number(0f64.to_bits()),
            Value::Number(n) if n.is_nan() => ValueKey::Number(f64::NAN.to_bits()),
            Value::Number(n) => ValueKey::Number(n.to_bits()),
            Value::String(s) => ValueKey::String(s.clone()),
            Value::Array(items) => {
                ValueKey::Array(items.iter().map(Value::key).collect::<Option<Vec<_>>>()?)
            }
            Value::Closure(_) | Value::Native(_) | Value::Builtin(_) | Value::Erp(_) => {
                return None
            }
        })
    }
}

impl From<&LiteralValue> for Value {
    fn from(lit: &LiteralValue) -> Self {
        match lit {
            LiteralValue::Null => Value::Null,
            LiteralValue::Bool(b) => Value::Bool(*b),
            LiteralValue::Number(n) => Value::Number(*n),
            LiteralValue::String(s) => Value::string(s),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Erp(a), Value::Erp(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

fn format_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        write!(f, "NaN")
    } else if n.is_infinite() {
        write!(f, "{}Infinity", if n < 0.0 { "-" } else { "" })
    } else {
        write!(f, "{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => format_number(f, *n),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Closure(c) => write!(f, "<function {}>", c.name.as_deref().unwrap_or("anonymous")),
            Value::Native(n) => write!(f, "<native {}>", n.name),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name()),
            Value::Erp(e) => write!(f, "<erp {}>", e.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            other => write!(f, "{}", other),
        }
    }
}

// ============================================================================
// Environments
// ============================================================================

pub type Env = Rc<RefCell<EnvInner>>;

#[derive(Default)]
pub struct EnvInner {
    bindings: HashMap<String, Value>,
    parent: Option<Env>,
}

impl EnvInner {
    pub fn new() -> Env {
        Rc::new(RefCell::new(EnvInner::default()))
    }

    pub fn with_parent(parent: &Env) -> Env {
        Rc::new(RefCell::new(EnvInner {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        }))
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match self.bindings.get(name) {
            Some(value) => Some(value.clone()),
            None => self.parent.as_ref().and_then(|p| p.borrow().get(name)),
        }
    }

    /// Update the nearest binding of `name`; false if none exists
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.bindings.get_mut(name) {
            *slot = value;
            return true;
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(name, value),
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.keys().cloned().collect();
        if let Some(parent) = &self.parent {
            names.extend(parent.borrow().names());
        }
        names
    }
}

/// Unlink a closure's environment if this was its last reference
fn release(value: Value, pending: &mut Vec<Env>) {
    if let Value::Closure(closure) = value {
        if let Ok(closure) = Rc::try_unwrap(closure) {
            pending.push(closure.env);
        }
    }
}

impl Drop for EnvInner {
    // Continuation chains are torn down iteratively; recursive drop glue
    // would need stack proportional to the chain length.
    fn drop(&mut self) {
        let mut pending: Vec<Env> = self.parent.take().into_iter().collect();
        for (_, value) in self.bindings.drain() {
            release(value, &mut pending);
        }
        while let Some(env) = pending.pop() {
            if let Ok(cell) = Rc::try_unwrap(env) {
                let mut inner = cell.into_inner();
                pending.extend(inner.parent.take());
                for (_, value) in inner.bindings.drain() {
                    release(value, &mut pending);
                }
            }
        }
    }
}

// ============================================================================
// Trampoline
// ============================================================================

/// A computation still to be performed
#[derive(Debug, Clone)]
pub enum Tail {
    /// Finished with a value
    Value(Value),
    /// Apply `func` to `args`
    Call { func: Value, args: Vec<Value> },
}

impl Tail {
    pub fn call(func: Value, args: Vec<Value>) -> Tail {
        Tail::Call { func, args }
    }
}

/// How a statement list finished
enum Completion {
    Normal(Value),
    Return(Tail),
}

pub struct Interpreter {
    global_env: Env,
    runtime: Runtime,
    steps: u64,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let global_env = EnvInner::new();
        {
            let mut env = global_env.borrow_mut();
            env.define("undefined", Value::Undefined);
            env.define("Infinity", Value::Number(f64::INFINITY));
            env.define("NaN", Value::Number(f64::NAN));
            for builtin in Builtin::ALL {
                env.define(builtin.name(), Value::Builtin(builtin));
            }
            let erps: [(&str, Rc<dyn Erp>); 4] = [
                ("bernoulliERP", Rc::new(Bernoulli)),
                ("randomIntegerERP", Rc::new(RandomInteger)),
                ("uniformERP", Rc::new(Uniform)),
                ("discreteERP", Rc::new(Discrete)),
            ];
            for (name, erp) in erps {
                env.define(name, Value::Erp(erp));
            }
        }
        let mut interp = Self {
            global_env,
            runtime: Runtime::new(config),
            steps: 0,
        };
        prelude::install_host_primitives(&mut interp);
        interp
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    /// Bind a global
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.global_env.borrow_mut().define(name, value);
    }

    /// Bind a host function as a global
    pub fn define_native(
        &mut self,
        name: &str,
        func: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static,
    ) {
        let native = Native {
            name: name.to_string(),
            func: Rc::new(func),
        };
        self.define(name, Value::Native(Rc::new(native)));
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.global_env.borrow().get(name)
    }

    pub fn global_names(&self) -> Vec<String> {
        self.global_env.borrow().names()
    }

    /// Number of applications performed by the current or last run
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run a program and return the value of its last statement
    ///
    /// On error every handler installed during the run is removed again.
    pub fn run(&mut self, program: &Node) -> Result<Value, EvalError> {
        let depth = self.runtime.depth();
        self.steps = 0;
        let env = self.global_env.clone();
        let result = self.run_toplevel(program, &env);
        if let Err(err) = &result {
            if self.runtime.depth() > depth {
                warn!(
                    error = %err,
                    handlers = self.runtime.depth() - depth,
                    "run failed; unwinding effect handlers"
                );
            }
            self.runtime.unwind_to(depth);
        }
        result
    }

    fn run_toplevel(&mut self, program: &Node, env: &Env) -> Result<Value, EvalError> {
        let statements = match program {
            Node::Program { body } => body.as_slice(),
            other => std::slice::from_ref(other),
        };
        match self.exec_statements(statements, env)? {
            Completion::Normal(value) => Ok(value),
            Completion::Return(tail) => self.finish(tail),
        }
    }

    /// Drive a pending computation to a value
    pub fn finish(&mut self, tail: Tail) -> Result<Value, EvalError> {
        match tail {
            Tail::Value(value) => Ok(value),
            Tail::Call { func, args } => self.call_value(func, args),
        }
    }

    /// Apply `func` and keep performing tail calls until a value comes back
    pub fn call_value(&mut self, func: Value, args: Vec<Value>) -> Result<Value, EvalError> {
        let mut func = func;
        let mut args = args;
        loop {
            match self.apply(func, args)? {
                Tail::Value(value) => return Ok(value),
                Tail::Call {
                    func: next,
                    args: next_args,
                } => {
                    func = next;
                    args = next_args;
                }
            }
        }
    }

    /// Perform one application, returning its tail computation
    fn apply(&mut self, func: Value, args: Vec<Value>) -> Result<Tail, EvalError> {
        self.steps += 1;
        if let Some(budget) = self.runtime.config().step_budget {
            if self.steps > budget {
                return Err(EvalError::BudgetExceeded(budget));
            }
        }

        match func {
            Value::Closure(closure) => self.apply_closure(closure, args),
            Value::Native(native) => Ok(Tail::Value((native.func)(&args)?)),
            Value::Builtin(builtin) => self.apply_builtin(builtin, args),
            other => Err(EvalError::NotCallable(format!(
                "{} ({})",
                other,
                other.type_name()
            ))),
        }
    }

    fn apply_closure(&mut self, closure: Rc<Closure>, args: Vec<Value>) -> Result<Tail, EvalError> {
        let env = EnvInner::with_parent(&closure.env);
        {
            let mut scope = env.borrow_mut();
            if let Some(name) = &closure.name {
                scope.define(name.clone(), Value::Closure(closure.clone()));
            }
            let mut args = args.into_iter();
            for param in &closure.params {
                match param {
                    Node::Identifier { name } => {
                        scope.define(name.clone(), args.next().unwrap_or(Value::Undefined));
                    }
                    Node::RestElement { argument } => {
                        let name = argument
                            .as_ident()
                            .ok_or(EvalError::Unsupported(argument.kind()))?;
                        scope.define(name, Value::array(args.by_ref().collect()));
                    }
                    other => return Err(EvalError::Unsupported(other.kind())),
                }
            }
        }

        let Node::BlockStatement { body } = closure.body.as_ref() else {
            return Err(EvalError::Unsupported(closure.body.kind()));
        };
        match self.exec_statements(body, &env)? {
            Completion::Normal(_) => Ok(Tail::Value(Value::Undefined)),
            Completion::Return(tail) => Ok(tail),
        }
    }

    fn apply_builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> Result<Tail, EvalError> {
        trace!(builtin = builtin.name(), "applying builtin");
        let mut args = args.into_iter();
        let first = args.next().unwrap_or(Value::Undefined);
        match builtin {
            Builtin::Exit => runtime::exit(&mut self.runtime, first),
            Builtin::Sample => {
                let erp = match args.next() {
                    Some(Value::Erp(erp)) => erp,
                    other => return Err(type_error("sample", "an ERP", other.as_ref())),
                };
                let params = match args.next() {
                    None | Some(Value::Undefined) => Vec::new(),
                    Some(Value::Array(items)) => items.to_vec(),
                    Some(other) => return Err(type_error("sample", "a parameter array", Some(&other))),
                };
                runtime::sample(&mut self.runtime, first, erp, params)
            }
            Builtin::Factor => {
                let score = match args.next() {
                    Some(Value::Number(score)) => score,
                    other => return Err(type_error("factor", "a numeric score", other.as_ref())),
                };
                runtime::factor(&mut self.runtime, first, score)
            }
            Builtin::Forward => {
                let thunk = expect_callable("Forward", args.next())?;
                Ok(Forward::start(&mut self.runtime, first, thunk))
            }
            Builtin::Enumerate => {
                let thunk = expect_callable("Enumerate", args.next())?;
                Ok(Enumerate::start(&mut self.runtime, first, thunk))
            }
            Builtin::ParticleFilter => {
                let thunk = expect_callable("ParticleFilter", args.next())?;
                let particles = match args.next() {
                    None | Some(Value::Undefined) => self.runtime.config().default_particles,
                    Some(Value::Number(n)) if n >= 1.0 && n.fract() == 0.0 && n.is_finite() => n as usize,
                    Some(other) => {
                        return Err(EvalError::InvalidArgument(format!(
                            "ParticleFilter expects a positive particle count, got {}",
                            other
                        )))
                    }
                };
                Ok(ParticleFilter::start(&mut self.runtime, first, thunk, particles))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn exec_statements(&mut self, statements: &[Node], env: &Env) -> Result<Completion, EvalError> {
        let mut last = Value::Undefined;
        for stmt in statements {
            match self.exec(stmt, env)? {
                Completion::Normal(value) => last = value,
                ret @ Completion::Return(_) => return Ok(ret),
            }
        }
        Ok(Completion::Normal(last))
    }

    fn exec(&mut self, stmt: &Node, env: &Env) -> Result<Completion, EvalError> {
        match stmt {
            Node::ExpressionStatement { expression } => {
                Ok(Completion::Normal(self.eval(expression, env)?))
            }
            Node::ReturnStatement { argument } => {
                let tail = match argument {
                    Some(arg) => self.eval_tail(arg, env)?,
                    None => Tail::Value(Value::Undefined),
                };
                Ok(Completion::Return(tail))
            }
            Node::VariableDeclaration { declarations, .. } => {
                for decl in declarations {
                    let value = match &decl.init {
                        Some(init) => self.eval(init, env)?,
                        None => Value::Undefined,
                    };
                    env.borrow_mut().define(decl.id.name.clone(), value);
                }
                Ok(Completion::Normal(Value::Undefined))
            }
            Node::BlockStatement { body } => self.exec_statements(body, env),
            Node::IfStatement {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.is_truthy() {
                    self.exec(consequent, env)
                } else if let Some(alt) = alternate {
                    self.exec(alt, env)
                } else {
                    Ok(Completion::Normal(Value::Undefined))
                }
            }
            other => Err(EvalError::Unsupported(other.kind())),
        }
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// Evaluate an expression in `return` position without growing the stack
    fn eval_tail(&mut self, expr: &Node, env: &Env) -> Result<Tail, EvalError> {
        match expr {
            Node::CallExpression { callee, arguments } => {
                let func = self.eval(callee, env)?;
                let args = self.eval_args(arguments, env)?;
                Ok(Tail::call(func, args))
            }
            Node::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.is_truthy() {
                    self.eval_tail(consequent, env)
                } else {
                    self.eval_tail(alternate, env)
                }
            }
            other => Ok(Tail::Value(self.eval(other, env)?)),
        }
    }

    fn eval(&mut self, expr: &Node, env: &Env) -> Result<Value, EvalError> {
        match expr {
            Node::Literal { value } => Ok(Value::from(value)),
            Node::Identifier { name } => env
                .borrow()
                .get(name)
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Node::FunctionExpression { id, params, body } => Ok(Value::Closure(Rc::new(Closure {
                name: id.as_ref().map(|id| id.name.clone()),
                params: params.clone(),
                body: body.clone(),
                env: env.clone(),
            }))),
            Node::CallExpression { callee, arguments } => {
                let func = self.eval(callee, env)?;
                let args = self.eval_args(arguments, env)?;
                self.call_value(func, args)
            }
            Node::ConditionalExpression {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.is_truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            Node::LogicalExpression {
                operator,
                left,
                right,
            } => {
                let left = self.eval(left, env)?;
                match (operator.as_str(), left.is_truthy()) {
                    ("&&", false) | ("||", true) => Ok(left),
                    ("&&", true) | ("||", false) => self.eval(right, env),
                    _ => Err(EvalError::TypeError(format!(
                        "unknown logical operator {}",
                        operator
                    ))),
                }
            }
            Node::BinaryExpression {
                operator,
                left,
                right,
            } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                operators::binary(operator, &left, &right)
            }
            Node::UnaryExpression {
                operator, argument, ..
            } => {
                let value = self.eval(argument, env)?;
                operators::unary(operator, &value)
            }
            Node::MemberExpression {
                object,
                property,
                computed,
            } => {
                let object = self.eval(object, env)?;
                let key = if *computed {
                    self.eval(property, env)?
                } else {
                    let name = property
                        .as_ident()
                        .ok_or(EvalError::Unsupported(property.kind()))?;
                    Value::string(name)
                };
                operators::member(&object, &key)
            }
            Node::ArrayExpression { elements } => Ok(Value::array(self.eval_args(elements, env)?)),
            Node::AssignmentExpression {
                operator,
                left,
                right,
            } if operator == "=" => {
                let name = left.as_ident().ok_or(EvalError::Unsupported(left.kind()))?;
                let value = self.eval(right, env)?;
                if env.borrow_mut().assign(name, value.clone()) {
                    Ok(value)
                } else {
                    Err(EvalError::UnboundVariable(name.to_string()))
                }
            }
            other => Err(EvalError::Unsupported(other.kind())),
        }
    }

    /// Evaluate left to right, splicing `...spread` arrays
    fn eval_args(&mut self, nodes: &[Node], env: &Env) -> Result<Vec<Value>, EvalError> {
        let mut values = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::SpreadElement { argument } => match self.eval(argument, env)? {
                    Value::Array(items) => values.extend(items.iter().cloned()),
                    other => return Err(type_error("spread", "an array", Some(&other))),
                },
                other => values.push(self.eval(other, env)?),
            }
        }
        Ok(values)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn type_error(context: &str, expected: &str, got: Option<&Value>) -> EvalError {
    EvalError::TypeError(format!(
        "{} expects {}, got {}",
        context,
        expected,
        got.map(Value::type_name).unwrap_or("nothing")
    ))
}

fn expect_callable(context: &str, value: Option<Value>) -> Result<Value, EvalError> {
    match value {
        Some(v) if v.is_callable() => Ok(v),
        other => Err(type_error(context, "a function", other.as_ref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    fn run(prog: Node) -> Result<Value, EvalError> {
        Interpreter::new().run(&prog)
    }

    #[test]
    fn test_literal_program() {
        assert_eq!(run(program(vec![expr_stmt(num(3.0))])).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_closure_application() {
        let prog = program(vec![
            var("add", func(&["a", "b"], vec![ret(binary("+", ident("a"), ident("b")))])),
            expr_stmt(call(ident("add"), vec![num(2.0), num(5.0)])),
        ]);
        assert_eq!(run(prog).unwrap(), Value::Number(7.0));
    }

    #[test]
    fn test_function_without_return_is_undefined() {
        let prog = program(vec![expr_stmt(call(func(&[], vec![expr_stmt(num(1.0))]), vec![]))]);
        assert_eq!(run(prog).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_rest_params_collect_extra_args() {
        let f = func_nodes(
            None,
            vec![ident("a"), rest("more")],
            vec![ret(member(ident("more"), "length"))],
        );
        let prog = program(vec![expr_stmt(call(f, vec![num(1.0), num(2.0), num(3.0)]))]);
        assert_eq!(run(prog).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn test_spread_arguments() {
        let prog = program(vec![
            var("xs", array(vec![num(4.0), num(6.0)])),
            expr_stmt(call(ident("plus"), vec![spread(ident("xs"))])),
        ]);
        assert_eq!(run(prog).unwrap(), Value::Number(10.0));
    }

    #[test]
    fn test_unbound_variable() {
        let err = run(program(vec![expr_stmt(ident("nope"))])).unwrap_err();
        assert_eq!(err, EvalError::UnboundVariable("nope".to_string()));
    }

    #[test]
    fn test_not_callable() {
        let err = run(program(vec![expr_stmt(call(num(1.0), vec![]))])).unwrap_err();
        assert!(matches!(err, EvalError::NotCallable(_)));
    }

    #[test]
    fn test_deep_tail_recursion_is_flat() {
        // var loop = function(n) { return n == 0 ? "done" : loop(n - 1); }
        let body = ret(cond(
            binary("==", ident("n"), num(0.0)),
            string("done"),
            call(ident("loop"), vec![binary("-", ident("n"), num(1.0))]),
        ));
        let prog = program(vec![
            var("loop", named_func("loop", &["n"], vec![body])),
            expr_stmt(call(ident("loop"), vec![num(200_000.0)])),
        ]);
        assert_eq!(run(prog).unwrap(), Value::string("done"));
    }

    #[test]
    fn test_step_budget() {
        let body = ret(call(ident("spin"), vec![]));
        let prog = program(vec![
            var("spin", named_func("spin", &[], vec![body])),
            expr_stmt(call(ident("spin"), vec![])),
        ]);
        let mut interp = Interpreter::with_config(RuntimeConfig::new().with_step_budget(500));
        assert_eq!(interp.run(&prog).unwrap_err(), EvalError::BudgetExceeded(500));
    }

    #[test]
    fn test_value_keys_normalize_numbers() {
        assert_eq!(Value::Number(0.0).key(), Value::Number(-0.0).key());
        assert_eq!(Value::Number(f64::NAN).key(), Value::Number(f64::NAN).key());
        assert!(Value::Builtin(Builtin::Sample).key().is_none());
        assert_eq!(
            Value::array(vec![Value::Bool(true)]).key(),
            Some(ValueKey::Array(vec![ValueKey::Bool(true)]))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(
            Value::array(vec![Value::Number(1.5), Value::string("a")]).to_string(),
            "[1.5, a]"
        );
    }
}
