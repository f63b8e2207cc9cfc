//! Test support for the compile → evaluate pipeline.
//!
//! Tests should check more than final values: how often the top continuation
//! fires, what a marginal assigns to each outcome, and whether CPS evaluation
//! agrees with direct evaluation. These helpers give that visibility without
//! every test re-plumbing the pipeline.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::Node;
use crate::codegen::{compile, CompileOptions, TOP_CONTINUATION};
use crate::eval::{EvalError, Interpreter, Value};
use crate::runtime::RuntimeConfig;

// ============================================================================
// Pipeline
// ============================================================================

/// Parse ESTree JSON, panicking on malformed test input
pub fn program_from_json(json: &str) -> Node {
    match Node::from_json(json) {
        Ok(node) => node,
        Err(e) => panic!("bad test program: {}", e),
    }
}

/// Compile with default options (header included)
pub fn compile_program(program: &Node) -> Result<Node, String> {
    compile(program, &CompileOptions::default()).map_err(|e| format!("Compile error: {}", e))
}

/// Compile and evaluate under a fresh interpreter
pub fn compile_and_run(program: &Node) -> Result<Value, String> {
    compile_and_run_with(program, RuntimeConfig::new())
}

pub fn compile_and_run_with(program: &Node, config: RuntimeConfig) -> Result<Value, String> {
    let mut interp = Interpreter::with_config(config);
    compile_and_run_in(&mut interp, program)
}

/// Compile and evaluate under an existing interpreter
pub fn compile_and_run_in(interp: &mut Interpreter, program: &Node) -> Result<Value, String> {
    let cps = compile_program(program)?;
    interp.run(&cps).map_err(|e| format!("Eval error: {}", e))
}

/// Compile and evaluate, keeping the evaluation error for matching
pub fn compile_and_eval(interp: &mut Interpreter, program: &Node) -> Result<Value, EvalError> {
    match compile_program(program) {
        Ok(cps) => interp.run(&cps),
        Err(e) => panic!("{}", e),
    }
}

/// Evaluate a program as written, without any transformation
pub fn run_direct(program: &Node) -> Result<Value, EvalError> {
    Interpreter::new().run(program)
}

// ============================================================================
// Continuation Recording
// ============================================================================

/// Replace the top continuation with one that records every value it receives
pub fn record_top_continuation(interp: &mut Interpreter) -> Rc<RefCell<Vec<Value>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    interp.define_native(TOP_CONTINUATION, move |args| {
        let value = args.first().cloned().unwrap_or(Value::Undefined);
        sink.borrow_mut().push(value.clone());
        Ok(value)
    });
    seen
}

// ============================================================================
// Distribution Inspection
// ============================================================================

/// Probability an ERP result assigns to `outcome`
pub fn probability(erp: &Value, outcome: &Value) -> f64 {
    let Value::Erp(erp) = erp else {
        panic!("expected an ERP, got {:?}", erp);
    };
    match erp.score(&[], outcome) {
        Ok(score) => score.exp(),
        Err(e) => panic!("cannot score {:?}: {}", outcome, e),
    }
}

/// Support of an ERP result, in the order the ERP reports it
pub fn support(erp: &Value) -> Vec<Value> {
    let Value::Erp(erp) = erp else {
        panic!("expected an ERP, got {:?}", erp);
    };
    match erp.support(&[]) {
        Ok(Some(values)) => values,
        Ok(None) => panic!("{} has no finite support", erp.name()),
        Err(e) => panic!("cannot list support: {}", e),
    }
}
