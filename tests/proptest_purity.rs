//! Property-based tests for semantic preservation
//!
//! A program without `sample`/`factor` must produce the same value whether it
//! is evaluated as written or compiled to CPS first.

use proptest::prelude::*;

use wppl::ast::build::*;
use wppl::test_support::{compile_and_run, run_direct};
use wppl::{Node, Value};

/// Generate small integer-valued arithmetic expressions
fn expr() -> impl Strategy<Value = Node> {
    let leaf = (-50i32..50).prop_map(|n| num(n as f64));
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            // Host primitives, reached through generated wrappers
            (prop::sample::select(vec!["plus", "minus", "times"]), inner.clone(), inner.clone())
                .prop_map(|(name, a, b)| call(ident(name), vec![a, b])),
            // Operators applied in place
            (prop::sample::select(vec!["+", "-", "*"]), inner.clone(), inner.clone())
                .prop_map(|(op, a, b)| binary(op, a, b)),
            (inner.clone(), inner.clone(), inner.clone(), inner.clone()).prop_map(|(l, r, a, b)| {
                cond(binary("<", l, r), a, b)
            }),
            // Immediately applied function
            (inner.clone(), inner.clone()).prop_map(|(x, body)| {
                call(
                    func(&["x"], vec![ret(call(ident("plus"), vec![ident("x"), body]))]),
                    vec![x],
                )
            }),
            inner.prop_map(|a| unary("-", a)),
        ]
    })
}

/// Sequences of statements binding intermediate results
fn program_strategy() -> impl Strategy<Value = Node> {
    (prop::collection::vec(expr(), 1..4), expr()).prop_map(|(bindings, last)| {
        let mut body: Vec<Node> = bindings
            .into_iter()
            .enumerate()
            .map(|(i, e)| var(&format!("v{}", i), e))
            .collect();
        let total = (0..body.len()).fold(last, |acc, i| {
            call(ident("plus"), vec![acc, ident(format!("v{}", i))])
        });
        body.push(expr_stmt(total));
        program(body)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// CPS evaluation agrees with direct evaluation on pure expressions
    #[test]
    fn cps_preserves_pure_expressions(e in expr()) {
        let prog = program(vec![expr_stmt(e)]);
        let direct = run_direct(&prog).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let cps = compile_and_run(&prog).map_err(TestCaseError::fail)?;
        prop_assert_eq!(direct, cps);
    }

    /// Variable bindings survive the move into continuation parameters
    #[test]
    fn cps_preserves_bindings(prog in program_strategy()) {
        let direct = run_direct(&prog).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let cps = compile_and_run(&prog).map_err(TestCaseError::fail)?;
        prop_assert_eq!(direct.clone(), cps);
        prop_assert!(matches!(direct, Value::Number(_)));
    }
}
