//! Tail Call Optimization tests
//!
//! CPS code only ever calls in `return` position, and the interpreter hands
//! those calls back to a trampoline instead of recursing:
//! - Tail recursion: native stack stays flat at any depth
//! - Non-tail recursion: continuations pile up on the heap, not the stack

use wppl::ast::build::*;
use wppl::test_support::compile_and_run_with;
use wppl::{EvalError, Node, RuntimeConfig, Value};

fn run(prog: &Node) -> Result<Value, String> {
    compile_and_run_with(prog, RuntimeConfig::new().with_seed(0))
}

/// var countdown = function(n, acc) { return n == 0 ? acc : countdown(n - 1, plus(acc, 1)); }
fn countdown(n: f64) -> Node {
    let body = ret(cond(
        binary("==", ident("n"), num(0.0)),
        ident("acc"),
        call(
            ident("countdown"),
            vec![
                binary("-", ident("n"), num(1.0)),
                call(ident("plus"), vec![ident("acc"), num(1.0)]),
            ],
        ),
    ));
    program(vec![
        var("countdown", func(&["n", "acc"], vec![body])),
        expr_stmt(call(ident("countdown"), vec![num(n), num(0.0)])),
    ])
}

#[test]
fn tco_countdown_100k() {
    assert_eq!(run(&countdown(100_000.0)).unwrap(), Value::Number(100_000.0));
}

#[test]
fn tco_non_tail_sum() {
    // var sum = function(n) { return n == 0 ? 0 : plus(n, sum(n - 1)); }; sum(1000)
    let body = ret(cond(
        binary("==", ident("n"), num(0.0)),
        num(0.0),
        call(
            ident("plus"),
            vec![ident("n"), call(ident("sum"), vec![binary("-", ident("n"), num(1.0))])],
        ),
    ));
    let prog = program(vec![
        var("sum", func(&["n"], vec![body])),
        expr_stmt(call(ident("sum"), vec![num(1000.0)])),
    ]);
    assert_eq!(run(&prog).unwrap(), Value::Number(500_500.0));
}

#[test]
fn tco_random_walk_under_enumerate() {
    // Enumerate(function() {
    //   var walk = function(n, pos) { return n == 0 ? pos : walk(n - 1, plus(pos, randomInteger(2))); };
    //   return walk(12, 0);
    // })
    let step = call(
        ident("walk"),
        vec![
            binary("-", ident("n"), num(1.0)),
            call(
                ident("plus"),
                vec![ident("pos"), call(ident("randomInteger"), vec![num(2.0)])],
            ),
        ],
    );
    let walk = func(
        &["n", "pos"],
        vec![ret(cond(binary("==", ident("n"), num(0.0)), ident("pos"), step))],
    );
    let prog = program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![func(
            &[],
            vec![
                var("walk", walk),
                ret(call(ident("walk"), vec![num(12.0), num(0.0)])),
            ],
        )],
    ))]);
    let result = run(&prog).unwrap();
    let Value::Erp(erp) = result else {
        panic!("expected a distribution");
    };
    // Binomial(12, 1/2): P(6) = 924 / 4096
    let p6 = erp.score(&[], &Value::Number(6.0)).unwrap().exp();
    assert!((p6 - 924.0 / 4096.0).abs() < 1e-9);
    assert_eq!(erp.support(&[]).unwrap().unwrap().len(), 13);
}

#[test]
fn step_budget_stops_runaway_recursion() {
    // var spin = function() { return spin(); }; spin()
    let prog = program(vec![
        var("spin", func(&[], vec![ret(call(ident("spin"), vec![]))])),
        expr_stmt(call(ident("spin"), vec![])),
    ]);
    let config = RuntimeConfig::new().with_step_budget(10_000);
    let err = compile_and_run_with(&prog, config).unwrap_err();
    assert!(err.contains(&EvalError::BudgetExceeded(10_000).to_string()));
}
