//! Inference engines driven through compiled programs

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use wppl::ast::build::*;
use wppl::erp::{Bernoulli, Delta, Erp};
use wppl::test_support::{compile_and_eval, compile_and_run, compile_and_run_with, probability, support};
use wppl::{EvalError, Interpreter, Node, RuntimeConfig, Value};

fn thunk(body: Vec<Node>) -> Node {
    func(&[], body)
}

fn flip(p: f64) -> Node {
    call(ident("flip"), vec![num(p)])
}

/// Enumerate(function() { var a = flip(0.5); var b = flip(0.5); return and(a, b); })
fn two_coins() -> Node {
    program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![thunk(vec![
            var("a", flip(0.5)),
            var("b", flip(0.5)),
            ret(call(ident("and"), vec![ident("a"), ident("b")])),
        ])],
    ))])
}

/// a, b ~ flip(0.5); condition(or(a, b)); return a
fn either_coin_body() -> Vec<Node> {
    vec![
        var("a", flip(0.5)),
        var("b", flip(0.5)),
        expr_stmt(call(
            ident("condition"),
            vec![call(ident("or"), vec![ident("a"), ident("b")])],
        )),
        ret(ident("a")),
    ]
}

// ============================================================================
// Enumerate
// ============================================================================

#[test]
fn enumerate_two_fair_coins() {
    let result = compile_and_run(&two_coins()).unwrap();
    let p_true = probability(&result, &Value::Bool(true));
    let p_false = probability(&result, &Value::Bool(false));
    assert_relative_eq!(p_true, 0.25, epsilon = 1e-9);
    assert_relative_eq!(p_false, 0.75, epsilon = 1e-9);
    assert_relative_eq!(p_true + p_false, 1.0, epsilon = 1e-9);
}

#[test]
fn enumerate_samples_nested_in_one_call() {
    // Enumerate(function() { return and(flip(0.5), flip(0.5)); })
    let prog = program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![thunk(vec![ret(call(ident("and"), vec![flip(0.5), flip(0.5)]))])],
    ))]);
    let result = compile_and_run(&prog).unwrap();
    let p_true = probability(&result, &Value::Bool(true));
    let p_false = probability(&result, &Value::Bool(false));
    assert_relative_eq!(p_true, 0.25, epsilon = 1e-9);
    assert_relative_eq!(p_false, 0.75, epsilon = 1e-9);
    assert_relative_eq!(p_true + p_false, 1.0, epsilon = 1e-9);
}

#[test]
fn enumerate_conditions_on_observation() {
    // P(a | a or b) = 2/3
    let prog = program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![thunk(either_coin_body())],
    ))]);
    let result = compile_and_run(&prog).unwrap();
    assert_relative_eq!(probability(&result, &Value::Bool(true)), 2.0 / 3.0, epsilon = 1e-9);
}

#[test]
fn enumerate_support_in_first_seen_order() {
    // randomInteger(3) + 1
    let prog = program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![thunk(vec![ret(binary(
            "+",
            call(ident("randomInteger"), vec![num(3.0)]),
            num(1.0),
        ))])],
    ))]);
    let result = compile_and_run(&prog).unwrap();
    assert_eq!(
        support(&result),
        vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]
    );
    for v in 1..=3 {
        assert_relative_eq!(probability(&result, &Value::Number(v as f64)), 1.0 / 3.0, epsilon = 1e-9);
    }
}

#[test]
fn enumerate_weights_by_factor() {
    // var a = flip(0.5); factor(a ? 0 : log(3)); return a   →   P(a) = 1/4
    let prog = program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![thunk(vec![
            var("a", flip(0.5)),
            expr_stmt(call(
                ident("factor"),
                vec![cond(ident("a"), num(0.0), call(ident("log"), vec![num(3.0)]))],
            )),
            ret(ident("a")),
        ])],
    ))]);
    let result = compile_and_run(&prog).unwrap();
    assert_relative_eq!(probability(&result, &Value::Bool(true)), 0.25, epsilon = 1e-9);
}

#[test]
fn nested_enumerate() {
    // var d = Enumerate(function() { return flip(0.5); });
    // Enumerate(function() { var a = sample(d); var b = flip(0.5); return and(a, b); })
    let prog = program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![thunk(vec![
            var("d", call(ident("Enumerate"), vec![thunk(vec![ret(flip(0.5))])])),
            var("a", call(ident("sample"), vec![ident("d")])),
            var("b", flip(0.5)),
            ret(call(ident("and"), vec![ident("a"), ident("b")])),
        ])],
    ))]);
    let result = compile_and_run(&prog).unwrap();
    assert_relative_eq!(probability(&result, &Value::Bool(true)), 0.25, epsilon = 1e-9);
}

#[test]
fn enumerate_requires_finite_support() {
    let prog = program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![thunk(vec![ret(call(ident("uniform"), vec![num(0.0), num(1.0)]))])],
    ))]);
    let mut interp = Interpreter::new();
    let err = compile_and_eval(&mut interp, &prog).unwrap_err();
    assert_eq!(err, EvalError::MissingSupport("uniform".to_string()));
}

#[test]
fn enumerate_with_no_surviving_path() {
    let prog = program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![thunk(vec![
            var("a", flip(0.5)),
            expr_stmt(call(ident("condition"), vec![boolean(false)])),
            ret(ident("a")),
        ])],
    ))]);
    let mut interp = Interpreter::new();
    assert_eq!(compile_and_eval(&mut interp, &prog).unwrap_err(), EvalError::ZeroMarginal);
}

// ============================================================================
// Forward
// ============================================================================

#[test]
fn forward_returns_point_mass() {
    let prog = program(vec![expr_stmt(call(
        ident("Forward"),
        vec![thunk(vec![ret(call(ident("plus"), vec![num(1.0), num(2.0)]))])],
    ))]);
    let result = compile_and_run(&prog).unwrap();
    assert_eq!(probability(&result, &Value::Number(3.0)), 1.0);
    assert_eq!(probability(&result, &Value::Number(4.0)), 0.0);
}

#[test]
fn nan_results_keep_their_mass() {
    // div(0, 0) is NaN; both engines must still assign it all the mass
    let nan_thunk = || thunk(vec![ret(call(ident("div"), vec![num(0.0), num(0.0)]))]);
    let nan = Value::Number(f64::NAN);

    let forward = program(vec![expr_stmt(call(ident("Forward"), vec![nan_thunk()]))]);
    let result = compile_and_run(&forward).unwrap();
    assert_eq!(probability(&result, &nan), 1.0);

    let enumerate = program(vec![expr_stmt(call(ident("Enumerate"), vec![nan_thunk()]))]);
    let result = compile_and_run(&enumerate).unwrap();
    let total: f64 = support(&result).iter().map(|v| probability(&result, v)).sum();
    assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    assert_relative_eq!(probability(&result, &nan), 1.0, epsilon = 1e-9);
}

#[test]
fn forward_frequencies_match_weight() {
    // sample(Forward(function() { return and(flip(0.5), flip(0.5)); })), 1000 runs
    let both = call(ident("and"), vec![flip(0.5), flip(0.5)]);
    let prog = program(vec![expr_stmt(call(
        ident("sample"),
        vec![call(ident("Forward"), vec![thunk(vec![ret(both)])])],
    ))]);
    let mut seeds = StdRng::seed_from_u64(42);
    let trues = (0..1000)
        .filter(|_| {
            let config = RuntimeConfig::new().with_seed(seeds.gen());
            compile_and_run_with(&prog, config).unwrap() == Value::Bool(true)
        })
        .count();
    assert!((trues as f64 / 1000.0 - 0.25).abs() < 0.05, "got {} trues", trues);
}

#[test]
fn forward_rejects_factor() {
    let prog = program(vec![expr_stmt(call(
        ident("Forward"),
        vec![thunk(vec![
            expr_stmt(call(ident("factor"), vec![num(-1.0)])),
            ret(num(1.0)),
        ])],
    ))]);
    let mut interp = Interpreter::new();
    assert_eq!(
        compile_and_eval(&mut interp, &prog).unwrap_err(),
        EvalError::InvalidConditioning
    );
    assert_eq!(interp.runtime().depth(), 1);
}

#[test]
fn factor_outside_inference_is_invalid() {
    let prog = program(vec![expr_stmt(call(ident("factor"), vec![num(0.0)]))]);
    let mut interp = Interpreter::new();
    assert_eq!(
        compile_and_eval(&mut interp, &prog).unwrap_err(),
        EvalError::InvalidConditioning
    );
}

#[test]
fn sampling_outside_inference_draws_directly() {
    let prog = program(vec![expr_stmt(flip(1.0))]);
    assert_eq!(compile_and_run(&prog).unwrap(), Value::Bool(true));
}

// ============================================================================
// ParticleFilter
// ============================================================================

#[test]
fn particle_filter_conditions_on_observation() {
    let prog = program(vec![expr_stmt(call(
        ident("ParticleFilter"),
        vec![thunk(either_coin_body()), num(1000.0)],
    ))]);
    let result = compile_and_run_with(&prog, RuntimeConfig::new().with_seed(11)).unwrap();
    let p = probability(&result, &Value::Bool(true));
    assert!((p - 2.0 / 3.0).abs() < 0.06, "P(a) = {}", p);
    assert_relative_eq!(
        p + probability(&result, &Value::Bool(false)),
        1.0,
        epsilon = 1e-9
    );
}

#[test]
fn particle_filter_without_factor_is_forward_sampling() {
    let prog = program(vec![expr_stmt(call(
        ident("ParticleFilter"),
        vec![thunk(vec![ret(flip(0.5))])],
    ))]);
    let config = RuntimeConfig::new().with_seed(5).with_default_particles(400);
    let result = compile_and_run_with(&prog, config).unwrap();
    let p = probability(&result, &Value::Bool(true));
    assert!((p - 0.5).abs() < 0.1, "P(true) = {}", p);
}

#[test]
fn particle_filter_rejects_bad_particle_count() {
    let prog = program(vec![expr_stmt(call(
        ident("ParticleFilter"),
        vec![thunk(vec![ret(flip(0.5))]), num(0.0)],
    ))]);
    let mut interp = Interpreter::new();
    assert!(matches!(
        compile_and_eval(&mut interp, &prog),
        Err(EvalError::InvalidArgument(_))
    ));
}

// ============================================================================
// Handler Discipline
// ============================================================================

#[test]
fn handler_restored_after_failed_inference() {
    let mut interp = Interpreter::with_config(RuntimeConfig::new().with_seed(3));
    let bad = program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![thunk(vec![ret(call(ident("uniform"), vec![num(0.0), num(1.0)]))])],
    ))]);
    assert!(compile_and_eval(&mut interp, &bad).is_err());
    assert_eq!(interp.runtime().depth(), 1);
    assert_eq!(interp.runtime().active(), Some("default"));

    // The same interpreter still runs inference correctly
    let result = compile_and_eval(&mut interp, &two_coins()).unwrap();
    assert_relative_eq!(probability(&result, &Value::Bool(true)), 0.25, epsilon = 1e-9);
    assert_eq!(interp.runtime().depth(), 1);
}

#[test]
fn handler_restored_after_failure_inside_nested_inference() {
    // Enumerate(function() { var d = Forward(function() { factor(0); return 1; }); return d; })
    let prog = program(vec![expr_stmt(call(
        ident("Enumerate"),
        vec![thunk(vec![
            var(
                "d",
                call(
                    ident("Forward"),
                    vec![thunk(vec![
                        expr_stmt(call(ident("factor"), vec![num(0.0)])),
                        ret(num(1.0)),
                    ])],
                ),
            ),
            ret(ident("d")),
        ])],
    ))]);
    let mut interp = Interpreter::new();
    assert_eq!(
        compile_and_eval(&mut interp, &prog).unwrap_err(),
        EvalError::InvalidConditioning
    );
    assert_eq!(interp.runtime().depth(), 1);
}

#[test]
fn degenerate_erp_scores() {
    let delta = Delta::new(Value::string("x"));
    assert_eq!(delta.score(&[], &Value::string("x")).unwrap(), 0.0);
    assert_eq!(delta.score(&[], &Value::string("y")).unwrap(), f64::NEG_INFINITY);

    let certain = [Value::Number(1.0)];
    assert_eq!(Bernoulli.score(&certain, &Value::Bool(true)).unwrap(), 0.0);
    assert_eq!(
        Bernoulli.score(&certain, &Value::Bool(false)).unwrap(),
        f64::NEG_INFINITY
    );
}
