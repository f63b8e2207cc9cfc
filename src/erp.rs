//! Elementary Random Primitives
//!
//! An ERP bundles how to draw from a distribution, how to score a value under
//! it, and (for finite distributions) how to list its support. Parameters are
//! passed on every call so one ERP value serves a whole family, e.g. a single
//! Bernoulli ERP for every coin weight.

use std::fmt;

use rand::Rng as _;

use crate::eval::{EvalError, Value};
use crate::runtime::Rng;

pub trait Erp: fmt::Debug {
    fn name(&self) -> &str;

    /// Draw a value
    fn sample(&self, params: &[Value], rng: &mut Rng) -> Result<Value, EvalError>;

    /// Log-probability of `value`
    fn score(&self, params: &[Value], value: &Value) -> Result<f64, EvalError>;

    /// Finite support, if this distribution has one
    fn support(&self, _params: &[Value]) -> Result<Option<Vec<Value>>, EvalError> {
        Ok(None)
    }
}

fn number_param(erp: &str, params: &[Value], index: usize) -> Result<f64, EvalError> {
    match params.get(index) {
        Some(Value::Number(n)) => Ok(*n),
        Some(other) => Err(EvalError::InvalidArgument(format!(
            "{} parameter {} must be a number, got {}",
            erp,
            index,
            other.type_name()
        ))),
        None => Err(EvalError::InvalidArgument(format!(
            "{} expects parameter {}",
            erp, index
        ))),
    }
}

fn count_param(erp: &str, params: &[Value], index: usize) -> Result<usize, EvalError> {
    let n = number_param(erp, params, index)?;
    if n >= 1.0 && n.fract() == 0.0 && n.is_finite() {
        Ok(n as usize)
    } else {
        Err(EvalError::InvalidArgument(format!(
            "{} expects a positive integer, got {}",
            erp, n
        )))
    }
}

/// Index of `value` if it is an integer in `0..len`
fn as_index(value: &Value, len: usize) -> Option<usize> {
    match value {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && (*n as usize) < len => Some(*n as usize),
        _ => None,
    }
}

/// Inverse-CDF draw over non-negative weights summing to `total`
fn draw_index(weights: impl Iterator<Item = f64>, total: f64, rng: &mut Rng) -> usize {
    let target = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    let mut last = 0;
    for (i, w) in weights.enumerate() {
        if w <= 0.0 {
            continue;
        }
        cumulative += w;
        last = i;
        if target < cumulative {
            return i;
        }
    }
    last
}

// ============================================================================
// Primitive distributions
// ============================================================================

/// `[p]` → `true` with probability `p`
#[derive(Debug, Clone, Copy, Default)]
pub struct Bernoulli;

impl Bernoulli {
    fn weight(params: &[Value]) -> Result<f64, EvalError> {
        let p = number_param("bernoulli", params, 0)?;
        if (0.0..=1.0).contains(&p) {
            Ok(p)
        } else {
            Err(EvalError::InvalidArgument(format!(
                "bernoulli weight must lie in [0, 1], got {}",
                p
            )))
        }
    }
}

impl Erp for Bernoulli {
    fn name(&self) -> &str {
        "bernoulli"
    }

    fn sample(&self, params: &[Value], rng: &mut Rng) -> Result<Value, EvalError> {
        let p = Self::weight(params)?;
        Ok(Value::Bool(rng.gen::<f64>() < p))
    }

    fn score(&self, params: &[Value], value: &Value) -> Result<f64, EvalError> {
        let p = Self::weight(params)?;
        Ok(match value {
            Value::Bool(true) => p.ln(),
            Value::Bool(false) => (1.0 - p).ln(),
            _ => f64::NEG_INFINITY,
        })
    }

    fn support(&self, _params: &[Value]) -> Result<Option<Vec<Value>>, EvalError> {
        Ok(Some(vec![Value::Bool(true), Value::Bool(false)]))
    }
}

/// `[n]` → uniform over `0..n`
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomInteger;

impl Erp for RandomInteger {
    fn name(&self) -> &str {
        "randomInteger"
    }

    fn sample(&self, params: &[Value], rng: &mut Rng) -> Result<Value, EvalError> {
        let n = count_param("randomInteger", params, 0)?;
        Ok(Value::Number(rng.gen_range(0..n) as f64))
    }

    fn score(&self, params: &[Value], value: &Value) -> Result<f64, EvalError> {
        let n = count_param("randomInteger", params, 0)?;
        Ok(match as_index(value, n) {
            Some(_) => -(n as f64).ln(),
            None => f64::NEG_INFINITY,
        })
    }

    fn support(&self, params: &[Value]) -> Result<Option<Vec<Value>>, EvalError> {
        let n = count_param("randomInteger", params, 0)?;
        Ok(Some((0..n).map(|i| Value::Number(i as f64)).collect()))
    }
}

/// `[a, b]` → continuous uniform on `[a, b]`; no finite support
#[derive(Debug, Clone, Copy, Default)]
pub struct Uniform;

impl Uniform {
    fn bounds(params: &[Value]) -> Result<(f64, f64), EvalError> {
        let a = number_param("uniform", params, 0)?;
        let b = number_param("uniform", params, 1)?;
        if a < b {
            Ok((a, b))
        } else {
            Err(EvalError::InvalidArgument(format!(
                "uniform needs a < b, got [{}, {}]",
                a, b
            )))
        }
    }
}

impl Erp for Uniform {
    fn name(&self) -> &str {
        "uniform"
    }

    fn sample(&self, params: &[Value], rng: &mut Rng) -> Result<Value, EvalError> {
        let (a, b) = Self::bounds(params)?;
        Ok(Value::Number(a + (b - a) * rng.gen::<f64>()))
    }

    fn score(&self, params: &[Value], value: &Value) -> Result<f64, EvalError> {
        let (a, b) = Self::bounds(params)?;
        Ok(match value {
            Value::Number(x) if *x >= a && *x <= b => -(b - a).ln(),
            _ => f64::NEG_INFINITY,
        })
    }
}

/// `[weights]` → index `i` with probability proportional to `weights[i]`
#[derive(Debug, Clone, Copy, Default)]
pub struct Discrete;

impl Discrete {
    fn weights(params: &[Value]) -> Result<(Vec<f64>, f64), EvalError> {
        let Some(Value::Array(items)) = params.first() else {
            return Err(EvalError::InvalidArgument(
                "discrete expects an array of weights".to_string(),
            ));
        };
        let weights = items
            .iter()
            .map(|w| match w {
                Value::Number(n) if *n >= 0.0 => Ok(*n),
                other => Err(EvalError::InvalidArgument(format!(
                    "discrete weights must be non-negative numbers, got {}",
                    other
                ))),
            })
            .collect::<Result<Vec<f64>, EvalError>>()?;
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            Ok((weights, total))
        } else {
            Err(EvalError::InvalidArgument(
                "discrete weights must have a positive sum".to_string(),
            ))
        }
    }
}

impl Erp for Discrete {
    fn name(&self) -> &str {
        "discrete"
    }

    fn sample(&self, params: &[Value], rng: &mut Rng) -> Result<Value, EvalError> {
        let (weights, total) = Self::weights(params)?;
        let i = draw_index(weights.into_iter(), total, rng);
        Ok(Value::Number(i as f64))
    }

    fn score(&self, params: &[Value], value: &Value) -> Result<f64, EvalError> {
        let (weights, total) = Self::weights(params)?;
        Ok(match as_index(value, weights.len()) {
            Some(i) => (weights[i] / total).ln(),
            None => f64::NEG_INFINITY,
        })
    }

    fn support(&self, params: &[Value]) -> Result<Option<Vec<Value>>, EvalError> {
        let (weights, _) = Self::weights(params)?;
        Ok(Some((0..weights.len()).map(|i| Value::Number(i as f64)).collect()))
    }
}

// ============================================================================
// Derived distributions
// ============================================================================

/// Outcome equality as the marginal tally groups values: by key, so every NaN
/// is one outcome and `-0` is `0`
fn same_outcome(a: &Value, b: &Value) -> bool {
    match (a.key(), b.key()) {
        (Some(ka), Some(kb)) => ka == kb,
        _ => a == b,
    }
}

/// Point mass at a single value
#[derive(Debug, Clone)]
pub struct Delta {
    value: Value,
}

impl Delta {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Erp for Delta {
    fn name(&self) -> &str {
        "delta"
    }

    fn sample(&self, _params: &[Value], _rng: &mut Rng) -> Result<Value, EvalError> {
        Ok(self.value.clone())
    }

    fn score(&self, _params: &[Value], value: &Value) -> Result<f64, EvalError> {
        Ok(if same_outcome(value, &self.value) {
            0.0
        } else {
            f64::NEG_INFINITY
        })
    }

    fn support(&self, _params: &[Value]) -> Result<Option<Vec<Value>>, EvalError> {
        Ok(Some(vec![self.value.clone()]))
    }
}

/// Normalized distribution over return values produced by an inference run
#[derive(Debug, Clone)]
pub struct Marginal {
    /// Distinct values with their normalized probabilities, in first-seen order
    entries: Vec<(Value, f64)>,
    /// Log of the total unnormalized mass
    log_normalizer: f64,
}

impl Marginal {
    /// Build from normalized entries
    pub fn new(entries: Vec<(Value, f64)>, log_normalizer: f64) -> Self {
        Self {
            entries,
            log_normalizer,
        }
    }

    pub fn entries(&self) -> &[(Value, f64)] {
        &self.entries
    }

    /// Probability of `value`, 0 if it never occurred
    pub fn probability(&self, value: &Value) -> f64 {
        self.entries
            .iter()
            .find(|(v, _)| same_outcome(v, value))
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }

    pub fn log_normalizer(&self) -> f64 {
        self.log_normalizer
    }
}

impl Erp for Marginal {
    fn name(&self) -> &str {
        "marginal"
    }

    fn sample(&self, _params: &[Value], rng: &mut Rng) -> Result<Value, EvalError> {
        let i = draw_index(self.entries.iter().map(|(_, p)| *p), 1.0, rng);
        self.entries
            .get(i)
            .map(|(v, _)| v.clone())
            .ok_or(EvalError::ZeroMarginal)
    }

    fn score(&self, _params: &[Value], value: &Value) -> Result<f64, EvalError> {
        Ok(self.probability(value).ln())
    }

    fn support(&self, _params: &[Value]) -> Result<Option<Vec<Value>>, EvalError> {
        Ok(Some(self.entries.iter().map(|(v, _)| v.clone()).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    fn rng() -> Rng {
        Rng::seed_from_u64(7)
    }

    #[test]
    fn test_bernoulli_scores() {
        let params = [Value::Number(0.25)];
        assert_relative_eq!(Bernoulli.score(&params, &Value::Bool(true)).unwrap(), 0.25f64.ln());
        assert_relative_eq!(Bernoulli.score(&params, &Value::Bool(false)).unwrap(), 0.75f64.ln());
        assert_eq!(
            Bernoulli.score(&params, &Value::Number(1.0)).unwrap(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_bernoulli_rejects_bad_weight() {
        let err = Bernoulli.sample(&[Value::Number(1.5)], &mut rng()).unwrap_err();
        assert!(matches!(err, EvalError::InvalidArgument(_)));
    }

    #[test]
    fn test_random_integer_support() {
        let support = RandomInteger.support(&[Value::Number(3.0)]).unwrap().unwrap();
        assert_eq!(
            support,
            vec![Value::Number(0.0), Value::Number(1.0), Value::Number(2.0)]
        );
        assert_relative_eq!(
            RandomInteger.score(&[Value::Number(3.0)], &Value::Number(2.0)).unwrap(),
            -(3.0f64).ln()
        );
    }

    #[test]
    fn test_uniform_has_no_support() {
        let params = [Value::Number(0.0), Value::Number(2.0)];
        assert!(Uniform.support(&params).unwrap().is_none());
        assert_relative_eq!(
            Uniform.score(&params, &Value::Number(1.0)).unwrap(),
            -(2.0f64).ln()
        );
        let Value::Number(x) = Uniform.sample(&params, &mut rng()).unwrap() else {
            panic!("uniform should draw a number");
        };
        assert!((0.0..=2.0).contains(&x));
    }

    #[test]
    fn test_discrete_normalizes_weights() {
        let params = [Value::Array(vec![Value::Number(1.0), Value::Number(3.0)].into())];
        assert_relative_eq!(
            Discrete.score(&params, &Value::Number(1.0)).unwrap(),
            0.75f64.ln()
        );
        let mut r = rng();
        let ones = (0..2000)
            .filter(|_| Discrete.sample(&params, &mut r).unwrap() == Value::Number(1.0))
            .count();
        assert!((ones as f64 / 2000.0 - 0.75).abs() < 0.05);
    }

    #[test]
    fn test_delta_is_degenerate() {
        let delta = Delta::new(Value::Number(4.0));
        assert_eq!(delta.score(&[], &Value::Number(4.0)).unwrap(), 0.0);
        assert_eq!(
            delta.score(&[], &Value::Number(5.0)).unwrap(),
            f64::NEG_INFINITY
        );
        assert_eq!(delta.sample(&[], &mut rng()).unwrap(), Value::Number(4.0));
    }

    #[test]
    fn test_nan_outcome_scores_like_itself() {
        let delta = Delta::new(Value::Number(f64::NAN));
        assert_eq!(delta.score(&[], &Value::Number(f64::NAN)).unwrap(), 0.0);
        assert_eq!(delta.score(&[], &Value::Number(0.0)).unwrap(), f64::NEG_INFINITY);

        let marginal = Marginal::new(
            vec![(Value::Number(f64::NAN), 0.5), (Value::Number(-0.0), 0.5)],
            0.0,
        );
        assert_eq!(marginal.probability(&Value::Number(f64::NAN)), 0.5);
        assert_eq!(marginal.probability(&Value::Number(0.0)), 0.5);
        let total: f64 = marginal
            .support(&[])
            .unwrap()
            .unwrap()
            .iter()
            .map(|v| marginal.probability(v))
            .sum();
        assert_relative_eq!(total, 1.0);
    }

    #[test]
    fn test_marginal_inverse_cdf() {
        let marginal = Marginal::new(
            vec![(Value::Bool(true), 0.2), (Value::Bool(false), 0.8)],
            0.0,
        );
        let mut r = rng();
        let trues = (0..5000)
            .filter(|_| marginal.sample(&[], &mut r).unwrap() == Value::Bool(true))
            .count();
        assert!((trues as f64 / 5000.0 - 0.2).abs() < 0.03);
        assert_relative_eq!(marginal.score(&[], &Value::Bool(false)).unwrap(), 0.8f64.ln());
        assert_eq!(marginal.probability(&Value::Null), 0.0);
    }
}
