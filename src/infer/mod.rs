//! Inference engines
//!
//! Each engine is a [`Coroutine`](crate::runtime::Coroutine) installed for the
//! duration of one `Forward(thunk)`, `Enumerate(thunk)` or
//! `ParticleFilter(thunk, n)` call. The thunk is started with the `exit`
//! builtin as its continuation, so the engine sees every `sample`, `factor`
//! and the final value of every execution path. When it is done, the engine
//! finishes by handing an ERP over the observed values to the continuation
//! of the inference call.

pub mod enumerate;
pub mod forward;
pub mod particle_filter;

pub use enumerate::Enumerate;
pub use forward::Forward;
pub use particle_filter::ParticleFilter;

use indexmap::IndexMap;

use crate::erp::Marginal;
use crate::eval::{EvalError, Value, ValueKey};

/// Log-space tally of return values, in first-seen order
#[derive(Debug, Default)]
pub struct MarginalAccumulator {
    entries: IndexMap<ValueKey, (Value, f64)>,
}

impl MarginalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add `exp(log_weight)` mass to `value`
    pub fn add(&mut self, value: Value, log_weight: f64) -> Result<(), EvalError> {
        let key = value.key().ok_or_else(|| {
            EvalError::TypeError(format!(
                "inference cannot return a {}; only data values can be tallied",
                value.type_name()
            ))
        })?;
        match self.entries.get_mut(&key) {
            Some((_, mass)) => *mass = log_add(*mass, log_weight),
            None => {
                self.entries.insert(key, (value, log_weight));
            }
        }
        Ok(())
    }

    /// Normalize into a [`Marginal`]; fails if no mass was recorded
    pub fn finish(self) -> Result<Marginal, EvalError> {
        let total = self
            .entries
            .values()
            .fold(f64::NEG_INFINITY, |acc, (_, mass)| log_add(acc, *mass));
        if total == f64::NEG_INFINITY || total.is_nan() {
            return Err(EvalError::ZeroMarginal);
        }
        let entries = self
            .entries
            .into_values()
            .filter(|(_, mass)| *mass > f64::NEG_INFINITY)
            .map(|(value, mass)| (value, (mass - total).exp()))
            .collect();
        Ok(Marginal::new(entries, total))
    }
}

/// `ln(exp(a) + exp(b))` without overflow
pub fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let hi = a.max(b);
    hi + ((a - hi).exp() + (b - hi).exp()).ln()
}
