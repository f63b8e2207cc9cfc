//! Exhaustive enumeration
//!
//! Explores every execution path depth-first. At each `sample` the ERP's
//! support is expanded into suspended paths, one per value, each carrying its
//! accumulated log score; the most recently pushed path runs next. `factor`
//! adds to the running score, and a path whose score reaches `-Infinity` is
//! abandoned. Every `exit` records the path's value and weight; once no path
//! is left the tally is normalized into a [`Marginal`](crate::erp::Marginal).

use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use super::MarginalAccumulator;
use crate::erp::Erp;
use crate::eval::{Builtin, EvalError, Tail, Value};
use crate::runtime::{Coroutine, Rng, Runtime, Step};

/// A not-yet-explored branch: resume `cont` with `value` at `score`
#[derive(Debug)]
struct SuspendedPath {
    cont: Value,
    value: Value,
    score: f64,
}

#[derive(Debug)]
pub struct Enumerate {
    caller: Value,
    /// Log score of the running path
    score: f64,
    pending: Vec<SuspendedPath>,
    marginal: MarginalAccumulator,
    completed: usize,
}

impl Enumerate {
    /// Install an enumerator and start `thunk` under it
    pub fn start(runtime: &mut Runtime, caller: Value, thunk: Value) -> Tail {
        runtime.install(Box::new(Enumerate {
            caller,
            score: 0.0,
            pending: Vec::new(),
            marginal: MarginalAccumulator::new(),
            completed: 0,
        }));
        Tail::call(thunk, vec![Value::Builtin(Builtin::Exit)])
    }

    /// Continue with the next pending path, or finish with the marginal
    fn next_path(&mut self) -> Result<Step, EvalError> {
        if let Some(path) = self.pending.pop() {
            self.score = path.score;
            return Ok(Step::Resume(Tail::call(path.cont, vec![path.value])));
        }

        let marginal = mem::take(&mut self.marginal).finish()?;
        debug!(
            paths = self.completed,
            values = marginal.entries().len(),
            log_normalizer = marginal.log_normalizer(),
            "enumeration finished"
        );
        let caller = mem::replace(&mut self.caller, Value::Undefined);
        let erp: Rc<dyn Erp> = Rc::new(marginal);
        Ok(Step::Finish(Tail::call(caller, vec![Value::Erp(erp)])))
    }
}

impl Coroutine for Enumerate {
    fn name(&self) -> &'static str {
        "Enumerate"
    }

    fn sample(
        &mut self,
        _rng: &mut Rng,
        k: Value,
        erp: Rc<dyn Erp>,
        params: Vec<Value>,
    ) -> Result<Step, EvalError> {
        let support = erp
            .support(&params)?
            .ok_or_else(|| EvalError::MissingSupport(erp.name().to_string()))?;
        trace!(erp = erp.name(), branches = support.len(), "enumerating support");

        // Reversed so the first support value is explored first
        for value in support.into_iter().rev() {
            let score = self.score + erp.score(&params, &value)?;
            if score == f64::NEG_INFINITY {
                continue;
            }
            self.pending.push(SuspendedPath {
                cont: k.clone(),
                value,
                score,
            });
        }
        self.next_path()
    }

    fn factor(&mut self, _rng: &mut Rng, k: Value, score: f64) -> Result<Step, EvalError> {
        self.score += score;
        trace!(score, total = self.score, "enumeration factor");
        if self.score == f64::NEG_INFINITY {
            return self.next_path();
        }
        Ok(Step::Resume(Tail::call(k, vec![Value::Undefined])))
    }

    fn exit(&mut self, _rng: &mut Rng, value: Value) -> Result<Step, EvalError> {
        self.completed += 1;
        self.marginal.add(value, self.score)?;
        self.next_path()
    }
}
