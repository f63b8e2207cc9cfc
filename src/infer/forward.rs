//! Forward sampling
//!
//! Runs the thunk once, drawing every `sample` from its ERP. Conditioning is
//! not supported. The result is a point mass on the single value produced.

use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::erp::{Delta, Erp};
use crate::eval::{Builtin, EvalError, Tail, Value};
use crate::runtime::{Coroutine, Rng, Runtime, Step};

#[derive(Debug)]
pub struct Forward {
    /// Continuation of the `Forward(...)` call
    caller: Value,
}

impl Forward {
    /// Install a forward sampler and start `thunk` under it
    pub fn start(runtime: &mut Runtime, caller: Value, thunk: Value) -> Tail {
        runtime.install(Box::new(Forward { caller }));
        Tail::call(thunk, vec![Value::Builtin(Builtin::Exit)])
    }
}

impl Coroutine for Forward {
    fn name(&self) -> &'static str {
        "Forward"
    }

    fn sample(
        &mut self,
        rng: &mut Rng,
        k: Value,
        erp: Rc<dyn Erp>,
        params: Vec<Value>,
    ) -> Result<Step, EvalError> {
        let value = erp.sample(&params, rng)?;
        trace!(erp = erp.name(), value = %value, "forward sample");
        Ok(Step::Resume(Tail::call(k, vec![value])))
    }

    fn factor(&mut self, _rng: &mut Rng, _k: Value, _score: f64) -> Result<Step, EvalError> {
        Err(EvalError::InvalidConditioning)
    }

    fn exit(&mut self, _rng: &mut Rng, value: Value) -> Result<Step, EvalError> {
        debug!(value = %value, "forward sampling finished");
        let caller = mem::replace(&mut self.caller, Value::Undefined);
        let delta: Rc<dyn Erp> = Rc::new(Delta::new(value));
        Ok(Step::Finish(Tail::call(caller, vec![Value::Erp(delta)])))
    }
}
