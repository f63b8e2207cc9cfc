//! Effect-handler runtime
//!
//! Probabilistic programs perform three effects: `sample`, `factor` and
//! `exit`. Each one is dispatched to the innermost installed handler (a
//! [`Coroutine`]). Handlers live on an explicit stack owned by the
//! [`Runtime`]; starting an inference pushes one, and the handler decides
//! when to pop itself by answering [`Step::Finish`].
//!
//! Dispatch pops the active handler before running its hook so that a
//! nested inference started from inside the hook (or from the continuation
//! it resumes) sees the correct parent. The handler is pushed back only when
//! it answers [`Step::Resume`]; after a `Finish` or an error the previous
//! handler is active again.

use std::fmt;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::erp::Erp;
use crate::eval::{EvalError, Tail, Value};

/// Random source shared by every handler
pub type Rng = StdRng;

/// A handler's answer to an effect
#[derive(Debug)]
pub enum Step {
    /// Stay installed and continue with this computation
    Resume(Tail),
    /// Uninstall and continue with this computation in the parent context
    Finish(Tail),
}

/// An effect handler
///
/// Every hook returns the computation to continue with rather than calling
/// it, which keeps effect dispatch in tail position of the trampoline.
pub trait Coroutine: fmt::Debug {
    fn name(&self) -> &'static str;

    fn sample(
        &mut self,
        rng: &mut Rng,
        k: Value,
        erp: Rc<dyn Erp>,
        params: Vec<Value>,
    ) -> Result<Step, EvalError>;

    fn factor(&mut self, rng: &mut Rng, k: Value, score: f64) -> Result<Step, EvalError>;

    fn exit(&mut self, rng: &mut Rng, value: Value) -> Result<Step, EvalError>;
}

/// Behavior outside of any inference: draw on `sample`, reject `factor`,
/// and hand the final value back unchanged on `exit`
#[derive(Debug, Default)]
pub struct DefaultHandler;

impl Coroutine for DefaultHandler {
    fn name(&self) -> &'static str {
        "default"
    }

    fn sample(
        &mut self,
        rng: &mut Rng,
        k: Value,
        erp: Rc<dyn Erp>,
        params: Vec<Value>,
    ) -> Result<Step, EvalError> {
        let value = erp.sample(&params, rng)?;
        Ok(Step::Resume(Tail::call(k, vec![value])))
    }

    fn factor(&mut self, _rng: &mut Rng, _k: Value, _score: f64) -> Result<Step, EvalError> {
        Err(EvalError::InvalidConditioning)
    }

    fn exit(&mut self, _rng: &mut Rng, value: Value) -> Result<Step, EvalError> {
        Ok(Step::Resume(Tail::Value(value)))
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Seed for the shared random source; entropy when unset
    pub seed: Option<u64>,
    /// Maximum number of function applications per run
    pub step_budget: Option<u64>,
    /// Particle count for `ParticleFilter` calls that omit one
    pub default_particles: usize,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self {
            seed: None,
            step_budget: None,
            default_particles: 100,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_step_budget(mut self, budget: u64) -> Self {
        self.step_budget = Some(budget);
        self
    }

    pub fn with_default_particles(mut self, particles: usize) -> Self {
        self.default_particles = particles.max(1);
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The handler stack plus the random source
#[derive(Debug)]
pub struct Runtime {
    /// Bottom entry is always a [`DefaultHandler`]
    handlers: Vec<Box<dyn Coroutine>>,
    rng: Rng,
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => Rng::seed_from_u64(seed),
            None => Rng::from_entropy(),
        };
        Self {
            handlers: vec![Box::new(DefaultHandler)],
            rng,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn rng(&mut self) -> &mut Rng {
        &mut self.rng
    }

    /// Number of installed handlers, the default one included
    pub fn depth(&self) -> usize {
        self.handlers.len()
    }

    /// Name of the active handler
    pub fn active(&self) -> Option<&'static str> {
        self.handlers.last().map(|h| h.name())
    }

    /// Make `handler` the active coroutine
    pub fn install(&mut self, handler: Box<dyn Coroutine>) {
        debug!(handler = handler.name(), depth = self.handlers.len(), "installing handler");
        self.handlers.push(handler);
    }

    /// Drop handlers above `depth`, never below the default one
    pub fn unwind_to(&mut self, depth: usize) {
        let depth = depth.max(1);
        while self.handlers.len() > depth {
            if let Some(handler) = self.handlers.pop() {
                debug!(handler = handler.name(), "unwinding handler");
            }
        }
    }

    fn dispatch(
        &mut self,
        effect: &'static str,
        hook: impl FnOnce(&mut dyn Coroutine, &mut Rng) -> Result<Step, EvalError>,
    ) -> Result<Tail, EvalError> {
        let mut handler = match self.handlers.pop() {
            Some(handler) => handler,
            None => Box::new(DefaultHandler),
        };
        trace!(effect, handler = handler.name(), "dispatching effect");
        match hook(handler.as_mut(), &mut self.rng)? {
            Step::Resume(next) => {
                self.handlers.push(handler);
                Ok(next)
            }
            Step::Finish(next) => {
                debug!(handler = handler.name(), "handler finished");
                if self.handlers.is_empty() {
                    self.handlers.push(Box::new(DefaultHandler));
                }
                Ok(next)
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

/// Route a `sample` to the active handler
pub fn sample(
    runtime: &mut Runtime,
    k: Value,
    erp: Rc<dyn Erp>,
    params: Vec<Value>,
) -> Result<Tail, EvalError> {
    runtime.dispatch("sample", |handler, rng| handler.sample(rng, k, erp, params))
}

/// Route a `factor` to the active handler
pub fn factor(runtime: &mut Runtime, k: Value, score: f64) -> Result<Tail, EvalError> {
    runtime.dispatch("factor", |handler, rng| handler.factor(rng, k, score))
}

/// Route an `exit` to the active handler
pub fn exit(runtime: &mut Runtime, value: Value) -> Result<Tail, EvalError> {
    runtime.dispatch("exit", |handler, rng| handler.exit(rng, value))
}
