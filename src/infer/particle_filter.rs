//! Sequential Monte Carlo with a `factor` barrier
//!
//! Particles are executions of the thunk run one at a time. A particle that
//! reaches `factor` adds the score to its log weight and is suspended; the
//! next particle then runs until it too reaches a `factor` or exits. Once
//! every particle is suspended or finished, the population is resampled
//! systematically in proportion to weight, every weight is reset to the log
//! mean weight, and the suspended particles resume. When all particles have
//! exited their values are tallied by weight into a
//! [`Marginal`](crate::erp::Marginal).

use std::mem;
use std::rc::Rc;

use rand::Rng as _;
use tracing::{debug, trace};

use super::{log_add, MarginalAccumulator};
use crate::erp::Erp;
use crate::eval::{Builtin, EvalError, Tail, Value};
use crate::runtime::{Coroutine, Rng, Runtime, Step};

#[derive(Debug, Clone)]
enum Checkpoint {
    /// Not run yet
    Start,
    /// Suspended at a `factor`; resume by calling the continuation
    Paused(Value),
    /// Exited with a value
    Finished(Value),
}

#[derive(Debug, Clone)]
struct Particle {
    checkpoint: Checkpoint,
    log_weight: f64,
}

#[derive(Debug)]
pub struct ParticleFilter {
    caller: Value,
    thunk: Value,
    particles: Vec<Particle>,
    /// Index of the running particle
    current: usize,
    generation: usize,
}

impl ParticleFilter {
    /// Install a particle filter over `count` particles and start the first
    pub fn start(runtime: &mut Runtime, caller: Value, thunk: Value, count: usize) -> Tail {
        let count = count.max(1);
        let particle = Particle {
            checkpoint: Checkpoint::Start,
            log_weight: 0.0,
        };
        runtime.install(Box::new(ParticleFilter {
            caller,
            thunk: thunk.clone(),
            particles: vec![particle; count],
            current: 0,
            generation: 0,
        }));
        Tail::call(thunk, vec![Value::Builtin(Builtin::Exit)])
    }

    fn resume(&self, index: usize) -> Tail {
        match &self.particles[index].checkpoint {
            Checkpoint::Start => Tail::call(self.thunk.clone(), vec![Value::Builtin(Builtin::Exit)]),
            Checkpoint::Paused(k) => Tail::call(k.clone(), vec![Value::Undefined]),
            Checkpoint::Finished(value) => Tail::Value(value.clone()),
        }
    }

    fn next_unfinished(&self, from: usize) -> Option<usize> {
        (from..self.particles.len())
            .find(|&i| !matches!(self.particles[i].checkpoint, Checkpoint::Finished(_)))
    }

    /// Run the next particle, resampling at the barrier
    fn advance(&mut self, rng: &mut Rng) -> Result<Step, EvalError> {
        if let Some(next) = self.next_unfinished(self.current + 1) {
            self.current = next;
            return Ok(Step::Resume(self.resume(next)));
        }

        if self.next_unfinished(0).is_none() {
            return self.finish();
        }
        self.resample(rng)?;
        match self.next_unfinished(0) {
            Some(first) => {
                self.current = first;
                Ok(Step::Resume(self.resume(first)))
            }
            None => self.finish(),
        }
    }

    fn resample(&mut self, rng: &mut Rng) -> Result<(), EvalError> {
        let n = self.particles.len();
        let max = self
            .particles
            .iter()
            .map(|p| p.log_weight)
            .fold(f64::NEG_INFINITY, f64::max);
        if max == f64::NEG_INFINITY {
            return Err(EvalError::ZeroMarginal);
        }

        let weights: Vec<f64> = self
            .particles
            .iter()
            .map(|p| (p.log_weight - max).exp())
            .collect();
        let total: f64 = weights.iter().sum();
        let log_mean = max + (total / n as f64).ln();
        let ess = total * total / weights.iter().map(|w| w * w).sum::<f64>();

        let step = total / n as f64;
        let mut target = rng.gen::<f64>() * step;
        let mut cumulative = weights[0];
        let mut source = 0;
        let mut next = Vec::with_capacity(n);
        for _ in 0..n {
            while target >= cumulative && source + 1 < n {
                source += 1;
                cumulative += weights[source];
            }
            next.push(Particle {
                checkpoint: self.particles[source].checkpoint.clone(),
                log_weight: log_mean,
            });
            target += step;
        }

        self.generation += 1;
        debug!(
            generation = self.generation,
            particles = n,
            ess,
            log_mean,
            "resampled particles"
        );
        self.particles = next;
        Ok(())
    }

    fn finish(&mut self) -> Result<Step, EvalError> {
        let n = self.particles.len() as f64;
        let mut marginal = MarginalAccumulator::new();
        for particle in mem::take(&mut self.particles) {
            if let Checkpoint::Finished(value) = particle.checkpoint {
                marginal.add(value, particle.log_weight - n.ln())?;
            }
        }
        let marginal = marginal.finish()?;
        debug!(
            generations = self.generation,
            values = marginal.entries().len(),
            log_evidence = marginal.log_normalizer(),
            "particle filter finished"
        );
        let caller = mem::replace(&mut self.caller, Value::Undefined);
        let erp: Rc<dyn Erp> = Rc::new(marginal);
        Ok(Step::Finish(Tail::call(caller, vec![Value::Erp(erp)])))
    }

    /// Log of the mean particle weight
    pub fn log_mean_weight(&self) -> f64 {
        let total = self
            .particles
            .iter()
            .fold(f64::NEG_INFINITY, |acc, p| log_add(acc, p.log_weight));
        total - (self.particles.len() as f64).ln()
    }
}

impl Coroutine for ParticleFilter {
    fn name(&self) -> &'static str {
        "ParticleFilter"
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

    fn factor(&mut self, rng: &mut Rng, k: Value, score: f64) -> Result<Step, EvalError> {
        let particle = &mut self.particles[self.current];
        particle.log_weight += score;
        particle.checkpoint = Checkpoint::Paused(k);
        trace!(particle = self.current, score, "particle reached barrier");
        self.advance(rng)
    }

    fn exit(&mut self, rng: &mut Rng, value: Value) -> Result<Step, EvalError> {
        trace!(particle = self.current, value = %value, "particle finished");
        self.particles[self.current].checkpoint = Checkpoint::Finished(value);
        self.advance(rng)
    }
}
