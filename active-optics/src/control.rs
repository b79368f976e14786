//! Gain-damped correction steps toward a metric minimum.
//!
//! The controller treats correction as a general minimization problem: find
//! the state `x*` minimizing the configured [`Metric`], then step only a
//! `gain` fraction of the way there. The minimizer is derivative-free
//! Nelder-Mead started from the origin simplex (a zero initial guess, not
//! the current state), so a quadratic metric like
//! [`SumOfSquares`](crate::metric::SumOfSquares) resolves `x*` to exactly
//! zero and the damped step contracts the state by `1 - gain` per
//! iteration.

use crate::metric::Metric;
use argmin::core::{CostFunction, Error as ArgminError, Executor};
use argmin::solver::neldermead::NelderMead;
use log::debug;
use nalgebra::DVector;
use thiserror::Error;

/// Default edge length of the initial Nelder-Mead simplex, matched to the
/// meter-scale state offsets the loop corrects.
const DEFAULT_SIMPLEX_STEP: f64 = 1.0e-6;

const DEFAULT_MAX_ITERS: u64 = 200;

/// Errors raised by controllers.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The state vector has no entries to optimize.
    #[error("empty state vector")]
    EmptyState,
    /// The minimizer failed to produce a solution.
    #[error("minimizer failed: {0}")]
    NumericalSolveFailure(String),
}

/// Abstract contract: compute the next state and the applied step from the
/// current state.
pub trait Controller {
    fn next_state(&self, current: &DVector<f64>)
        -> Result<(DVector<f64>, DVector<f64>), ControlError>;
}

struct MetricProblem<'a, M> {
    metric: &'a M,
}

impl<M: Metric> CostFunction for MetricProblem<'_, M> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        Ok(self.metric.evaluate(param))
    }
}

/// Minimize a metric, then apply a damped fraction of the move.
///
/// For current state x and minimizer result x*, the applied step is
/// `delta = (x* - x) * gain` and the next state is `x + delta`. The gain
/// must lie in (0, 1].
#[derive(Debug, Clone)]
pub struct GainController<M> {
    metric: M,
    gain: f64,
    simplex_step: f64,
    max_iters: u64,
}

impl<M: Metric> GainController<M> {
    /// Full-gain controller over a metric.
    pub fn new(metric: M) -> Self {
        Self {
            metric,
            gain: 1.0,
            simplex_step: DEFAULT_SIMPLEX_STEP,
            max_iters: DEFAULT_MAX_ITERS,
        }
    }

    /// Set the damping gain, which must lie in (0, 1].
    pub fn with_gain(mut self, gain: f64) -> Self {
        assert!(
            gain > 0.0 && gain <= 1.0,
            "gain must lie in (0, 1], got {}",
            gain
        );
        self.gain = gain;
        self
    }

    /// Set the initial simplex edge length of the minimizer.
    pub fn with_simplex_step(mut self, step: f64) -> Self {
        assert!(step > 0.0);
        self.simplex_step = step;
        self
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Run the minimizer from the origin simplex.
    fn minimize(&self, dim: usize) -> Result<DVector<f64>, ControlError> {
        let mut simplex = Vec::with_capacity(dim + 1);
        simplex.push(vec![0.0; dim]);
        for i in 0..dim {
            let mut vertex = vec![0.0; dim];
            vertex[i] = self.simplex_step;
            simplex.push(vertex);
        }
        let solver = NelderMead::new(simplex)
            .with_sd_tolerance(f64::EPSILON)
            .map_err(|e| ControlError::NumericalSolveFailure(e.to_string()))?;
        let problem = MetricProblem {
            metric: &self.metric,
        };
        let result = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.max_iters))
            .run()
            .map_err(|e| ControlError::NumericalSolveFailure(e.to_string()))?;
        let best = result.state.best_param.ok_or_else(|| {
            ControlError::NumericalSolveFailure("minimizer returned no parameter".to_string())
        })?;
        Ok(DVector::from_vec(best))
    }
}

impl<M: Metric> Controller for GainController<M> {
    fn next_state(
        &self,
        current: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>), ControlError> {
        if current.is_empty() {
            return Err(ControlError::EmptyState);
        }
        let target = self.minimize(current.len())?;
        let delta = (target - current) * self.gain;
        let next = current + &delta;
        debug!(
            "controller step: gain {}, |delta| {:.3e}",
            self.gain,
            delta.norm()
        );
        Ok((next, delta))
    }
}
