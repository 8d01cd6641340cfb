//! Derivative-free refinement with argmin's Nelder-Mead simplex.

use argmin::core::{CostFunction, Error, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use ndarray::Array1;

use super::{Refinement, Refiner};
use crate::config::FitConfig;
use crate::error::{RelaxError, Result};
use crate::parameters::BoundVectors;
use crate::problem::Problem;

/// Cost reported for points where the objective is not finite.
const COST_CEILING: f64 = 1e100;

/// Nelder-Mead refinement inside a box.
///
/// The simplex itself is unconstrained. Each vertex is clamped into the box
/// before the objective is evaluated, and the squared distance to the box
/// (in units of each window) is added as a penalty so the simplex drifts back
/// inside.
#[derive(Debug, Clone)]
pub struct NelderMeadRefiner {
    max_iterations: usize,
    final_radius: f64,
}

impl NelderMeadRefiner {
    /// Refiner with an explicit iteration cap and simplex tolerance.
    pub fn new(max_iterations: usize, final_radius: f64) -> Self {
        Self {
            max_iterations,
            final_radius,
        }
    }

    /// Refiner taking its cap and final radius from the fit settings.
    pub fn from_config(config: &FitConfig) -> Self {
        Self::new(config.max_iterations, config.final_radius)
    }
}

struct PenalizedCost<'a> {
    problem: &'a (dyn Problem + Sync),
    bounds: &'a BoundVectors,
}

impl PenalizedCost<'_> {
    fn penalty(&self, x: &Array1<f64>, clamped: &Array1<f64>) -> f64 {
        x.iter()
            .zip(clamped.iter())
            .zip(self.bounds.widths().iter())
            .map(|((v, c), &w)| {
                let w = if w > 0.0 { w } else { 1.0 };
                ((v - c) / w).powi(2)
            })
            .sum()
    }
}

impl CostFunction for PenalizedCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> std::result::Result<Self::Output, Error> {
        let x = Array1::from(p.clone());
        let clamped = self.bounds.clamp(&x);
        let base = self.problem.eval_cost(&clamped)?;
        if !base.is_finite() {
            return Ok(COST_CEILING);
        }
        let d = self.penalty(&x, &clamped);
        Ok((base * (1.0 + d) + d).min(COST_CEILING))
    }
}

fn initial_simplex(bounds: &BoundVectors, start: &Array1<f64>, radius: f64) -> Vec<Vec<f64>> {
    let widths = bounds.widths();
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for i in 0..start.len() {
        let step = if widths[i] > 0.0 {
            radius * widths[i]
        } else {
            radius * start[i].abs().max(1.0)
        };
        let mut vertex = start.to_vec();
        vertex[i] = if start[i] + step <= bounds.upper[i] {
            start[i] + step
        } else {
            start[i] - step
        };
        simplex.push(vertex);
    }
    simplex
}

impl Refiner for NelderMeadRefiner {
    fn refine(
        &self,
        objective: &(dyn Problem + Sync),
        bounds: &BoundVectors,
        guess: &Array1<f64>,
        radius: f64,
    ) -> Result<Refinement> {
        if guess.len() != bounds.len() || guess.len() != objective.parameter_count() {
            return Err(RelaxError::DimensionMismatch(format!(
                "guess has {} entries, bounds {}, objective {}",
                guess.len(),
                bounds.len(),
                objective.parameter_count()
            )));
        }

        let start = bounds.clamp(guess);
        let cost = PenalizedCost {
            problem: objective,
            bounds,
        };
        let solver: NelderMead<Vec<f64>, f64> =
            NelderMead::new(initial_simplex(bounds, &start, radius))
                .with_sd_tolerance(self.final_radius)
                .map_err(|e| RelaxError::OptimizationFailure(e.to_string()))?;

        let res = Executor::new(cost, solver)
            .configure(|state| state.max_iters(self.max_iterations as u64))
            .run()
            .map_err(|e| RelaxError::OptimizationFailure(e.to_string()))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .cloned()
            .ok_or_else(|| RelaxError::OptimizationFailure("simplex has no best point".to_string()))?;
        let params = bounds.clamp(&Array1::from(best));
        let best_cost = objective.eval_cost(&params)?;
        let reason = state.get_termination_reason();
        let converged = matches!(reason, Some(TerminationReason::SolverConverged));
        let message = reason.map_or_else(|| "not terminated".to_string(), |r| format!("{:?}", r));
        let evaluations = state
            .get_func_counts()
            .get("cost_count")
            .copied()
            .unwrap_or(0) as usize;

        tracing::debug!(
            iterations = state.get_iter(),
            cost = best_cost,
            converged,
            "nelder-mead finished"
        );

        Ok(Refinement {
            params,
            cost: best_cost,
            iterations: state.get_iter() as usize,
            evaluations,
            converged,
            message,
        })
    }
}
