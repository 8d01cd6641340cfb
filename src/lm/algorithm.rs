//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the core implementation of the Levenberg-Marquardt
//! algorithm for nonlinear least-squares optimization. Box constraints are
//! handled by iterating in unbounded internal coordinates that map into the
//! box through [`BoundsTransform`].

use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{RelaxError, Result};
use crate::parameters::bounds::{BoundVectors, BoundsTransform};
use crate::problem::Problem;
use crate::utils::matrix_convert::{ndarray_to_nalgebra, ndarray_vec_to_nalgebra};
use crate::utils::{jacobian, jacobian_parallel};

use super::config::LmConfig;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Whether the optimization converged
    pub success: bool,

    /// A message describing the result
    pub message: String,

    /// The Jacobian matrix at the solution in external coordinates (if requested)
    pub jacobian: Option<Array2<f64>>,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// Status of the iteration.
enum IterationStatus {
    /// Continue iteration
    Continue,

    /// Converged successfully
    Converged(String),

    /// Failed to converge
    Failed(String),
}

/// A problem seen through the bounds transform.
///
/// Parameters handed to `eval` are internal; they are mapped into the box
/// before the wrapped problem is evaluated.
struct InternalProblem<'a, P: Problem + ?Sized> {
    inner: &'a P,
    transforms: Option<Vec<BoundsTransform>>,
}

impl<'a, P: Problem + ?Sized> InternalProblem<'a, P> {
    fn to_external(&self, internal: &Array1<f64>) -> Array1<f64> {
        match &self.transforms {
            Some(t) => internal
                .iter()
                .zip(t.iter())
                .map(|(&v, t)| t.to_external(v))
                .collect(),
            None => internal.clone(),
        }
    }
}

impl<'a, P: Problem + ?Sized> Problem for InternalProblem<'a, P> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.inner.eval(&self.to_external(params))
    }

    fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }

    fn residual_count(&self) -> usize {
        self.inner.residual_count()
    }
}

fn sum_of_squares(r: &Array1<f64>) -> f64 {
    r.iter().map(|r| r.powi(2)).sum()
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self {
            config: LmConfig::default(),
        }
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in cost.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Cap the step length in internal coordinates.
    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.config.max_step = Some(max_step);
        self
    }

    /// Set whether Jacobian columns are evaluated on the rayon pool.
    pub fn with_parallel_jacobian(mut self, parallel: bool) -> Self {
        self.config.parallel_jacobian = parallel;
        self
    }

    /// Set whether to calculate and return the Jacobian at the solution.
    pub fn with_calc_jacobian(mut self, calc_jacobian: bool) -> Self {
        self.config.calc_jacobian = calc_jacobian;
        self
    }

    /// Minimize the sum of squared residuals without bounds.
    pub fn minimize<P: Problem + Sync + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        self.run(problem, initial_params, None)
    }

    /// Minimize the sum of squared residuals inside a box.
    ///
    /// The starting point is clamped into the box. Parameters whose window has
    /// zero width stay fixed at that value.
    pub fn minimize_bounded<P: Problem + Sync + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        bounds: &BoundVectors,
    ) -> Result<LmResult> {
        if bounds.len() != initial_params.len() {
            return Err(RelaxError::DimensionMismatch(format!(
                "Expected {} bounds, got {}",
                initial_params.len(),
                bounds.len()
            )));
        }
        self.run(problem, initial_params, Some(bounds))
    }

    fn run<P: Problem + Sync + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        bounds: Option<&BoundVectors>,
    ) -> Result<LmResult> {
        // Check parameter dimensions
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(RelaxError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let (transforms, mut params) = match bounds {
            Some(b) => {
                let transforms: Vec<BoundsTransform> =
                    (0..b.len()).map(|i| BoundsTransform::new(b.bounds(i))).collect();
                let start = b.clamp(&initial_params);
                let internal = transforms
                    .iter()
                    .zip(start.iter())
                    .map(|(t, &v)| t.to_internal(v))
                    .collect::<std::result::Result<Array1<f64>, _>>()?;
                (Some(transforms), internal)
            }
            None => (None, initial_params),
        };
        let internal = InternalProblem {
            inner: problem,
            transforms,
        };

        let mut lambda = self.config.initial_lambda;
        let mut residuals = internal.eval(&params)?;
        let mut cost = sum_of_squares(&residuals);
        let mut func_evals = 1;
        let mut iterations = 0;
        if !cost.is_finite() {
            return Err(RelaxError::FunctionEvaluation(
                "residuals are not finite at the starting point".to_string(),
            ));
        }

        let (success, message) = 'outer: loop {
            if iterations >= self.config.max_iterations {
                break (
                    false,
                    format!("Maximum iterations ({}) reached", self.config.max_iterations),
                );
            }

            let jac = self.jacobian(&internal, &params)?;
            func_evals += n_params;

            // Compute gradient g = J^T * r
            let g = jac.t().dot(&residuals);
            let gradient_norm = g.iter().map(|v| v * v).sum::<f64>().sqrt();
            if gradient_norm < self.config.gtol {
                break (
                    true,
                    format!(
                        "Gradient convergence: ||g|| = {:.2e} < {:.2e}",
                        gradient_norm, self.config.gtol
                    ),
                );
            }
            let jtj = jac.t().dot(&jac);

            loop {
                let step = match self.calculate_step(&jtj, &g, lambda) {
                    Some(s) => s,
                    None => {
                        lambda = (lambda * self.config.lambda_up_factor).min(self.config.max_lambda);
                        if lambda >= self.config.max_lambda {
                            break 'outer (
                                false,
                                "Failed to calculate step, and lambda reached maximum".to_string(),
                            );
                        }
                        continue;
                    }
                };

                let new_params = &params + &step;
                let new_residuals = internal.eval(&new_params)?;
                func_evals += 1;
                let new_cost = sum_of_squares(&new_residuals);

                if new_cost.is_finite() && new_cost < cost {
                    // Step accepted
                    let param_change = step.iter().map(|x| x.abs()).fold(0.0, f64::max);
                    let cost_change = (cost - new_cost) / cost.max(1e-10);

                    let status = if param_change < self.config.xtol {
                        IterationStatus::Converged(format!(
                            "Parameter convergence: |dx| = {:.2e} < {:.2e}",
                            param_change, self.config.xtol
                        ))
                    } else if cost_change < self.config.ftol {
                        IterationStatus::Converged(format!(
                            "Cost convergence: |df|/|f| = {:.2e} < {:.2e}",
                            cost_change, self.config.ftol
                        ))
                    } else if iterations + 1 >= self.config.max_iterations {
                        IterationStatus::Failed(format!(
                            "Maximum iterations ({}) reached",
                            self.config.max_iterations
                        ))
                    } else {
                        IterationStatus::Continue
                    };

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);
                    iterations += 1;
                    tracing::debug!(iteration = iterations, cost, lambda, "lm step accepted");

                    match status {
                        IterationStatus::Continue => continue 'outer,
                        IterationStatus::Converged(message) => break 'outer (true, message),
                        IterationStatus::Failed(message) => break 'outer (false, message),
                    }
                }

                // Step rejected - increase lambda and try again
                lambda = (lambda * self.config.lambda_up_factor).min(self.config.max_lambda);
                if lambda >= self.config.max_lambda {
                    break 'outer (
                        false,
                        "Failed to decrease cost, and lambda reached maximum".to_string(),
                    );
                }
            }
        };

        let external = internal.to_external(&params);
        let jacobian = if self.config.calc_jacobian {
            let plain = InternalProblem {
                inner: problem,
                transforms: None,
            };
            Some(self.jacobian(&plain, &external)?)
        } else {
            None
        };

        Ok(LmResult {
            params: external,
            residuals,
            cost,
            iterations,
            func_evals,
            success,
            message,
            jacobian,
        })
    }

    fn jacobian<P: Problem + Sync>(&self, problem: &P, params: &Array1<f64>) -> Result<Array2<f64>> {
        if self.config.parallel_jacobian {
            jacobian_parallel(problem, params, None)
        } else {
            jacobian(problem, params, None)
        }
    }

    /// Calculate the Levenberg-Marquardt step.
    ///
    /// Solves `(JᵀJ + λI) δ = Jᵀr` and returns `-δ`, shortened to the
    /// configured maximum length. `None` when the system is singular.
    fn calculate_step(&self, jtj: &Array2<f64>, g: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
        let n = jtj.nrows();
        let mut a = ndarray_to_nalgebra(jtj);
        for i in 0..n {
            a[(i, i)] += lambda;
        }
        let b = ndarray_vec_to_nalgebra(g);

        let delta = match a.clone().cholesky() {
            Some(chol) => chol.solve(&b),
            None => a.lu().solve(&b)?,
        };
        if delta.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let mut step: Array1<f64> = delta.iter().map(|v| -v).collect();
        if let Some(max_step) = self.config.max_step {
            let norm = step.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > max_step {
                step *= max_step / norm;
            }
        }
        Some(step)
    }
}
