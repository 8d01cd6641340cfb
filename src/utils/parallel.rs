//! Parallel Jacobian evaluation.
//!
//! Columns are independent, so each one is computed on the rayon pool.

use ndarray::{Array1, Array2};
use rayon::prelude::*;

use super::finite_difference::{step_size, DEFAULT_EPSILON};
use crate::error::{RelaxError, Result};
use crate::problem::Problem;

/// Compute the Jacobian matrix using forward finite differences in parallel.
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The relative step size (optional)
pub fn jacobian_parallel(
    problem: &(dyn Problem + Sync),
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    let residuals = problem.eval(params)?;
    if residuals.len() != n_residuals {
        return Err(RelaxError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }

    let columns: Result<Vec<Array1<f64>>> = (0..n_params)
        .into_par_iter()
        .map(|j| {
            let mut params_perturbed = params.clone();
            let eps_j = step_size(params[j], eps);
            params_perturbed[j] += eps_j;

            let residuals_perturbed = problem.eval(&params_perturbed)?;
            Ok((&residuals_perturbed - &residuals) / eps_j)
        })
        .collect();

    let mut jac = Array2::zeros((n_residuals, n_params));
    for (j, column) in columns?.into_iter().enumerate() {
        jac.column_mut(j).assign(&column);
    }

    Ok(jac)
}
