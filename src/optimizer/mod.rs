//! Bounded refiners.
//!
//! A [`Refiner`] takes an objective, a box, a starting point and an initial
//! step radius and returns the best point it found. Running out of
//! iterations is reported through [`Refinement::converged`], not as an error.
//!
//! Two refiners are provided:
//!
//! - [`LmRefiner`]: the crate's Levenberg-Marquardt engine, iterating in the
//!   sine-transformed internal coordinates of [`BoundsTransform`]
//! - [`NelderMeadRefiner`]: argmin's Nelder-Mead simplex on a clamped and
//!   penalized cost
//!
//! [`BoundsTransform`]: crate::parameters::BoundsTransform

use std::f64::consts::PI;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::FitConfig;
use crate::error::Result;
use crate::lm::LevenbergMarquardt;
use crate::parameters::BoundVectors;
use crate::problem::Problem;

pub mod nelder_mead;

pub use nelder_mead::NelderMeadRefiner;

/// Which refiner a fit stage uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Bounded Levenberg-Marquardt.
    LevenbergMarquardt,
    /// Nelder-Mead simplex.
    NelderMead,
}

impl OptimizerKind {
    /// Build the refiner with the iteration cap and tolerances of `config`.
    pub fn refiner(self, config: &FitConfig) -> Box<dyn Refiner> {
        match self {
            OptimizerKind::LevenbergMarquardt => Box::new(LmRefiner::from_config(config)),
            OptimizerKind::NelderMead => Box::new(NelderMeadRefiner::from_config(config)),
        }
    }
}

/// Outcome of one refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refinement {
    /// Best point found, inside the box.
    pub params: Array1<f64>,
    /// Objective value at `params`.
    pub cost: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Objective evaluations.
    pub evaluations: usize,
    /// Whether a convergence criterion was met.
    pub converged: bool,
    /// Termination reason.
    pub message: String,
}

/// A bounded minimizer of a least-squares objective.
pub trait Refiner: Send + Sync {
    /// Minimize `objective` inside `bounds`, starting from `guess`.
    ///
    /// `radius` is the initial step size as a fraction of each parameter's
    /// window.
    fn refine(
        &self,
        objective: &(dyn Problem + Sync),
        bounds: &BoundVectors,
        guess: &Array1<f64>,
        radius: f64,
    ) -> Result<Refinement>;
}

/// Levenberg-Marquardt refinement.
#[derive(Debug, Clone)]
pub struct LmRefiner {
    max_iterations: usize,
    tolerance: f64,
}

impl LmRefiner {
    /// Refiner with an explicit iteration cap and tolerance.
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// Refiner taking its cap and tolerance from the fit settings.
    pub fn from_config(config: &FitConfig) -> Self {
        Self::new(config.max_iterations, config.tolerance)
    }
}

impl Refiner for LmRefiner {
    fn refine(
        &self,
        objective: &(dyn Problem + Sync),
        bounds: &BoundVectors,
        guess: &Array1<f64>,
        radius: f64,
    ) -> Result<Refinement> {
        // A full swing of the sine transform spans π in internal units.
        let lm = LevenbergMarquardt::new()
            .with_max_iterations(self.max_iterations)
            .with_ftol(self.tolerance)
            .with_xtol(self.tolerance)
            .with_gtol(self.tolerance)
            .with_max_step(radius * PI);
        let result = lm.minimize_bounded(objective, guess.clone(), bounds)?;

        Ok(Refinement {
            params: result.params,
            cost: result.cost,
            iterations: result.iterations,
            evaluations: result.func_evals,
            converged: result.success,
            message: result.message,
        })
    }
}
