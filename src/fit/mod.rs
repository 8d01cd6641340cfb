//! Fit orchestration.
//!
//! [`CurveFitter`] runs the whole pipeline for one equation and one dataset:
//!
//! 1. build the parameter map from the profiles' state descriptors
//! 2. derive the starting vector ([`GuessEngine`]) and the box
//!    ([`BoundsEngine`])
//! 3. refine with the configured [`Refiner`](crate::optimizer::Refiner)
//! 4. estimate uncertainties by resampling, or from the covariance matrix
//!    when resampling is off
//! 5. assemble a [`FitResult`]
//!
//! # Example
//!
//! ```no_run
//! use relaxfit::{CurveFitter, Dataset, Equation, FitConfig, Profile};
//!
//! let nu = [50.0, 100.0, 200.0, 400.0, 800.0];
//! let profile = Profile::cpmg("12", &nu, vec![21.0, 18.5, 15.0, 12.4, 11.2], vec![0.4; 5], 81.1, 800.0, 0.04)?;
//! let dataset = Dataset::new(vec![profile])?;
//! let fitter = CurveFitter::new(FitConfig::default().with_sample_size(20))?;
//! let result = fitter.fit(Equation::CpmgFast, &dataset)?;
//! println!("kex = {:.1}, AICc = {:.2}", result.kex, result.stats.aicc);
//! # Ok::<(), relaxfit::RelaxError>(())
//! ```

use std::sync::Arc;
use std::time::Instant;

use ndarray::Array1;

use crate::config::FitConfig;
use crate::data::Dataset;
use crate::error::{RelaxError, Result};
use crate::guess::{GuessEngine, GuessProvider};
use crate::models::Equation;
use crate::parameters::{BoundsEngine, ParameterMap};
use crate::uncertainty::{
    calculate_covariance, standard_errors_from_covariance, CancellationToken, UncertaintyEstimator,
};
use crate::utils::jacobian_parallel;

pub mod objective;
pub mod result;

pub use objective::FitProblem;
pub use result::{CurveResult, FitResult, FitSettings, FitStats, ParValue};

/// Fits equations to datasets with one set of settings.
#[derive(Debug, Clone)]
pub struct CurveFitter {
    config: FitConfig,
    guesser: GuessEngine,
    cancel: CancellationToken,
}

impl CurveFitter {
    /// Fitter using `config`, which is validated here.
    pub fn new(config: FitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            guesser: GuessEngine::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Attach an external guess provider. It is only consulted when
    /// `neural_guess` is enabled.
    pub fn with_provider(mut self, provider: Arc<dyn GuessProvider>) -> Self {
        self.guesser = self.guesser.with_provider(provider);
        self
    }

    /// Share a cancellation flag with the resampling stage.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The settings in use.
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Grouping-aware parameter map of `equation` for `dataset`.
    pub fn parameter_map(&self, equation: Equation, dataset: &Dataset) -> Result<ParameterMap> {
        equation
            .model()
            .make_state_map(dataset.state_count(), &dataset.states(), &self.config.r2_mask)
    }

    /// Starting global vector the fit would use.
    pub fn guess_parameters(&self, equation: Equation, dataset: &Dataset) -> Result<Array1<f64>> {
        let map = self.parameter_map(equation, dataset)?;
        let data = dataset.flatten();
        FitProblem::new(equation.model(), &data, &map, &self.config)?;
        self.guesser.guess(equation, &data, &map, &self.config)
    }

    /// Fit `equation` to `dataset` from the engine's own guess.
    pub fn fit(&self, equation: Equation, dataset: &Dataset) -> Result<FitResult> {
        self.run(equation, dataset, None)
    }

    /// Fit from a caller-supplied starting vector.
    pub fn fit_with_guess(
        &self,
        equation: Equation,
        dataset: &Dataset,
        guess: Array1<f64>,
    ) -> Result<FitResult> {
        self.run(equation, dataset, Some(guess))
    }

    /// Fit every equation in `equations` and keep the one with the lowest AICc.
    ///
    /// Equations that cannot be fitted are skipped; the error of the last
    /// failure is returned when none succeeds.
    pub fn fit_best(&self, equations: &[Equation], dataset: &Dataset) -> Result<FitResult> {
        let mut best: Option<FitResult> = None;
        let mut last_error = None;
        for &equation in equations {
            match self.fit(equation, dataset) {
                Ok(result) => {
                    let better = best
                        .as_ref()
                        .map_or(true, |b| criterion(&result) < criterion(b));
                    if better {
                        best = Some(result);
                    }
                }
                Err(e) => {
                    tracing::warn!(equation = %equation, error = %e, "equation skipped");
                    last_error = Some(e);
                }
            }
        }
        match (best, last_error) {
            (Some(result), _) => Ok(result),
            (None, Some(e)) => Err(e),
            (None, None) => Err(RelaxError::InvalidInput("no equations to compare".to_string())),
        }
    }

    fn run(&self, equation: Equation, dataset: &Dataset, guess: Option<Array1<f64>>) -> Result<FitResult> {
        let model = equation.model();
        let map = self.parameter_map(equation, dataset)?;
        let data = dataset.flatten();
        let problem = FitProblem::new(model, &data, &map, &self.config)?;

        let guess = match guess {
            Some(g) if g.len() == map.n_pars() => g,
            Some(g) => {
                return Err(RelaxError::DimensionMismatch(format!(
                    "guess has {} entries, {} needs {}",
                    g.len(),
                    equation,
                    map.n_pars()
                )))
            }
            None => self.guesser.guess(equation, &data, &map, &self.config)?,
        };
        let bounds = BoundsEngine::derive(model, &guess, &data, &map, &self.config)?;

        let start = Instant::now();
        let refiner = self.config.refine_optimizer.refiner(&self.config);
        let refinement = refiner.refine(&problem, &bounds, &guess, self.config.starting_radius)?;
        let fit_time = start.elapsed().as_secs_f64();

        let params = refinement.params.clone();
        let stats = FitStats::compute(&problem, &params)?;
        tracing::info!(
            equation = %equation,
            curves = data.n_curves(),
            n_pars = map.n_pars(),
            cost = refinement.cost,
            iterations = refinement.iterations,
            converged = refinement.converged,
            aicc = stats.aicc,
            "fit complete"
        );
        if !refinement.converged {
            tracing::debug!(equation = %equation, message = %refinement.message, "refinement stopped early");
        }

        let start = Instant::now();
        let (errors, ensemble) = if self.config.calc_error {
            let ensemble = UncertaintyEstimator::new(&self.config)
                .with_cancellation(self.cancel.clone())
                .estimate(&problem, &bounds, &params)?;
            (ensemble.std.clone(), Some(ensemble))
        } else {
            (self.covariance_errors(&problem, &params, &stats), None)
        };
        let bootstrap_time = if self.config.calc_error {
            start.elapsed().as_secs_f64()
        } else {
            0.0
        };

        let curves = result::curve_results(model, dataset, &map, &params, &errors);
        Ok(FitResult {
            equation,
            kex: model.kex(&params.to_vec()),
            params,
            errors,
            map,
            curves,
            stats,
            refinement,
            settings: FitSettings::new(&self.config, fit_time, bootstrap_time),
            ensemble,
        })
    }

    /// Linearized standard errors; `NaN` when the Jacobian is singular.
    fn covariance_errors(
        &self,
        problem: &FitProblem<'_>,
        params: &Array1<f64>,
        stats: &FitStats,
    ) -> Array1<f64> {
        let redchi = if stats.reduced_chi_sq.is_finite() {
            stats.reduced_chi_sq
        } else {
            1.0
        };
        let covar = jacobian_parallel(problem, params, None)
            .and_then(|jac| calculate_covariance(&jac, redchi));
        match covar {
            Ok(covar) => standard_errors_from_covariance(&covar),
            Err(e) => {
                tracing::warn!(error = %e, "covariance unavailable, errors left undefined");
                Array1::from_elem(params.len(), f64::NAN)
            }
        }
    }
}

fn criterion(result: &FitResult) -> f64 {
    if result.stats.aicc.is_nan() {
        result.stats.aic
    } else {
        result.stats.aicc
    }
}
