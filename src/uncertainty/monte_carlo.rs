//! # Resampling Uncertainty Estimation
//!
//! Each trial draws a synthetic dataset around the optimum and refits it
//! starting from the optimum with half the configured starting radius. Trials
//! are independent: each one owns a `ChaCha8Rng` seeded from the configured
//! seed with its stream set to the trial index, so an ensemble is
//! reproducible regardless of how the trials are scheduled.

use ndarray::Array1;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::bootstrap::synthetic;
use super::{CancellationToken, Ensemble, TrialOutcome};
use crate::config::FitConfig;
use crate::error::{RelaxError, Result};
use crate::fit::FitProblem;
use crate::optimizer::Refiner;
use crate::parameters::BoundVectors;

/// Runs resampling trials and aggregates them into an [`Ensemble`].
pub struct UncertaintyEstimator<'a> {
    config: &'a FitConfig,
    cancel: CancellationToken,
}

impl<'a> UncertaintyEstimator<'a> {
    /// Estimator following `config`'s sample size, mode, seed and threads.
    pub fn new(config: &'a FitConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting new trials once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Resample around `optimum` and refit every synthetic dataset.
    ///
    /// Failed trials are logged and counted; they never abort the run.
    pub fn estimate(
        &self,
        problem: &FitProblem<'_>,
        bounds: &BoundVectors,
        optimum: &Array1<f64>,
    ) -> Result<Ensemble> {
        let fitted = problem.predict(optimum)?;
        let refiner = self.config.bootstrap_optimizer.refiner(self.config);
        let n_trials = self.config.sample_size;

        let run = || {
            (0..n_trials)
                .into_par_iter()
                .map(|index| self.trial(index, problem, refiner.as_ref(), bounds, optimum, &fitted))
                .collect::<Vec<_>>()
        };
        let outcomes = match self.config.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| RelaxError::InvalidInput(format!("thread pool: {}", e)))?
                .install(run),
            None => run(),
        };

        let ensemble = Ensemble::from_outcomes(outcomes, optimum.len(), &self.config.confidence_levels);
        tracing::info!(
            trials = n_trials,
            succeeded = ensemble.n_success(),
            failed = ensemble.n_failed,
            skipped = ensemble.n_skipped,
            mode = ?self.config.resampling,
            "resampling complete"
        );
        Ok(ensemble)
    }

    fn trial(
        &self,
        index: usize,
        problem: &FitProblem<'_>,
        refiner: &dyn Refiner,
        bounds: &BoundVectors,
        optimum: &Array1<f64>,
        fitted: &Array1<f64>,
    ) -> TrialOutcome {
        if self.cancel.is_cancelled() {
            return TrialOutcome::Skipped;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        rng.set_stream(index as u64);

        let refit = synthetic(self.config.resampling, problem.data(), fitted, &mut rng).and_then(|data| {
            let trial_problem = FitProblem::with_modes(
                problem.model(),
                &data,
                problem.map(),
                problem.is_weighted(),
                problem.is_absolute(),
            )?;
            refiner.refine(&trial_problem, bounds, optimum, self.config.starting_radius / 2.0)
        });

        match refit {
            Ok(refinement) if refinement.params.iter().all(|v| v.is_finite()) => {
                TrialOutcome::Success(refinement.params)
            }
            Ok(_) => {
                tracing::warn!(trial = index, "resampling trial produced non-finite parameters");
                TrialOutcome::Failure("non-finite parameters".to_string())
            }
            Err(e) => {
                tracing::warn!(trial = index, error = %e, "resampling trial failed");
                TrialOutcome::Failure(e.to_string())
            }
        }
    }
}
