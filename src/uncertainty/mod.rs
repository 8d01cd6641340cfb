//! # Uncertainty Calculation
//!
//! Parameter uncertainties for a completed fit. The primary estimate is
//! empirical: synthetic datasets are drawn around the optimum, each one is
//! refit, and the refit vectors form an [`Ensemble`]. It includes:
//!
//! - Parametric resampling (Gaussian noise scaled by each point's error)
//! - Non-parametric bootstrap of residuals or of data rows
//! - Ensemble statistics: mean, sample standard deviation, median and
//!   percentile intervals
//! - Linearized covariance errors from the Jacobian, used when resampling is
//!   switched off

mod bootstrap;
mod covariance;
mod monte_carlo;

pub use bootstrap::synthetic;
pub use covariance::{
    calculate_correlation, calculate_covariance, standard_errors_from_covariance,
};
pub use monte_carlo::UncertaintyEstimator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// How synthetic datasets are drawn for each trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplingMode {
    /// Perturb every observed value by `N(0, err)`.
    Parametric,
    /// Add residuals drawn with replacement to the fitted curve.
    BootstrapResiduals,
    /// Draw data rows with replacement.
    BootstrapRows,
}

/// Shared flag that stops new resampling trials from starting.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Trials already running finish normally.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one resampling trial.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    /// The refit parameter vector.
    Success(Array1<f64>),
    /// The trial failed; the reason is kept for logging.
    Failure(String),
    /// The trial never started because of cancellation.
    Skipped,
}

/// Represents a central percentile interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Coverage level (e.g., 0.68 for 1-sigma)
    pub level: f64,
    /// Lower bound for each parameter
    pub lower: Array1<f64>,
    /// Upper bound for each parameter
    pub upper: Array1<f64>,
}

/// Empirical distribution of the refit parameter vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    /// One row per successful trial
    pub samples: Array2<f64>,
    /// Mean of each parameter
    pub mean: Array1<f64>,
    /// Sample standard deviation (n - 1) of each parameter
    pub std: Array1<f64>,
    /// Median of each parameter
    pub median: Array1<f64>,
    /// Percentile intervals at each requested level
    pub intervals: Vec<ConfidenceInterval>,
    /// Trials that failed
    pub n_failed: usize,
    /// Trials skipped after cancellation
    pub n_skipped: usize,
}

impl Ensemble {
    /// Aggregate trial outcomes for a vector of `n_pars` parameters.
    ///
    /// With no successful trial every statistic is `NaN`.
    pub fn from_outcomes(outcomes: Vec<TrialOutcome>, n_pars: usize, levels: &[f64]) -> Self {
        let mut rows = Vec::new();
        let (mut n_failed, mut n_skipped) = (0, 0);
        for outcome in outcomes {
            match outcome {
                TrialOutcome::Success(p) if p.len() == n_pars => rows.push(p),
                TrialOutcome::Success(_) | TrialOutcome::Failure(_) => n_failed += 1,
                TrialOutcome::Skipped => n_skipped += 1,
            }
        }

        let mut samples = Array2::zeros((rows.len(), n_pars));
        for (mut row, p) in samples.axis_iter_mut(Axis(0)).zip(&rows) {
            row.assign(p);
        }

        let n = rows.len();
        let nan = || Array1::from_elem(n_pars, f64::NAN);
        let (mean, std, median) = if n == 0 {
            (nan(), nan(), nan())
        } else {
            let mean = samples.mean_axis(Axis(0)).unwrap_or_else(nan);
            let std = if n > 1 {
                samples.std_axis(Axis(0), 1.0)
            } else {
                Array1::zeros(n_pars)
            };
            let median: Array1<f64> = (0..n_pars)
                .map(|j| percentile(&sorted_column(&samples, j), 0.5))
                .collect();
            (mean, std, median)
        };

        let intervals = levels
            .iter()
            .map(|&level| {
                let tail = (1.0 - level) / 2.0;
                let (mut lower, mut upper) = (nan(), nan());
                if n > 0 {
                    for j in 0..n_pars {
                        let column = sorted_column(&samples, j);
                        lower[j] = percentile(&column, tail);
                        upper[j] = percentile(&column, 1.0 - tail);
                    }
                }
                ConfidenceInterval { level, lower, upper }
            })
            .collect();

        Self {
            samples,
            mean,
            std,
            median,
            intervals,
            n_failed,
            n_skipped,
        }
    }

    /// Number of successful trials.
    pub fn n_success(&self) -> usize {
        self.samples.nrows()
    }

    /// Correlation matrix of the sampled parameters.
    pub fn correlation(&self) -> Array2<f64> {
        let n = self.n_success();
        let k = self.samples.ncols();
        if n < 2 {
            return Array2::eye(k);
        }
        let centered = &self.samples - &self.mean;
        let covar = centered.t().dot(&centered) / (n - 1) as f64;
        calculate_correlation(&covar)
    }
}

fn sorted_column(samples: &Array2<f64>, j: usize) -> Vec<f64> {
    let mut column = samples.column(j).to_vec();
    column.sort_by(|a, b| a.total_cmp(b));
    column
}

/// Linearly interpolated quantile `q` of sorted values.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}
