//! Fit settings.
//!
//! `FitConfig` gathers every tunable that the guess, bounds, refinement and
//! resampling stages read. It is passed explicitly to each stage; nothing is
//! held in process-wide state. Settings can be built in code with the
//! `with_*` methods or loaded from JSON, where missing fields take their
//! defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::STATE_AXES;
use crate::error::{RelaxError, Result};
use crate::optimizer::OptimizerKind;
use crate::uncertainty::ResamplingMode;

/// Settings for a single fit invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Highest CPMG pulsing frequency (Hz) the exchange rate is allowed to reach.
    pub cpmg_max_freq: f64,

    /// Refiner used for the primary fit.
    pub refine_optimizer: OptimizerKind,

    /// Refiner used for each resampling trial.
    pub bootstrap_optimizer: OptimizerKind,

    /// Initial step radius, as a fraction of each parameter's bound window.
    pub starting_radius: f64,

    /// Simplex spread at which Nelder-Mead stops.
    pub final_radius: f64,

    /// Relative tolerance on cost and parameter change.
    pub tolerance: f64,

    /// Iteration cap for a single refinement.
    pub max_iterations: usize,

    /// Divide residuals by their per-point error.
    pub weight_fit: bool,

    /// Minimize the sum of absolute residuals instead of squares.
    pub abs_value_fit: bool,

    /// Run the resampling error estimate after the fit.
    pub calc_error: bool,

    /// Number of resampling trials.
    pub sample_size: usize,

    /// How synthetic datasets are drawn for each trial.
    pub resampling: ResamplingMode,

    /// Base seed for the per-trial random streams.
    pub seed: u64,

    /// Worker threads for resampling; `None` uses the global rayon pool.
    pub threads: Option<usize>,

    /// Consult the attached guess provider before the rubric guesser.
    pub neural_guess: bool,

    /// State axes along which R2 varies independently.
    pub r2_mask: Vec<usize>,

    /// Central coverage levels reported for each parameter's ensemble.
    pub confidence_levels: Vec<f64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            cpmg_max_freq: 2000.0,
            refine_optimizer: OptimizerKind::LevenbergMarquardt,
            bootstrap_optimizer: OptimizerKind::LevenbergMarquardt,
            starting_radius: 0.1,
            final_radius: 1e-6,
            tolerance: 1e-8,
            max_iterations: 200,
            weight_fit: true,
            abs_value_fit: false,
            calc_error: true,
            sample_size: 50,
            resampling: ResamplingMode::Parametric,
            seed: 0,
            threads: None,
            neural_guess: false,
            r2_mask: vec![0, 1, 3],
            confidence_levels: vec![0.68, 0.95],
        }
    }
}

impl FitConfig {
    /// Parse settings from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: FitConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize the settings to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.cpmg_max_freq > 0.0) {
            return Err(RelaxError::InvalidInput(format!(
                "cpmg_max_freq must be positive, got {}",
                self.cpmg_max_freq
            )));
        }
        if !(self.starting_radius > 0.0 && self.starting_radius <= 1.0) {
            return Err(RelaxError::InvalidInput(format!(
                "starting_radius must be in (0, 1], got {}",
                self.starting_radius
            )));
        }
        if !(self.final_radius > 0.0) || !(self.tolerance > 0.0) {
            return Err(RelaxError::InvalidInput(
                "final_radius and tolerance must be positive".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(RelaxError::InvalidInput(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.calc_error && self.sample_size == 0 {
            return Err(RelaxError::InvalidInput(
                "sample_size must be at least 1 when calc_error is set".to_string(),
            ));
        }
        if self.threads == Some(0) {
            return Err(RelaxError::InvalidInput("threads must be at least 1".to_string()));
        }
        if let Some(&axis) = self.r2_mask.iter().find(|&&a| a >= STATE_AXES) {
            return Err(RelaxError::InvalidInput(format!(
                "r2_mask axis {} is out of range (0..{})",
                axis, STATE_AXES
            )));
        }
        if let Some(level) = self
            .confidence_levels
            .iter()
            .find(|&&p| !(p > 0.0 && p < 1.0))
        {
            return Err(RelaxError::InvalidInput(format!(
                "confidence level {} must be in (0, 1)",
                level
            )));
        }
        Ok(())
    }

    /// Set the refiner for the primary fit.
    pub fn with_refine_optimizer(mut self, kind: OptimizerKind) -> Self {
        self.refine_optimizer = kind;
        self
    }

    /// Set the refiner for resampling trials.
    pub fn with_bootstrap_optimizer(mut self, kind: OptimizerKind) -> Self {
        self.bootstrap_optimizer = kind;
        self
    }

    /// Set the initial step radius.
    pub fn with_starting_radius(mut self, radius: f64) -> Self {
        self.starting_radius = radius;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Enable or disable error weighting of residuals.
    pub fn with_weighting(mut self, weight_fit: bool) -> Self {
        self.weight_fit = weight_fit;
        self
    }

    /// Enable or disable absolute-value fitting.
    pub fn with_abs_value_fit(mut self, abs_value_fit: bool) -> Self {
        self.abs_value_fit = abs_value_fit;
        self
    }

    /// Enable or disable the resampling error estimate.
    pub fn with_calc_error(mut self, calc_error: bool) -> Self {
        self.calc_error = calc_error;
        self
    }

    /// Set the number of resampling trials.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Set the resampling mode.
    pub fn with_resampling(mut self, mode: ResamplingMode) -> Self {
        self.resampling = mode;
        self
    }

    /// Set the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Use a dedicated pool with this many workers for resampling.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Enable or disable the external guess provider.
    pub fn with_neural_guess(mut self, neural_guess: bool) -> Self {
        self.neural_guess = neural_guess;
        self
    }

    /// Set the state axes along which R2 varies.
    pub fn with_r2_mask(mut self, mask: Vec<usize>) -> Self {
        self.r2_mask = mask;
        self
    }

    /// Set the highest CPMG frequency.
    pub fn with_cpmg_max_freq(mut self, freq: f64) -> Self {
        self.cpmg_max_freq = freq;
        self
    }
}
