//! # relaxfit
//!
//! `relaxfit` fits NMR relaxation-dispersion experiments (CPMG, CEST, R1ρ and
//! plain exponential decays) to extract exchange kinetics and relaxation
//! rates from residue-resolved measurements.
//!
//! The library provides:
//! - A catalogue of dispersion equations behind one capability trait
//! - Parameter maps that let many curves share physical parameters
//! - Data-driven initial guesses and bounds, with an optional pluggable guess
//!   provider
//! - Bounded Levenberg-Marquardt and Nelder-Mead refinement
//! - Resampling uncertainties (parametric Monte Carlo and bootstrap)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use relaxfit::{CurveFitter, Dataset, Equation, FitConfig, Profile};
//!
//! let t = [0.0, 0.02, 0.04, 0.08, 0.16];
//! let y = vec![1.0, 0.82, 0.67, 0.45, 0.2];
//! let profile = Profile::decay("A5", &t, y, vec![0.01; 5])?;
//! let dataset = Dataset::new(vec![profile])?;
//!
//! let fitter = CurveFitter::new(FitConfig::default().with_calc_error(false))?;
//! let result = fitter.fit(Equation::ExpAb, &dataset)?;
//! println!("{}", result.to_json()?);
//! # Ok::<(), relaxfit::RelaxError>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod fit;
pub mod guess;
pub mod lm;
pub mod models;
pub mod optimizer;
pub mod parameters;
pub mod problem;
pub mod uncertainty;
pub mod utils;

// Re-exports for convenience
pub use config::FitConfig;
pub use data::{Dataset, FitData, Profile};
pub use error::{RelaxError, Result};
pub use fit::{CurveFitter, CurveResult, FitProblem, FitResult, FitStats, ParValue};
pub use guess::{CachedProvider, GuessEngine, GuessProvider, Prediction};
pub use lm::LevenbergMarquardt;
pub use models::{Equation, EquationModel};
pub use optimizer::{OptimizerKind, Refinement, Refiner};
pub use parameters::{BoundVectors, ParameterMap, ParameterMapBuilder, SlotSharing};
pub use problem::Problem;
pub use uncertainty::{CancellationToken, Ensemble, ResamplingMode, TrialOutcome};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
