//! Initial parameter estimates.
//!
//! [`GuessEngine`] produces the starting global vector of a fit. Each
//! equation carries a closed-form rubric; CPMG exchange and CEST models may
//! instead be seeded by an external [`GuessProvider`] (typically a trained
//! network). CPMG profiles reach it resampled onto a fixed frequency grid, CEST
//! profiles as the features of their saturation dips. A provider answer
//! is only trusted when it has the right length and every value is finite;
//! anything else falls back to the rubric.

use std::fmt;
use std::sync::{Arc, OnceLock};

use ndarray::Array1;

use crate::config::FitConfig;
use crate::data::FitData;
use crate::error::{RelaxError, Result};
use crate::models::Equation;
use crate::parameters::ParameterMap;

pub mod interpolate;

pub use interpolate::{interpolate, provider_input};

/// Answer of a guess provider.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// A global parameter vector.
    Available(Vec<f64>),
    /// No answer, with the reason.
    Unavailable(String),
}

/// External source of starting values.
///
/// Closures `Fn(Equation, &[f64]) -> Prediction` implement this trait.
pub trait GuessProvider: Send + Sync {
    /// Predict a global parameter vector for `equation` from its input vector.
    fn predict(&self, equation: Equation, input: &[f64]) -> Prediction;
}

impl<F> GuessProvider for F
where
    F: Fn(Equation, &[f64]) -> Prediction + Send + Sync,
{
    fn predict(&self, equation: Equation, input: &[f64]) -> Prediction {
        self(equation, input)
    }
}

type Loader = Box<dyn Fn() -> Result<Arc<dyn GuessProvider>> + Send + Sync>;

/// A provider loaded on first use.
///
/// The loader runs at most once. A load failure is remembered and every
/// later call answers [`Prediction::Unavailable`] without retrying.
pub struct CachedProvider {
    loader: Loader,
    cell: OnceLock<std::result::Result<Arc<dyn GuessProvider>, String>>,
}

impl CachedProvider {
    /// Wrap a loader.
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn GuessProvider>> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            cell: OnceLock::new(),
        }
    }

    /// Whether the loader has run.
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    fn provider(&self) -> &std::result::Result<Arc<dyn GuessProvider>, String> {
        self.cell.get_or_init(|| {
            (self.loader)().map_err(|e| {
                tracing::warn!(error = %e, "guess provider failed to load");
                e.to_string()
            })
        })
    }
}

impl fmt::Debug for CachedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedProvider")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl GuessProvider for CachedProvider {
    fn predict(&self, equation: Equation, input: &[f64]) -> Prediction {
        match self.provider() {
            Ok(provider) => provider.predict(equation, input),
            Err(reason) => Prediction::Unavailable(reason.clone()),
        }
    }
}

/// Builds the starting global vector for a fit.
#[derive(Clone, Default)]
pub struct GuessEngine {
    provider: Option<Arc<dyn GuessProvider>>,
}

impl fmt::Debug for GuessEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuessEngine")
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

impl GuessEngine {
    /// Engine using only the equation rubrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an external provider.
    pub fn with_provider(mut self, provider: Arc<dyn GuessProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Starting values for every global parameter of `map`.
    ///
    /// The provider is consulted only when the equation supports it and
    /// `config.neural_guess` is set.
    pub fn guess(
        &self,
        equation: Equation,
        data: &FitData,
        map: &ParameterMap,
        config: &FitConfig,
    ) -> Result<Array1<f64>> {
        let model = equation.model();
        let n_pars = map.n_pars();

        if config.neural_guess && model.uses_neural_guess() {
            if let Some(guess) = self.from_provider(equation, data, n_pars) {
                return Ok(guess);
            }
        }

        let guess = model
            .guess(data, map, config)
            .ok_or_else(|| RelaxError::GuessUnavailable {
                equation: equation.name().to_string(),
                reason: "the data carry no usable signal".to_string(),
            })?;
        if guess.len() != n_pars || guess.iter().any(|v| !v.is_finite()) {
            return Err(RelaxError::GuessUnavailable {
                equation: equation.name().to_string(),
                reason: format!("rubric produced {} values for {} parameters", guess.len(), n_pars),
            });
        }
        tracing::debug!(equation = %equation, n_pars, "rubric guess");
        Ok(guess)
    }

    fn from_provider(&self, equation: Equation, data: &FitData, n_pars: usize) -> Option<Array1<f64>> {
        let provider = self.provider.as_ref()?;
        let Some(input) = equation.model().provider_input(data) else {
            tracing::warn!(equation = %equation, "data cannot be read for the guess provider");
            return None;
        };
        match provider.predict(equation, &input) {
            Prediction::Available(values)
                if values.len() == n_pars && values.iter().all(|v| v.is_finite()) =>
            {
                tracing::debug!(equation = %equation, n_pars, "provider guess accepted");
                Some(Array1::from(values))
            }
            Prediction::Available(values) => {
                tracing::warn!(
                    equation = %equation,
                    expected = n_pars,
                    got = values.len(),
                    "provider guess rejected, using rubric"
                );
                None
            }
            Prediction::Unavailable(reason) => {
                tracing::warn!(equation = %equation, %reason, "provider unavailable, using rubric");
                None
            }
        }
    }
}
