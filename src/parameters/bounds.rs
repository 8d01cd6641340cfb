//! Parameter bounds.
//!
//! Box constraints for the global parameter vector, the Minuit-style
//! transformation the Levenberg-Marquardt refiner uses to work in unbounded
//! internal coordinates, and the [`BoundsEngine`] that derives the box for a
//! fit from the guess and the data.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::FitConfig;
use crate::data::FitData;
use crate::error::{RelaxError, Result};
use crate::models::EquationModel;
use crate::parameters::map::ParameterMap;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must be less than max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Infinite parameter value is not allowed")]
    InfiniteValue,
}

/// Represents the bounds constraints on a parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

impl Bounds {
    /// Create a new bounds constraints with min and max values
    ///
    /// # Arguments
    ///
    /// * `min` - Minimum allowed value for the parameter
    /// * `max` - Maximum allowed value for the parameter
    ///
    /// # Returns
    ///
    /// A new `Bounds` object if min <= max, or an error otherwise
    ///
    /// # Examples
    ///
    /// ```
    /// use relaxfit::parameters::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert_eq!(bounds.min, 0.0);
    /// assert_eq!(bounds.max, 10.0);
    /// ```
    pub fn new(min: f64, max: f64) -> std::result::Result<Self, BoundsError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }
        if min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// Check if a value is within the bounds
    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Width of the window.
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Clamp a value to be within the bounds
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Implements the Minuit-style parameter transformation for a box constraint
///
/// The optimizer works with unbounded internal values while the external
/// values stay inside `[min, max]`:
///
/// ```text
/// external = min + (sin(internal) + 1) · (max − min) / 2
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    /// Create a new bounds transform
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    /// Transform an internal parameter value to an external value
    pub fn to_external(&self, internal_value: f64) -> f64 {
        self.bounds.min + (internal_value.sin() + 1.0) * self.bounds.width() / 2.0
    }

    /// Transform an external parameter value to an internal value
    ///
    /// # Returns
    ///
    /// The corresponding internal value, or an error if the external value is outside bounds
    pub fn to_internal(&self, external_value: f64) -> std::result::Result<f64, BoundsError> {
        if !external_value.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }

        if !self.bounds.is_within_bounds(external_value) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external_value,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }

        let width = self.bounds.width();
        if width == 0.0 {
            return Ok(0.0);
        }
        let scaled = 2.0 * (external_value - self.bounds.min) / width - 1.0;

        // Ensure scaled is in [-1, 1] for asin
        Ok(scaled.clamp(-1.0, 1.0).asin())
    }
}

/// Lower and upper bound for every entry of the global parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundVectors {
    /// Lower bounds
    pub lower: Array1<f64>,
    /// Upper bounds
    pub upper: Array1<f64>,
}

impl BoundVectors {
    /// Pair up lower and upper bounds.
    pub fn new(lower: Array1<f64>, upper: Array1<f64>) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(RelaxError::DimensionMismatch(format!(
                "{} lower bounds, {} upper bounds",
                lower.len(),
                upper.len()
            )));
        }
        for (lo, hi) in lower.iter().zip(upper.iter()) {
            Bounds::new(*lo, *hi)?;
        }
        Ok(Self { lower, upper })
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// True when there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Bounds of parameter `i`.
    pub fn bounds(&self, i: usize) -> Bounds {
        Bounds {
            min: self.lower[i],
            max: self.upper[i],
        }
    }

    /// Per-parameter window widths.
    pub fn widths(&self) -> Array1<f64> {
        &self.upper - &self.lower
    }

    /// True when every entry of `x` lies inside its bounds.
    pub fn contains(&self, x: &Array1<f64>) -> bool {
        x.len() == self.len() && (0..self.len()).all(|i| self.bounds(i).is_within_bounds(x[i]))
    }

    /// Clamp every entry of `x` into its bounds.
    pub fn clamp(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::from_shape_fn(x.len(), |i| self.bounds(i).clamp(x[i]))
    }
}

/// Relative distance a bound is moved past a guess it fails to bracket.
const BOUND_MARGIN: f64 = 0.1;

/// Derives the box constraints for a fit.
pub struct BoundsEngine;

impl BoundsEngine {
    /// Compute bounds from the equation's rubric, then make them bracket the
    /// guess strictly.
    ///
    /// A rubric bound that misses or touches its guess is moved past it by
    /// `0.1 · max(|guess|, 1)`; the sine transform cannot move a parameter
    /// that starts on a bound. A lower bound the rubric keeps non-negative
    /// stays non-negative for a positive guess.
    pub fn derive(
        model: &dyn EquationModel,
        guess: &Array1<f64>,
        data: &FitData,
        map: &ParameterMap,
        config: &FitConfig,
    ) -> Result<BoundVectors> {
        if guess.len() != map.n_pars() {
            return Err(RelaxError::DimensionMismatch(format!(
                "guess has {} entries, map needs {}",
                guess.len(),
                map.n_pars()
            )));
        }
        if let Some(i) = guess.iter().position(|g| !g.is_finite()) {
            return Err(RelaxError::InvalidParameter(format!(
                "guess for parameter {} is not finite",
                i
            )));
        }

        let (mut lower, mut upper) = model.bounds(guess, data, map, config);
        for i in 0..guess.len() {
            let g = guess[i];
            let margin = BOUND_MARGIN * g.abs().max(1.0);
            let lo = if lower[i].is_finite() && lower[i] < g {
                lower[i]
            } else if lower[i] >= 0.0 && g > 0.0 {
                (g - margin).max(0.0)
            } else {
                g - margin
            };
            let hi = if upper[i].is_finite() && upper[i] > g {
                upper[i]
            } else {
                g + margin
            };
            lower[i] = lo;
            upper[i] = hi;
        }
        BoundVectors::new(lower, upper)
    }
}
