//! Residual function of a multi-curve fit.

use ndarray::Array1;
use rayon::prelude::*;

use crate::config::FitConfig;
use crate::data::FitData;
use crate::error::{RelaxError, Result};
use crate::models::EquationModel;
use crate::parameters::ParameterMap;
use crate::problem::Problem;

/// Residuals of one equation against the flattened rows of a dataset.
///
/// Row `i` contributes `f(x_i) - y_i`, divided by `err_i` when weighting is
/// on. In absolute mode each residual `r` becomes `sign(r)·sqrt(|r|)` so the
/// sum of squares the refiners minimize equals `Σ|r|`.
pub struct FitProblem<'a> {
    model: &'a dyn EquationModel,
    data: &'a FitData,
    map: &'a ParameterMap,
    weight: bool,
    abs: bool,
}

impl<'a> FitProblem<'a> {
    /// Objective with weighting and absolute mode taken from `config`.
    pub fn new(
        model: &'a dyn EquationModel,
        data: &'a FitData,
        map: &'a ParameterMap,
        config: &FitConfig,
    ) -> Result<Self> {
        Self::with_modes(model, data, map, config.weight_fit, config.abs_value_fit)
    }

    /// Objective with explicit weighting and absolute mode.
    pub fn with_modes(
        model: &'a dyn EquationModel,
        data: &'a FitData,
        map: &'a ParameterMap,
        weight: bool,
        abs: bool,
    ) -> Result<Self> {
        if map.n_curves() != data.n_curves() {
            return Err(RelaxError::DimensionMismatch(format!(
                "map has {} curves, data {}",
                map.n_curves(),
                data.n_curves()
            )));
        }
        if data.n_vars() != model.n_vars() {
            return Err(RelaxError::InvalidInput(format!(
                "{} rows need {} variables, got {}",
                model.name(),
                model.n_vars(),
                data.n_vars()
            )));
        }
        if weight {
            if let Some(i) = data.err.iter().position(|&e| e <= 0.0) {
                return Err(RelaxError::InvalidInput(format!(
                    "row {} has a non-positive error, which weighting cannot use",
                    i
                )));
            }
        }
        Ok(Self {
            model,
            data,
            map,
            weight,
            abs,
        })
    }

    /// The rows being fitted.
    pub fn data(&self) -> &'a FitData {
        self.data
    }

    /// The parameter map.
    pub fn map(&self) -> &'a ParameterMap {
        self.map
    }

    /// The equation.
    pub fn model(&self) -> &'a dyn EquationModel {
        self.model
    }

    /// Whether residuals are divided by their errors.
    pub fn is_weighted(&self) -> bool {
        self.weight
    }

    /// Whether the absolute-value transform is applied.
    pub fn is_absolute(&self) -> bool {
        self.abs
    }

    fn check(&self, params: &Array1<f64>) -> Result<Vec<f64>> {
        let n_pars = self.map.n_pars();
        if params.len() != n_pars {
            return Err(RelaxError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_pars,
                params.len()
            )));
        }
        Ok(params.to_vec())
    }

    /// Model prediction for every row.
    pub fn predict(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let pars = self.check(params)?;
        let values: Vec<f64> = (0..self.data.n_points())
            .into_par_iter()
            .map(|i| {
                let id = self.data.ids[i];
                self.model
                    .evaluate(&pars, self.map.curve(id), self.data.x.row(i), id)
            })
            .collect();
        Ok(Array1::from(values))
    }

    /// Residuals before the absolute-mode transform.
    pub fn weighted_residuals(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let mut r = self.predict(params)? - &self.data.y;
        if self.weight {
            r /= &self.data.err;
        }
        Ok(r)
    }
}

impl Problem for FitProblem<'_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let r = self.weighted_residuals(params)?;
        if self.abs {
            Ok(r.mapv(|v| v.signum() * v.abs().sqrt()))
        } else {
            Ok(r)
        }
    }

    fn parameter_count(&self) -> usize {
        self.map.n_pars()
    }

    fn residual_count(&self) -> usize {
        self.data.n_points()
    }
}
