//! Fit results and goodness-of-fit statistics.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::FitConfig;
use crate::data::Dataset;
use crate::error::Result;
use crate::models::{local_parameters, Equation, EquationModel};
use crate::optimizer::{OptimizerKind, Refinement};
use crate::parameters::ParameterMap;
use crate::problem::Problem;
use crate::uncertainty::{Ensemble, ResamplingMode};

use super::FitProblem;

/// One named parameter of one curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParValue {
    /// Parameter name
    pub name: String,
    /// Fitted value
    pub value: f64,
    /// Standard error
    pub error: f64,
}

/// Parameters of one curve, expanded through the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveResult {
    /// Residue label
    pub label: String,
    /// State descriptor
    pub state: Vec<usize>,
    /// Field of the curve (MHz)
    pub field: f64,
    /// Local parameters in slot order
    pub values: Vec<ParValue>,
    /// Exchange contribution at the curve's field
    pub rex: f64,
}

impl CurveResult {
    /// Look up a parameter by name.
    pub fn value(&self, name: &str) -> Option<&ParValue> {
        self.values.iter().find(|p| p.name == name)
    }
}

/// Goodness-of-fit statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitStats {
    /// Number of data points
    pub n_points: usize,
    /// Number of global parameters
    pub n_pars: usize,
    /// Sum of squared (weighted) residuals
    pub chi_sq: f64,
    /// `chi_sq / (n - k)`; `NaN` without degrees of freedom
    pub reduced_chi_sq: f64,
    /// Root mean square of the unweighted residuals
    pub rms: f64,
    /// Akaike information criterion
    pub aic: f64,
    /// AIC with the small-sample correction; `NaN` when `n - k - 1 <= 0`
    pub aicc: f64,
}

impl FitStats {
    /// Statistics of `params` against the objective's data.
    ///
    /// The absolute-value transform is not applied: `chi_sq` is always a sum
    /// of squares.
    pub fn compute(problem: &FitProblem<'_>, params: &Array1<f64>) -> Result<Self> {
        let weighted = problem.weighted_residuals(params)?;
        let chi_sq: f64 = weighted.iter().map(|r| r * r).sum();
        let raw = problem.predict(params)? - &problem.data().y;
        let n = problem.residual_count();
        let k = problem.parameter_count();
        let rms = (raw.iter().map(|r| r * r).sum::<f64>() / n as f64).sqrt();
        Ok(Self::from_parts(n, k, chi_sq, rms))
    }

    /// Statistics from a residual sum of squares.
    ///
    /// ```text
    /// AIC  = n·ln(RSS/n) + 2k
    /// AICc = AIC + 2k(k+1)/(n-k-1)
    /// ```
    pub fn from_parts(n_points: usize, n_pars: usize, chi_sq: f64, rms: f64) -> Self {
        let n = n_points as f64;
        let k = n_pars as f64;
        let reduced_chi_sq = if n_points > n_pars {
            chi_sq / (n - k)
        } else {
            f64::NAN
        };
        let aic = n * (chi_sq / n).ln() + 2.0 * k;
        let aicc = if n_points > n_pars + 1 {
            aic + 2.0 * k * (k + 1.0) / (n - k - 1.0)
        } else {
            f64::NAN
        };
        Self {
            n_points,
            n_pars,
            chi_sq,
            reduced_chi_sq,
            rms,
            aic,
            aicc,
        }
    }
}

/// Settings a fit ran with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSettings {
    pub refine_optimizer: OptimizerKind,
    pub bootstrap_optimizer: OptimizerKind,
    pub sample_size: usize,
    pub starting_radius: f64,
    pub final_radius: f64,
    pub tolerance: f64,
    pub weight_fit: bool,
    pub abs_value_fit: bool,
    pub resampling: Option<ResamplingMode>,
    /// Wall time of the primary refinement (s)
    pub fit_time: f64,
    /// Wall time of the resampling trials (s)
    pub bootstrap_time: f64,
}

impl FitSettings {
    pub(crate) fn new(config: &FitConfig, fit_time: f64, bootstrap_time: f64) -> Self {
        Self {
            refine_optimizer: config.refine_optimizer,
            bootstrap_optimizer: config.bootstrap_optimizer,
            sample_size: if config.calc_error { config.sample_size } else { 0 },
            starting_radius: config.starting_radius,
            final_radius: config.final_radius,
            tolerance: config.tolerance,
            weight_fit: config.weight_fit,
            abs_value_fit: config.abs_value_fit,
            resampling: config.calc_error.then_some(config.resampling),
            fit_time,
            bootstrap_time,
        }
    }
}

/// Outcome of one fit invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Equation that was fitted
    pub equation: Equation,
    /// Global parameter vector at the optimum
    pub params: Array1<f64>,
    /// Standard error of each global parameter
    pub errors: Array1<f64>,
    /// Local-to-global map used by the fit
    pub map: ParameterMap,
    /// Per-curve parameters
    pub curves: Vec<CurveResult>,
    /// Exchange rate
    pub kex: f64,
    /// Goodness of fit
    pub stats: FitStats,
    /// Diagnostics of the primary refinement
    pub refinement: Refinement,
    /// Settings used
    pub settings: FitSettings,
    /// Resampled parameter vectors, when requested
    pub ensemble: Option<Ensemble>,
}

impl FitResult {
    /// Serialize to pretty-printed JSON. Non-finite numbers become `null`.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The curve with the given label.
    pub fn curve(&self, label: &str) -> Option<&CurveResult> {
        self.curves.iter().find(|c| c.label == label)
    }
}

/// Expand global values and errors into per-curve parameter lists.
pub(crate) fn curve_results(
    model: &dyn EquationModel,
    dataset: &Dataset,
    map: &ParameterMap,
    params: &Array1<f64>,
    errors: &Array1<f64>,
) -> Vec<CurveResult> {
    let pars = params.to_vec();
    let errs = errors.to_vec();
    dataset
        .profiles()
        .iter()
        .zip(map.iter())
        .map(|(profile, slots)| {
            let values = model
                .par_names()
                .iter()
                .zip(local_parameters(&pars, slots))
                .zip(local_parameters(&errs, slots))
                .map(|((name, value), error)| ParValue {
                    name: name.to_string(),
                    value,
                    error,
                })
                .collect();
            CurveResult {
                label: profile.label.clone(),
                state: profile.state.clone(),
                field: profile.field,
                values,
                rex: model.rex(&pars, slots, profile.field),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_information_criteria() {
        let stats = FitStats::from_parts(20, 3, 5.0, 0.4);
        let aic = 20.0 * (5.0f64 / 20.0).ln() + 6.0;
        assert_relative_eq!(stats.aic, aic, epsilon = 1e-12);
        assert_relative_eq!(stats.aicc, aic + 24.0 / 16.0, epsilon = 1e-12);
        assert_relative_eq!(stats.reduced_chi_sq, 5.0 / 17.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_degrees_of_freedom() {
        let stats = FitStats::from_parts(3, 3, 1.0, 0.1);
        assert!(stats.reduced_chi_sq.is_nan());
        assert!(stats.aicc.is_nan());
        assert!(stats.aic.is_finite());
    }

    #[test]
    fn test_curve_value_lookup() {
        let curve = CurveResult {
            label: "42".to_string(),
            state: vec![0, 0, 0, 0],
            field: 80.0,
            values: vec![ParValue {
                name: "R2".to_string(),
                value: 12.0,
                error: 0.3,
            }],
            rex: 0.0,
        };
        assert_eq!(curve.value("R2").map(|p| p.value), Some(12.0));
        assert!(curve.value("Kex").is_none());
    }
}
