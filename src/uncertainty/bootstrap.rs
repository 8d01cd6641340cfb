//! Synthetic datasets for resampling trials.

use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::ResamplingMode;
use crate::data::FitData;
use crate::error::{RelaxError, Result};

/// Draw one synthetic dataset.
///
/// `fitted` holds the model prediction for every row of `data` at the
/// optimum. Resampling is stratified by curve: residuals and rows are only
/// drawn from the curve they belong to, so every curve keeps its own noise
/// level and point count.
pub fn synthetic<R: Rng>(
    mode: ResamplingMode,
    data: &FitData,
    fitted: &Array1<f64>,
    rng: &mut R,
) -> Result<FitData> {
    if fitted.len() != data.n_points() {
        return Err(RelaxError::DimensionMismatch(format!(
            "Expected {} fitted values, got {}",
            data.n_points(),
            fitted.len()
        )));
    }
    match mode {
        ResamplingMode::Parametric => perturb(data, rng),
        ResamplingMode::BootstrapResiduals => resample_residuals(data, fitted, rng),
        ResamplingMode::BootstrapRows => Ok(resample_rows(data, rng)),
    }
}

/// Add `N(0, err_i)` noise to every observed value.
fn perturb<R: Rng>(data: &FitData, rng: &mut R) -> Result<FitData> {
    let mut y = data.y.clone();
    for (v, &sigma) in y.iter_mut().zip(data.err.iter()) {
        let normal = Normal::new(0.0, sigma)
            .map_err(|e| RelaxError::InvalidInput(format!("error {}: {}", sigma, e)))?;
        *v += normal.sample(rng);
    }
    data.with_y(y)
}

/// Fitted curve plus residuals drawn with replacement from the same curve.
fn resample_residuals<R: Rng>(
    data: &FitData,
    fitted: &Array1<f64>,
    rng: &mut R,
) -> Result<FitData> {
    let residuals = &data.y - fitted;
    let mut y = fitted.clone();
    for id in 0..data.n_curves() {
        let rows = data.rows_of(id);
        for &row in &rows {
            let pick = rows[rng.gen_range(0..rows.len())];
            y[row] += residuals[pick];
        }
    }
    data.with_y(y)
}

/// Rows drawn with replacement, curve by curve.
fn resample_rows<R: Rng>(data: &FitData, rng: &mut R) -> FitData {
    let mut picks = Vec::with_capacity(data.n_points());
    for id in 0..data.n_curves() {
        let rows = data.rows_of(id);
        for _ in 0..rows.len() {
            picks.push(rows[rng.gen_range(0..rows.len())]);
        }
    }
    data.select_rows(&picks)
}
