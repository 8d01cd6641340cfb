//! Exponential relaxation decays.
//!
//! Rows are `[t]`. These equations fit plain R1 or R2 decay series measured
//! alongside the dispersion experiments.

use ndarray::{Array1, ArrayView1};

use super::{scatter_mean, slot_bounds, EquationModel};
use crate::config::FitConfig;
use crate::data::{FitData, STATE_AXES};
use crate::parameters::map::{ParameterMap, SlotSharing};

const MIN_RATE: f64 = 1e-3;

/// Least-squares line through `(t, ln y)` over the positive points.
///
/// Returns `(amplitude, rate)` of `amplitude · exp(-rate · t)`, or `None`
/// with fewer than two usable points.
fn log_linear_fit(t: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let pairs: Vec<(f64, f64)> = t
        .iter()
        .zip(y.iter())
        .filter(|(_, &y)| y > 0.0)
        .map(|(&t, &y)| (t, y.ln()))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let sum_x: f64 = pairs.iter().map(|p| p.0).sum();
    let sum_y: f64 = pairs.iter().map(|p| p.1).sum();
    let sum_xy: f64 = pairs.iter().map(|p| p.0 * p.1).sum();
    let sum_x2: f64 = pairs.iter().map(|p| p.0 * p.0).sum();
    let denom = n * sum_x2 - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;
    Some((intercept.exp(), -slope))
}

/// `(amplitude, rate)` of the decay in `y - baseline`, with the sign of the
/// amplitude taken from the earliest point.
fn decay_guess(t: &[f64], y: &[f64], baseline: f64) -> (f64, f64) {
    let first = t
        .iter()
        .zip(y.iter())
        .min_by(|a, b| a.0.total_cmp(b.0))
        .map_or(0.0, |(_, &y)| y - baseline);
    let sign = if first < 0.0 { -1.0 } else { 1.0 };
    let shifted: Vec<f64> = y.iter().map(|&v| sign * (v - baseline)).collect();

    let (amp, rate) = log_linear_fit(t, &shifted).unwrap_or_else(|| {
        let span = t.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            - t.iter().copied().fold(f64::INFINITY, f64::min);
        let rate = if span > 0.0 { 1.0 / span } else { 1.0 };
        (first.abs(), rate)
    });
    (sign * amp, rate.max(MIN_RATE))
}

/// Whether the latest point lies above the earliest one.
fn rises(t: &[f64], y: &[f64]) -> bool {
    let first = (0..t.len()).min_by(|&a, &b| t[a].total_cmp(&t[b]));
    let last = (0..t.len()).max_by(|&a, &b| t[a].total_cmp(&t[b]));
    match (first, last) {
        (Some(first), Some(last)) => y[last] > y[first],
        _ => false,
    }
}

fn amplitude_window(a: f64) -> (f64, f64) {
    if a >= 0.0 {
        (0.0, 4.0 * a)
    } else {
        (4.0 * a, 0.0)
    }
}

fn curve_columns(data: &FitData, id: usize) -> (Vec<f64>, Vec<f64>) {
    let (x, y) = data.curve(id);
    (x.column(0).to_vec(), y.to_vec())
}

fn unshared() -> SlotSharing {
    SlotSharing::Masked((0..STATE_AXES).collect())
}

/// Two-parameter decay `A · exp(-R · t)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpAb;

impl EquationModel for ExpAb {
    fn name(&self) -> &'static str {
        "EXPAB"
    }

    fn par_names(&self) -> &'static [&'static str] {
        &["A", "R"]
    }

    fn n_group_pars(&self) -> usize {
        0
    }

    fn n_vars(&self) -> usize {
        1
    }

    fn evaluate(&self, pars: &[f64], map: &[usize], x: ArrayView1<'_, f64>, _curve: usize) -> f64 {
        pars[map[0]] * (-pars[map[1]] * x[0]).exp()
    }

    fn guess(&self, data: &FitData, map: &ParameterMap, _config: &FitConfig) -> Option<Array1<f64>> {
        let per_curve: Vec<Vec<f64>> = (0..data.n_curves())
            .map(|id| {
                let (t, y) = curve_columns(data, id);
                let (a, r) = decay_guess(&t, &y, 0.0);
                vec![a, r]
            })
            .collect();
        Some(scatter_mean(map, &per_curve))
    }

    fn bounds(
        &self,
        guess: &Array1<f64>,
        _data: &FitData,
        map: &ParameterMap,
        _config: &FitConfig,
    ) -> (Array1<f64>, Array1<f64>) {
        slot_bounds(guess, map, |_, slot, g| match slot {
            0 => amplitude_window(g),
            _ => (0.0, 4.0 * g),
        })
    }

    fn slot_sharing(&self, _r2_mask: &[usize]) -> Vec<SlotSharing> {
        vec![unshared(), unshared()]
    }

    fn kex(&self, _pars: &[f64]) -> f64 {
        0.0
    }
}

/// Three-parameter decay `A · exp(-R · t) + C`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpAbc;

impl EquationModel for ExpAbc {
    fn name(&self) -> &'static str {
        "EXPABC"
    }

    fn par_names(&self) -> &'static [&'static str] {
        &["A", "R", "C"]
    }

    fn n_group_pars(&self) -> usize {
        0
    }

    fn n_vars(&self) -> usize {
        1
    }

    fn evaluate(&self, pars: &[f64], map: &[usize], x: ArrayView1<'_, f64>, _curve: usize) -> f64 {
        pars[map[0]] * (-pars[map[1]] * x[0]).exp() + pars[map[2]]
    }

    fn guess(&self, data: &FitData, map: &ParameterMap, _config: &FitConfig) -> Option<Array1<f64>> {
        let per_curve: Vec<Vec<f64>> = (0..data.n_curves())
            .map(|id| {
                let (t, y) = curve_columns(data, id);
                let lo = y.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                // the curve levels off past the extreme it moves toward
                let margin = 0.02 * (hi - lo);
                let baseline = if rises(&t, &y) { hi + margin } else { lo - margin };
                let (a, r) = decay_guess(&t, &y, baseline);
                vec![a, r, baseline]
            })
            .collect();
        Some(scatter_mean(map, &per_curve))
    }

    fn bounds(
        &self,
        guess: &Array1<f64>,
        _data: &FitData,
        map: &ParameterMap,
        _config: &FitConfig,
    ) -> (Array1<f64>, Array1<f64>) {
        slot_bounds(guess, map, |curve, slot, g| match slot {
            0 => amplitude_window(g),
            1 => (0.0, 4.0 * g),
            _ => {
                let a = guess[map.curve(curve)[0]];
                let half = a.abs().max(g.abs());
                (g - half, g + half)
            }
        })
    }

    fn slot_sharing(&self, _r2_mask: &[usize]) -> Vec<SlotSharing> {
        vec![unshared(), unshared(), unshared()]
    }

    fn kex(&self, _pars: &[f64]) -> f64 {
        0.0
    }
}
