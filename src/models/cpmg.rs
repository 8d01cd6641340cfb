//! CPMG relaxation-dispersion equations.
//!
//! Rows are `[ν_cpmg (Hz), field_x (MHz), field_h (MHz), τ (s)]`. Chemical
//! shift differences are in ppm and become angular frequencies through the
//! field of the observed nucleus.

use std::f64::consts::{PI, SQRT_2};

use nalgebra::Complex;
use ndarray::{array, Array1, ArrayView1};

use super::{scatter_mean, slot_bounds, CurveStats, EquationModel};
use crate::config::FitConfig;
use crate::data::{FitData, NUCLEUS_AXIS, RESIDUE_AXIS};
use crate::parameters::map::{ParameterMap, SlotSharing};

/// ν_cpmg values (Hz) that external guess providers are trained on.
pub const CPMG_GRID: [f64; 10] = [
    10.0, 20.0, 50.0, 100.0, 200.0, 400.0, 600.0, 800.0, 1000.0, 1100.0,
];

/// Exchange rate of a profile whose dispersion is half complete at `nu_mid`.
///
/// 1.915 solves the fast-exchange dispersion for half its maximal value.
fn kex_from_mid(nu_mid: f64) -> f64 {
    let tau_mid = 1.0 / (2.0 * nu_mid);
    1.915 / (0.5 * tau_mid)
}

/// ν at which the profile crosses halfway between its extremes.
///
/// Linear interpolation between the first pair of points straddling the
/// midpoint; the point closest to it when no pair does.
pub(crate) fn mid_value(nu: &[f64], y: &[f64]) -> f64 {
    let mut pts: Vec<(f64, f64)> = nu.iter().copied().zip(y.iter().copied()).collect();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0));
    let lo = pts.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let hi = pts.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let half = 0.5 * (lo + hi);

    for w in pts.windows(2) {
        let (x0, y0) = w[0];
        let (x1, y1) = w[1];
        if (y0 - half) * (y1 - half) <= 0.0 && y0 != y1 {
            return x0 + (half - y0) * (x1 - x0) / (y1 - y0);
        }
    }
    pts.iter()
        .min_by(|a, b| (a.1 - half).abs().total_cmp(&(b.1 - half).abs()))
        .map_or(0.0, |p| p.0)
}

/// Per-curve `(ν column, y, field)` triples.
fn curves(data: &FitData) -> Vec<(Vec<f64>, Array1<f64>, f64)> {
    (0..data.n_curves())
        .map(|id| {
            let (x, y) = data.curve(id);
            let nu = x.column(0).to_vec();
            let field = x.row(0)[1];
            (nu, y, field)
        })
        .collect()
}

fn cap_kex(kex: f64, max_freq: f64) -> f64 {
    if kex > max_freq {
        0.9 * max_freq
    } else {
        kex
    }
}

/// No exchange: the observable is a flat R2.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEx;

impl EquationModel for NoEx {
    fn name(&self) -> &'static str {
        "NOEX"
    }

    fn par_names(&self) -> &'static [&'static str] {
        &["R2"]
    }

    fn n_group_pars(&self) -> usize {
        0
    }

    fn n_vars(&self) -> usize {
        4
    }

    fn evaluate(&self, pars: &[f64], map: &[usize], _x: ArrayView1<'_, f64>, _curve: usize) -> f64 {
        pars[map[0]]
    }

    fn guess(&self, data: &FitData, map: &ParameterMap, _config: &FitConfig) -> Option<Array1<f64>> {
        let per_curve: Vec<Vec<f64>> = (0..data.n_curves())
            .map(|id| vec![CurveStats::of(&data.curve(id).1).mean])
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
        slot_bounds(guess, map, |_, _, g| (0.0, 4.0 * g))
    }

    fn slot_sharing(&self, r2_mask: &[usize]) -> Vec<SlotSharing> {
        vec![SlotSharing::Masked(r2_mask.to_vec())]
    }

    fn kex(&self, _pars: &[f64]) -> f64 {
        0.0
    }
}

/// Fast-exchange limit (Luz-Meiboom).
#[derive(Debug, Clone, Copy, Default)]
pub struct CpmgFast;

impl CpmgFast {
    fn rex_amplitude(kex: f64, dppm_min: f64, field: f64) -> f64 {
        let dw = 2.0 * PI * dppm_min * field;
        dw * dw / 4.0 / kex
    }
}

impl EquationModel for CpmgFast {
    fn name(&self) -> &'static str {
        "CPMGFAST"
    }

    fn par_names(&self) -> &'static [&'static str] {
        &["Kex", "R2", "dPPMmin"]
    }

    fn n_group_pars(&self) -> usize {
        1
    }

    fn n_vars(&self) -> usize {
        4
    }

    fn evaluate(&self, pars: &[f64], map: &[usize], x: ArrayView1<'_, f64>, _curve: usize) -> f64 {
        let kex = pars[map[0]];
        let r2 = pars[map[1]];
        let dppm_min = pars[map[2]];
        if kex <= 0.0 {
            return r2;
        }
        let nu = x[0];
        let field = x[1];
        let tau_cp = 1.0 / (2.0 * nu);
        let rex = Self::rex_amplitude(kex, dppm_min, field);
        r2 + rex * (1.0 - 2.0 * (0.5 * kex * tau_cp).tanh() / (kex * tau_cp))
    }

    fn guess(&self, data: &FitData, map: &ParameterMap, config: &FitConfig) -> Option<Array1<f64>> {
        let per_curve: Vec<Vec<f64>> = curves(data)
            .into_iter()
            .map(|(nu, y, field)| {
                let stats = CurveStats::of(&y);
                let y = y.to_vec();
                let nu_mid = mid_value(&nu, &y);
                let r2 = 0.95 * stats.min;
                let rex = (stats.max - stats.min).max(0.0);
                let kex = kex_from_mid(nu_mid);
                let dppm_min = (4.0 * rex / (field * field) * kex).sqrt() / (2.0 * PI);
                vec![kex, r2, dppm_min]
            })
            .collect();
        let mut guess = scatter_mean(map, &per_curve);
        for slots in map.iter() {
            guess[slots[0]] = cap_kex(guess[slots[0]], config.cpmg_max_freq);
        }
        Some(guess)
    }

    fn bounds(
        &self,
        guess: &Array1<f64>,
        _data: &FitData,
        map: &ParameterMap,
        config: &FitConfig,
    ) -> (Array1<f64>, Array1<f64>) {
        slot_bounds(guess, map, |_, slot, g| match slot {
            0 => (0.0, (4.0 * g).min(config.cpmg_max_freq)),
            _ => (0.0, 4.0 * g),
        })
    }

    fn slot_sharing(&self, r2_mask: &[usize]) -> Vec<SlotSharing> {
        vec![
            SlotSharing::Shared,
            SlotSharing::Masked(r2_mask.to_vec()),
            SlotSharing::Masked(vec![RESIDUE_AXIS, NUCLEUS_AXIS]),
        ]
    }

    fn rex(&self, pars: &[f64], map: &[usize], field: f64) -> f64 {
        let kex = pars[map[0]];
        if kex <= 0.0 {
            return 0.0;
        }
        Self::rex_amplitude(kex, pars[map[2]], field)
    }

    fn uses_neural_guess(&self) -> bool {
        true
    }
}

/// Guess shared by the two-state population-weighted variants.
///
/// Returns per-curve `(kex, r2, dppm)` with `kex` already capped.
fn population_guess(data: &FitData, pa: f64, max_freq: f64) -> Vec<(f64, f64, f64)> {
    curves(data)
        .into_iter()
        .map(|(nu, y, field)| {
            let stats = CurveStats::of(&y);
            let y = y.to_vec();
            let nu_mid = mid_value(&nu, &y);
            let r2 = 0.95 * stats.min;
            let rex = stats.max - r2;
            let kex = cap_kex(kex_from_mid(nu_mid), max_freq);
            let dw2 = rex / (pa * (1.0 - pa)) * kex;
            let dppm = dw2.sqrt() / (2.0 * PI) / field;
            (kex, r2, dppm)
        })
        .collect()
}

const GUESS_PA: f64 = 0.95;

/// Difference between the slow- and fast-pulsing limits of a profile.
fn rex_from_limits(model: &dyn EquationModel, pars: &[f64], map: &[usize], field: f64) -> f64 {
    if pars[map[0]] <= 0.0 {
        return 0.0;
    }
    let slow = model.evaluate(pars, map, array![10.0, field, 0.0, 0.0].view(), 0);
    let fast = model.evaluate(pars, map, array![1.0e4, field, 0.0, 0.0].view(), 0);
    slow - fast
}

/// Two-state exchange with skewed populations (Carver-Richards).
#[derive(Debug, Clone, Copy, Default)]
pub struct CpmgSlow;

impl EquationModel for CpmgSlow {
    fn name(&self) -> &'static str {
        "CPMGSLOW"
    }

    fn par_names(&self) -> &'static [&'static str] {
        &["Kex", "pA", "R2", "dPPM"]
    }

    fn n_group_pars(&self) -> usize {
        2
    }

    fn n_vars(&self) -> usize {
        4
    }

    fn evaluate(&self, pars: &[f64], map: &[usize], x: ArrayView1<'_, f64>, _curve: usize) -> f64 {
        let kex = pars[map[0]];
        let pa = pars[map[1]];
        let r2 = pars[map[2]];
        let dppm = pars[map[3]];
        if kex <= 0.0 {
            return r2;
        }
        let nu = x[0];
        let field = x[1];
        let pb = 1.0 - pa;
        let p_delta = pa - pb;
        let dw = dppm * field * 2.0 * PI;
        let tau_cp = 1.0 / (2.0 * nu);

        let psi = (p_delta * kex).powi(2) - dw * dw + 4.0 * pa * pb * kex * kex;
        let zeta = -2.0 * dw * kex * p_delta;
        let eta1 = (psi * psi + zeta * zeta).sqrt();
        if eta1 == 0.0 {
            return r2;
        }
        let eta_p = tau_cp / SQRT_2 * (eta1 + psi).max(0.0).sqrt();
        let eta_m = tau_cp / SQRT_2 * (eta1 - psi).max(0.0).sqrt();
        let d1 = (psi + 2.0 * dw * dw) / eta1;
        let d_p = 0.5 * (d1 + 1.0);
        let d_m = 0.5 * (d1 - 1.0);
        let ch = (d_p * eta_p.cosh() - d_m * eta_m.cos()).max(1.0);
        r2 + 0.5 * (kex - ch.acosh() / tau_cp)
    }

    fn guess(&self, data: &FitData, map: &ParameterMap, config: &FitConfig) -> Option<Array1<f64>> {
        let per_curve: Vec<Vec<f64>> = population_guess(data, GUESS_PA, config.cpmg_max_freq)
            .into_iter()
            .map(|(kex, r2, dppm)| vec![kex, GUESS_PA, r2, dppm])
            .collect();
        Some(scatter_mean(map, &per_curve))
    }

    fn bounds(
        &self,
        guess: &Array1<f64>,
        _data: &FitData,
        map: &ParameterMap,
        config: &FitConfig,
    ) -> (Array1<f64>, Array1<f64>) {
        slot_bounds(guess, map, |_, slot, g| match slot {
            0 => (0.0, (4.0 * g).min(config.cpmg_max_freq)),
            1 => (0.5, 0.999),
            _ => (0.0, 4.0 * g),
        })
    }

    fn slot_sharing(&self, r2_mask: &[usize]) -> Vec<SlotSharing> {
        vec![
            SlotSharing::Shared,
            SlotSharing::Shared,
            SlotSharing::Masked(r2_mask.to_vec()),
            SlotSharing::Masked(vec![RESIDUE_AXIS, NUCLEUS_AXIS]),
        ]
    }

    fn rex(&self, pars: &[f64], map: &[usize], field: f64) -> f64 {
        rex_from_limits(self, pars, map, field)
    }

    fn uses_neural_guess(&self) -> bool {
        true
    }
}

/// Multiple-quantum CPMG (Korzhnev et al., JACS 2004).
#[derive(Debug, Clone, Copy, Default)]
pub struct CpmgMq;

impl EquationModel for CpmgMq {
    fn name(&self) -> &'static str {
        "CPMGMQ"
    }

    fn par_names(&self) -> &'static [&'static str] {
        &["kEx", "pA", "R2", "deltaCPPM", "deltaHPPM"]
    }

    fn n_group_pars(&self) -> usize {
        2
    }

    fn n_vars(&self) -> usize {
        4
    }

    fn evaluate(&self, pars: &[f64], map: &[usize], x: ArrayView1<'_, f64>, _curve: usize) -> f64 {
        let kex = pars[map[0]];
        let pa = pars[map[1]];
        let r2 = pars[map[2]];
        let dc_ppm = pars[map[3]];
        let dh_ppm = pars[map[4]];
        if kex <= 0.0 {
            return r2;
        }
        let pb = 1.0 - pa;
        let nu = x[0];
        let field_x = x[1];
        let field_h = x[2];
        let tau = x[3];

        let dc = 2.0 * PI * dc_ppm * field_x;
        let dh = if field_h > 1.0e-6 {
            2.0 * PI * dh_ppm * field_h
        } else {
            0.0
        };
        let delta = 1.0 / (4.0 * nu);
        let re = |v: f64| Complex::new(v, 0.0);

        // λ1
        let num1 = Complex::new((pa - pb) * kex, dh);
        let zeta = num1 * (-2.0 * dc);
        let psi = num1 * num1 - re(dc * dc) + re(4.0 * pa * pb * kex * kex);
        let num2 = (psi * psi + zeta * zeta).sqrt();
        let eta_plus = (num2 + psi).sqrt() * (SQRT_2 * delta);
        let eta_minus = (num2 - psi).sqrt() * (SQRT_2 * delta);
        let d_ratio = (psi + re(2.0 * dc * dc)) / num2;
        let d_plus = (d_ratio + re(1.0)) * 0.5;
        let d_minus = (d_ratio - re(1.0)) * 0.5;
        let num3 = d_plus * eta_plus.cosh() - d_minus * eta_minus.cos();
        let acosh = (num3 + (num3 + re(1.0)).sqrt() * (num3 - re(1.0)).sqrt()).ln();
        let lambda1 = (acosh / (-2.0 * delta) + re(kex)) * 0.5 + re(r2);

        // Q
        let d_p = Complex::new(dh + dc, kex);
        let d_m = Complex::new(dh + dc, -kex);
        let z_p = Complex::new(dh - dc, kex);
        let z_m = Complex::new(dh - dc, -kex);
        let num4 = Complex::new(0.0, kex * (pa * pb).sqrt());
        let m_z = -((d_m - (d_m * delta).sin() / ((d_m + z_m) * delta).sin() * (2.0 * dc))
            * (num4 / (d_m * z_m)));
        let m_d = (z_p + (z_p * delta).sin() / ((d_p + z_p) * delta).sin() * (2.0 * dc))
            * (num4 / (d_p * z_p));
        let q = (re(1.0) - m_d * m_d + m_d * m_z - m_z * m_z + (m_d + m_z) * (0.5 * (pb / pa).sqrt())).re;

        if tau > 1.0e-6 && q > 0.0 {
            lambda1.re - q.ln() / tau
        } else {
            lambda1.re
        }
    }

    fn guess(&self, data: &FitData, map: &ParameterMap, config: &FitConfig) -> Option<Array1<f64>> {
        let per_curve: Vec<Vec<f64>> = population_guess(data, GUESS_PA, config.cpmg_max_freq)
            .into_iter()
            .map(|(kex, r2, dppm)| vec![kex, GUESS_PA, r2, dppm, 0.1])
            .collect();
        Some(scatter_mean(map, &per_curve))
    }

    fn bounds(
        &self,
        guess: &Array1<f64>,
        _data: &FitData,
        map: &ParameterMap,
        config: &FitConfig,
    ) -> (Array1<f64>, Array1<f64>) {
        slot_bounds(guess, map, |_, slot, g| match slot {
            0 => (0.0, (4.0 * g).min(config.cpmg_max_freq)),
            1 => (0.5, 0.999),
            _ => (0.0, 4.0 * g),
        })
    }

    fn slot_sharing(&self, r2_mask: &[usize]) -> Vec<SlotSharing> {
        vec![
            SlotSharing::Shared,
            SlotSharing::Shared,
            SlotSharing::Masked(r2_mask.to_vec()),
            SlotSharing::Masked(vec![RESIDUE_AXIS, NUCLEUS_AXIS]),
            SlotSharing::Masked(vec![RESIDUE_AXIS, NUCLEUS_AXIS]),
        ]
    }

    fn rex(&self, pars: &[f64], map: &[usize], field: f64) -> f64 {
        rex_from_limits(self, pars, map, field)
    }

    fn uses_neural_guess(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, Profile};
    use approx::assert_relative_eq;

    fn row(nu: f64, field: f64) -> Array1<f64> {
        array![nu, field, 0.0, 0.0]
    }

    #[test]
    fn test_noex_is_constant() {
        let pars = [3.0, 17.5];
        for nu in [10.0, 100.0, 1000.0] {
            assert_eq!(NoEx.evaluate(&pars, &[1], row(nu, 60.0).view(), 0), 17.5);
        }
    }

    #[test]
    fn test_fast_worked_example() {
        let pars = [100.0, 10.0, 1.0];
        let value = CpmgFast.evaluate(&pars, &[0, 1, 2], row(50.0, 1.0).view(), 0);
        let tau_cp: f64 = 0.01;
        let dw = 2.0 * PI;
        let rex = dw * dw / 4.0 / 100.0;
        assert_relative_eq!(rex, 0.098696, max_relative = 1e-5);
        let expected = 10.0 + rex * (1.0 - 2.0 * (0.5 * 100.0 * tau_cp).tanh() / (100.0 * tau_cp));
        assert_relative_eq!(value, expected, max_relative = 1e-6);
    }

    #[test]
    fn test_degenerate_kex_returns_r2() {
        for kex in [0.0, -5.0] {
            let pars = [kex, 12.0, 2.0];
            assert_eq!(CpmgFast.evaluate(&pars, &[0, 1, 2], row(100.0, 60.0).view(), 0), 12.0);
            let pars = [kex, 0.9, 12.0, 2.0];
            assert_eq!(CpmgSlow.evaluate(&pars, &[0, 1, 2, 3], row(100.0, 60.0).view(), 0), 12.0);
            let pars = [kex, 0.9, 12.0, 2.0, 0.1];
            let x = array![100.0, 60.0, 600.0, 0.04];
            assert_eq!(CpmgMq.evaluate(&pars, &[0, 1, 2, 3, 4], x.view(), 0), 12.0);
        }
        assert_eq!(CpmgFast.rex(&[0.0, 12.0, 2.0], &[0, 1, 2], 60.0), 0.0);
    }

    #[test]
    fn test_dispersion_decreases_with_pulsing() {
        let pars = [800.0, 0.95, 10.0, 1.5];
        let map = [0, 1, 2, 3];
        let low = CpmgSlow.evaluate(&pars, &map, row(25.0, 60.0).view(), 0);
        let high = CpmgSlow.evaluate(&pars, &map, row(1000.0, 60.0).view(), 0);
        assert!(low > high);
        assert!(high >= 10.0 - 1e-9);
        assert!(CpmgSlow.rex(&pars, &map, 60.0) > 0.0);
    }

    #[test]
    fn test_slow_matches_fast_in_fast_limit() {
        // pA pB Δω² = Δω'² / 4 maps skewed populations onto the fast equation
        let kex = 20000.0;
        let pa: f64 = 0.9;
        let dppm = 0.5;
        let dppm_fast = dppm * (4.0 * pa * (1.0 - pa)).sqrt();
        for nu in [50.0, 200.0, 1000.0] {
            let slow = CpmgSlow.evaluate(&[kex, pa, 10.0, dppm], &[0, 1, 2, 3], row(nu, 60.0).view(), 0);
            let fast = CpmgFast.evaluate(&[kex, 10.0, dppm_fast], &[0, 1, 2], row(nu, 60.0).view(), 0);
            assert_relative_eq!(slow - 10.0, fast - 10.0, max_relative = 0.02);
        }
    }

    #[test]
    fn test_mq_reduces_to_sq_without_proton_shift() {
        // With ΔωH = 0 and no τ correction, λ1 is the single-quantum rate
        let pars = [600.0, 0.93, 15.0, 1.2, 0.0];
        let mq = CpmgMq.evaluate(&pars, &[0, 1, 2, 3, 4], row(100.0, 80.0).view(), 0);
        let sq = CpmgSlow.evaluate(&[600.0, 0.93, 15.0, 1.2], &[0, 1, 2, 3], row(100.0, 80.0).view(), 0);
        assert_relative_eq!(mq, sq, max_relative = 1e-6);
        assert!(mq.is_finite());
    }

    #[test]
    fn test_mid_value_interpolates() {
        let nu = [50.0, 100.0, 200.0, 400.0];
        let y = [20.0, 16.0, 12.0, 10.0];
        // half = 15, between 100 (16) and 200 (12)
        assert_relative_eq!(mid_value(&nu, &y), 125.0);
        assert_eq!(mid_value(&[100.0, 200.0], &[5.0, 5.0]), 100.0);
    }

    fn fast_dataset(fields: &[f64]) -> FitData {
        let nu = [25.0, 50.0, 100.0, 200.0, 400.0, 800.0, 1000.0];
        let pars = [400.0, 12.0, 0.8];
        let profiles = fields
            .iter()
            .enumerate()
            .map(|(i, &field)| {
                let y = nu
                    .iter()
                    .map(|&v| CpmgFast.evaluate(&pars, &[0, 1, 2], row(v, field).view(), 0))
                    .collect();
                Profile::cpmg(format!("r{}", i), &nu, y, vec![0.2; nu.len()], field, 10.0 * field, 0.04)
                    .unwrap()
            })
            .collect();
        Dataset::new(profiles).unwrap().flatten()
    }

    #[test]
    fn test_fast_guess_and_bounds_bracket() {
        let data = fast_dataset(&[60.0, 80.0]);
        let map = CpmgFast.make_shared_map(2);
        let config = FitConfig::default();
        let guess = CpmgFast.guess(&data, &map, &config).unwrap();
        assert_eq!(guess.len(), 5);
        assert!(guess[0] > 0.0 && guess[0] <= config.cpmg_max_freq);
        assert!(guess[1] > 10.0 && guess[1] < 12.5);

        let (lower, upper) = CpmgFast.bounds(&guess, &data, &map, &config);
        for i in 0..guess.len() {
            assert!(lower[i] <= guess[i] && guess[i] <= upper[i], "parameter {}", i);
        }
    }

    #[test]
    fn test_kex_guess_capped() {
        let data = fast_dataset(&[60.0]);
        let map = CpmgSlow.make_shared_map(1);
        let config = FitConfig::default().with_cpmg_max_freq(50.0);
        let guess = CpmgSlow.guess(&data, &map, &config).unwrap();
        assert_relative_eq!(guess[0], 45.0);
        assert_eq!(guess[1], 0.95);
    }
}
