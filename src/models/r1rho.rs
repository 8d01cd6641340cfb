//! R1ρ relaxation dispersion.
//!
//! Rows are `[offset (ppm), B1 (Hz), relaxation time (s), field (MHz)]`; the
//! observable is the spin-lock relaxation rate itself.

use ndarray::{Array1, ArrayView1};

use super::cest::{r1_window, two_site_sharing, ProfilePeaks, TwoSite, TWO_SITE_PARS};
use super::peak::PeakKind;
use super::{scatter_mean, slot_bounds, EquationModel};
use crate::config::FitConfig;
use crate::data::FitData;
use crate::parameters::map::{ParameterMap, SlotSharing};

fn r1rho_guess(data: &FitData, map: &ParameterMap) -> Option<Array1<f64>> {
    let mut per_curve = Vec::with_capacity(data.n_curves());
    for id in 0..data.n_curves() {
        let p = ProfilePeaks::of_curve(data, id, PeakKind::Maximum)?;
        let r1 = p.baseline.max(0.1);
        let r2a = p.major.value;
        let r2b = p.minor.map_or(r2a, |minor| minor.value.max(r2a));
        per_curve.push(vec![
            p.exchange_rate(),
            p.population(),
            p.delta_a(),
            p.delta_b(),
            r1,
            r1,
            r2a,
            r2b,
        ]);
    }
    Some(scatter_mean(map, &per_curve))
}

fn r1rho_bounds(
    guess: &Array1<f64>,
    data: &FitData,
    map: &ParameterMap,
) -> (Array1<f64>, Array1<f64>) {
    let curves: Vec<Option<ProfilePeaks>> = (0..data.n_curves())
        .map(|id| ProfilePeaks::of_curve(data, id, PeakKind::Maximum))
        .collect();
    slot_bounds(guess, map, |curve, slot, g| {
        let peaks = curves.get(curve).and_then(Option::as_ref);
        let (wa, wb) = peaks.map_or((0.5, 0.5), ProfilePeaks::half_widths_ppm);
        let t = peaks.map_or(0.0, |p| p.t);
        match slot {
            0 => (1.0, 4.0 * g),
            1 => (0.01, 0.25),
            // half width over five: a tenth of the full linewidth
            2 => (g - wa / 5.0, g + wa / 5.0),
            3 => (g - wb / 5.0, g + wb / 5.0),
            4 | 5 => r1_window(g, t, 0.1),
            _ => (0.1, 200.0),
        }
    })
}

/// Second-order perturbation R1ρ (Trott-Palmer).
#[derive(Debug, Clone, Copy, Default)]
pub struct R1rhoPerturbation;

impl EquationModel for R1rhoPerturbation {
    fn name(&self) -> &'static str {
        "R1RHOPERT"
    }

    fn par_names(&self) -> &'static [&'static str] {
        &TWO_SITE_PARS
    }

    fn n_group_pars(&self) -> usize {
        2
    }

    fn n_vars(&self) -> usize {
        4
    }

    fn evaluate(&self, pars: &[f64], map: &[usize], x: ArrayView1<'_, f64>, _curve: usize) -> f64 {
        TwoSite::from_slots(pars, map).r1rho_perturbation(x[0], x[1], x[3]).0
    }

    fn guess(&self, data: &FitData, map: &ParameterMap, _config: &FitConfig) -> Option<Array1<f64>> {
        r1rho_guess(data, map)
    }

    fn bounds(
        &self,
        guess: &Array1<f64>,
        data: &FitData,
        map: &ParameterMap,
        _config: &FitConfig,
    ) -> (Array1<f64>, Array1<f64>) {
        r1rho_bounds(guess, data, map)
    }

    fn slot_sharing(&self, _r2_mask: &[usize]) -> Vec<SlotSharing> {
        two_site_sharing()
    }
}

/// R1ρ as the slowest-decaying spin-locked mode of the Bloch-McConnell
/// equations.
#[derive(Debug, Clone, Copy, Default)]
pub struct R1rhoExact;

impl EquationModel for R1rhoExact {
    fn name(&self) -> &'static str {
        "R1RHOEXACT"
    }

    fn par_names(&self) -> &'static [&'static str] {
        &TWO_SITE_PARS
    }

    fn n_group_pars(&self) -> usize {
        2
    }

    fn n_vars(&self) -> usize {
        4
    }

    fn evaluate(&self, pars: &[f64], map: &[usize], x: ArrayView1<'_, f64>, _curve: usize) -> f64 {
        let site = TwoSite::from_slots(pars, map);
        let matrix = site.relaxation_matrix(x[0], x[1], x[3]);
        let eigenvalues = matrix.complex_eigenvalues();
        // Spin-locked modes are the non-precessing ones.
        let locked = eigenvalues
            .iter()
            .filter(|e| e.im.abs() <= 1e-8 * (1.0 + e.re.abs()))
            .map(|e| e.re)
            .fold(f64::NEG_INFINITY, f64::max);
        if locked.is_finite() {
            -locked
        } else {
            -eigenvalues.iter().map(|e| e.re).fold(f64::NEG_INFINITY, f64::max)
        }
    }

    fn guess(&self, data: &FitData, map: &ParameterMap, _config: &FitConfig) -> Option<Array1<f64>> {
        r1rho_guess(data, map)
    }

    fn bounds(
        &self,
        guess: &Array1<f64>,
        data: &FitData,
        map: &ParameterMap,
        _config: &FitConfig,
    ) -> (Array1<f64>, Array1<f64>) {
        r1rho_bounds(guess, data, map)
    }

    fn slot_sharing(&self, _r2_mask: &[usize]) -> Vec<SlotSharing> {
        two_site_sharing()
    }
}
