//! Chemical exchange saturation transfer.
//!
//! Rows are `[offset (ppm), B1 (Hz), saturation time (s), field (MHz)]` and
//! the observable is the longitudinal magnetization of the major state after
//! saturation, normalized to its equilibrium value.
//!
//! Both CEST equations and the R1ρ equations in [`super::r1rho`] share the
//! two-site parameter layout `[kex, pB, δA, δB, R1A, R1B, R2A, R2B]`, with
//! the exchange rate and minor population shared by a group of curves.

use std::f64::consts::PI;

use nalgebra::{DMatrix, SMatrix, SVector};
use ndarray::{Array1, ArrayView1};

use super::peak::{find_peaks, Peak, PeakKind};
use super::{scatter_mean, slot_bounds, EquationModel};
use crate::config::FitConfig;
use crate::data::{FitData, RESIDUE_AXIS};
use crate::parameters::map::{ParameterMap, SlotSharing};

pub(crate) const TWO_SITE_PARS: [&str; 8] =
    ["kex", "pB", "deltaA", "deltaB", "R1A", "R1B", "R2A", "R2B"];

/// Local parameters of a two-site exchanging spin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TwoSite {
    pub kex: f64,
    pub pb: f64,
    pub delta_a: f64,
    pub delta_b: f64,
    pub r1a: f64,
    pub r1b: f64,
    pub r2a: f64,
    pub r2b: f64,
}

impl TwoSite {
    pub(crate) fn from_slots(pars: &[f64], map: &[usize]) -> Self {
        Self {
            kex: pars[map[0]],
            pb: pars[map[1]],
            delta_a: pars[map[2]],
            delta_b: pars[map[3]],
            r1a: pars[map[4]],
            r1b: pars[map[5]],
            r2a: pars[map[6]],
            r2b: pars[map[7]],
        }
    }

    pub(crate) fn pa(&self) -> f64 {
        1.0 - self.pb
    }

    /// Offsets of both states from the carrier (rad/s).
    pub(crate) fn omegas(&self, offset_ppm: f64, field: f64) -> (f64, f64) {
        (
            2.0 * PI * (self.delta_a - offset_ppm) * field,
            2.0 * PI * (self.delta_b - offset_ppm) * field,
        )
    }

    /// Homogeneous Bloch-McConnell matrix over `[xA, yA, zA, xB, yB, zB]`.
    pub(crate) fn relaxation_matrix(&self, offset_ppm: f64, b1_hz: f64, field: f64) -> DMatrix<f64> {
        let (oa, ob) = self.omegas(offset_ppm, field);
        let w1 = 2.0 * PI * b1_hz;
        let k_ab = self.pb * self.kex;
        let k_ba = self.pa() * self.kex;
        #[rustfmt::skip]
        let rows = [
            -self.r2a - k_ab, -oa,              0.0,              k_ba,             0.0,              0.0,
            oa,               -self.r2a - k_ab, -w1,              0.0,              k_ba,             0.0,
            0.0,              w1,               -self.r1a - k_ab, 0.0,              0.0,              k_ba,
            k_ab,             0.0,              0.0,              -self.r2b - k_ba, -ob,              0.0,
            0.0,              k_ab,             0.0,              ob,               -self.r2b - k_ba, -w1,
            0.0,              0.0,              k_ab,             0.0,              w1,               -self.r1b - k_ba,
        ];
        DMatrix::from_row_slice(6, 6, &rows)
    }

    /// Second-order perturbation estimate of R1ρ (Trott-Palmer).
    ///
    /// Returns the rate together with `cos²θ` of the population-averaged
    /// effective field.
    pub(crate) fn r1rho_perturbation(&self, offset_ppm: f64, b1_hz: f64, field: f64) -> (f64, f64) {
        let pa = self.pa();
        let pb = self.pb;
        let (oa, ob) = self.omegas(offset_ppm, field);
        let w1 = 2.0 * PI * b1_hz;
        let w1_sq = w1 * w1;

        let o_avg = pa * oa + pb * ob;
        let weff_sq = o_avg * o_avg + w1_sq;
        let (sin_sq, cos_sq) = if weff_sq > 0.0 {
            (w1_sq / weff_sq, o_avg * o_avg / weff_sq)
        } else {
            (0.0, 1.0)
        };
        let r1 = pa * self.r1a + pb * self.r1b;
        let r2 = pa * self.r2a + pb * self.r2b;

        let wa_sq = oa * oa + w1_sq;
        let wb_sq = ob * ob + w1_sq;
        let dw = ob - oa;
        let denom = if weff_sq > 0.0 {
            wa_sq * wb_sq / weff_sq + self.kex * self.kex
        } else {
            self.kex * self.kex
        };
        let rex = if denom > 0.0 {
            sin_sq * pa * pb * dw * dw * self.kex / denom
        } else {
            0.0
        };
        (r1 * cos_sq + r2 * sin_sq + rex, cos_sq)
    }
}

pub(crate) fn two_site_sharing() -> Vec<SlotSharing> {
    let mut sharing = vec![SlotSharing::Shared, SlotSharing::Shared];
    sharing.extend(std::iter::repeat(SlotSharing::Masked(vec![RESIDUE_AXIS])).take(6));
    sharing
}

/// Peaks and acquisition constants of one saturation or R1ρ profile.
#[derive(Debug, Clone)]
pub(crate) struct ProfilePeaks {
    pub major: Peak,
    pub minor: Option<Peak>,
    pub baseline: f64,
    pub t: f64,
    pub field: f64,
}

impl ProfilePeaks {
    /// Pick the two strongest peaks of curve `id`; `None` when it is flat.
    pub(crate) fn of_curve(data: &FitData, id: usize, kind: PeakKind) -> Option<Self> {
        let (x, y) = data.curve(id);
        let field = data.fields[id];
        let offsets = x.column(0).to_vec();
        let values = y.to_vec();
        let peaks = find_peaks(&offsets, &values, field, kind, 2);
        let major = *peaks.first()?;
        let baseline = match kind {
            PeakKind::Dip => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            PeakKind::Maximum => values.iter().copied().fold(f64::INFINITY, f64::min),
        };
        Some(Self {
            major,
            minor: peaks.get(1).copied(),
            baseline,
            t: x.row(0)[2],
            field,
        })
    }

    fn minor_or_major(&self) -> &Peak {
        self.minor.as_ref().unwrap_or(&self.major)
    }

    /// Minor population from relative peak heights.
    pub(crate) fn population(&self) -> f64 {
        match &self.minor {
            Some(minor) => {
                (minor.amplitude / (self.major.amplitude + minor.amplitude)).clamp(0.02, 0.24)
            }
            None => 0.05,
        }
    }

    /// Exchange rate from the minor state linewidth.
    pub(crate) fn exchange_rate(&self) -> f64 {
        match &self.minor {
            Some(minor) => (PI * minor.width_hz).max(20.0),
            None => 150.0,
        }
    }

    pub(crate) fn delta_a(&self) -> f64 {
        self.major.position
    }

    pub(crate) fn delta_b(&self) -> f64 {
        self.minor_or_major().position
    }

    /// Half linewidths of the two states (ppm).
    pub(crate) fn half_widths_ppm(&self) -> (f64, f64) {
        let to_ppm = |p: &Peak| {
            if self.field.abs() > 0.0 {
                0.5 * p.width_hz / self.field.abs()
            } else {
                0.5
            }
        };
        (to_ppm(&self.major), to_ppm(self.minor_or_major()))
    }
}

/// Window of R1 values whose relaxation loss over `t` stays within
/// `±intensity` of the guessed one.
pub(crate) fn r1_window(r1: f64, t: f64, intensity: f64) -> (f64, f64) {
    if !(t > 0.0) {
        return (0.0, 4.0 * r1.abs() + 1.0);
    }
    let i0 = (-r1 * t).exp();
    let hi_intensity = (i0 + intensity).min(1.0 - 1e-6);
    let lo_intensity = (i0 - intensity).max(1e-3);
    let lo = (-hi_intensity.ln() / t).max(0.0);
    let hi = -lo_intensity.ln() / t;
    (lo, hi)
}

/// Column of the saturation field in a CEST row.
const B1_COLUMN: usize = 1;

/// Guess provider input read off the saturation profiles.
///
/// Per curve, in curve order: position (ppm), depth and width (Hz) of the
/// major then the minor dip, the unsaturated baseline, then B1, saturation
/// time and field. A profile with a single dip repeats it as the minor one.
/// `None` when a curve has no dip.
pub(crate) fn saturation_features(data: &FitData) -> Option<Vec<f64>> {
    let mut input = Vec::with_capacity(data.n_curves() * 10);
    for id in 0..data.n_curves() {
        let p = ProfilePeaks::of_curve(data, id, PeakKind::Dip)?;
        let minor = p.minor_or_major();
        let (x, _) = data.curve(id);
        input.extend([
            p.major.position,
            p.major.amplitude,
            p.major.width_hz,
            minor.position,
            minor.amplitude,
            minor.width_hz,
            p.baseline,
            x.row(0)[B1_COLUMN],
            p.t,
            p.field,
        ]);
    }
    Some(input)
}

fn cest_guess(data: &FitData, map: &ParameterMap) -> Option<Array1<f64>> {
    let mut per_curve = Vec::with_capacity(data.n_curves());
    for id in 0..data.n_curves() {
        let p = ProfilePeaks::of_curve(data, id, PeakKind::Dip)?;
        let r1 = if p.baseline < 0.95 && p.baseline > 0.0 && p.t > 0.0 {
            -p.baseline.ln() / p.t
        } else {
            2.5
        };
        let r2a = (PI * p.major.width_hz).max(2.5);
        let r2b = (PI * p.minor_or_major().width_hz).max(r2a);
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

fn cest_bounds(
    guess: &Array1<f64>,
    data: &FitData,
    map: &ParameterMap,
) -> (Array1<f64>, Array1<f64>) {
    let curves: Vec<Option<ProfilePeaks>> = (0..data.n_curves())
        .map(|id| ProfilePeaks::of_curve(data, id, PeakKind::Dip))
        .collect();
    slot_bounds(guess, map, |curve, slot, g| {
        let peaks = curves.get(curve).and_then(Option::as_ref);
        let (wa, wb) = peaks.map_or((0.5, 0.5), ProfilePeaks::half_widths_ppm);
        let t = peaks.map_or(0.0, |p| p.t);
        match slot {
            0 => (1.0, 6.0 * g),
            1 => (0.01, 0.25),
            2 => (g - wa, g + wa),
            3 => (g - wb, g + wb),
            4 | 5 => r1_window(g, t, 0.1),
            6 => (2.0, 6.0 * g),
            _ => (2.0, (6.0 * g).max(200.0)),
        }
    })
}

/// Exact two-site CEST by propagating the Bloch-McConnell equations.
#[derive(Debug, Clone, Copy, Default)]
pub struct CestExact;

impl CestExact {
    /// Longitudinal major-state magnetization after saturation, over pA.
    fn intensity(site: &TwoSite, offset_ppm: f64, b1_hz: f64, t: f64, field: f64) -> f64 {
        let pa = site.pa();
        let pb = site.pb;
        let inner = site.relaxation_matrix(offset_ppm, b1_hz, field);

        // Augment with a constant component carrying the R1 recovery terms.
        let mut l = SMatrix::<f64, 7, 7>::zeros();
        for i in 0..6 {
            for j in 0..6 {
                l[(i + 1, j + 1)] = inner[(i, j)];
            }
        }
        l[(3, 0)] = site.r1a * pa;
        l[(6, 0)] = site.r1b * pb;

        let m0 = SVector::<f64, 7>::from_column_slice(&[1.0, 0.0, 0.0, pa, 0.0, 0.0, pb]);
        let m = (l * t).exp() * m0;
        if pa > 0.0 {
            m[3] / pa
        } else {
            m[3]
        }
    }
}

impl EquationModel for CestExact {
    fn name(&self) -> &'static str {
        "CESTEXACT"
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
        Self::intensity(&site, x[0], x[1], x[2], x[3])
    }

    fn guess(&self, data: &FitData, map: &ParameterMap, _config: &FitConfig) -> Option<Array1<f64>> {
        cest_guess(data, map)
    }

    fn bounds(
        &self,
        guess: &Array1<f64>,
        data: &FitData,
        map: &ParameterMap,
        _config: &FitConfig,
    ) -> (Array1<f64>, Array1<f64>) {
        cest_bounds(guess, data, map)
    }

    fn slot_sharing(&self, _r2_mask: &[usize]) -> Vec<SlotSharing> {
        two_site_sharing()
    }

    fn uses_neural_guess(&self) -> bool {
        true
    }

    fn provider_input(&self, data: &FitData) -> Option<Vec<f64>> {
        saturation_features(data)
    }
}

/// CEST from the R1ρ perturbation approximation.
///
/// Saturation is modelled as monoexponential decay along the averaged
/// effective field at the perturbation-theory R1ρ, recovering toward the
/// R1-determined steady state.
#[derive(Debug, Clone, Copy, Default)]
pub struct CestR1rhoPerturbation;

impl EquationModel for CestR1rhoPerturbation {
    fn name(&self) -> &'static str {
        "CESTR1RHOPERT"
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
        let (offset, b1, t, field) = (x[0], x[1], x[2], x[3]);
        let (r1rho, cos_sq) = site.r1rho_perturbation(offset, b1, field);
        if r1rho <= 0.0 {
            return cos_sq;
        }
        let r1 = site.pa() * site.r1a + site.pb * site.r1b;
        let decay = (-r1rho * t).exp();
        cos_sq * (decay + r1 / r1rho * (1.0 - decay))
    }

    fn guess(&self, data: &FitData, map: &ParameterMap, _config: &FitConfig) -> Option<Array1<f64>> {
        cest_guess(data, map)
    }

    fn bounds(
        &self,
        guess: &Array1<f64>,
        data: &FitData,
        map: &ParameterMap,
        _config: &FitConfig,
    ) -> (Array1<f64>, Array1<f64>) {
        cest_bounds(guess, data, map)
    }

    fn slot_sharing(&self, _r2_mask: &[usize]) -> Vec<SlotSharing> {
        two_site_sharing()
    }

    fn uses_neural_guess(&self) -> bool {
        true
    }

    fn provider_input(&self, data: &FitData) -> Option<Vec<f64>> {
        saturation_features(data)
    }
}
