//! Relaxation-dispersion equations.
//!
//! Each equation is a stateless value implementing [`EquationModel`]: it
//! evaluates the observable for one data row, estimates starting values and
//! bound windows from the data, and says how its local parameter slots are
//! shared between curves. [`Equation`] is the closed catalogue of variants and
//! dispatches to the matching model.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::config::FitConfig;
use crate::data::FitData;
use crate::error::{RelaxError, Result};
use crate::parameters::map::{self, ParameterMap, ParameterMapBuilder, SlotSharing};

pub mod cest;
pub mod cpmg;
pub mod exponential;
pub mod peak;
pub mod r1rho;

pub use cest::{CestExact, CestR1rhoPerturbation};
pub use cpmg::{CpmgFast, CpmgMq, CpmgSlow, NoEx, CPMG_GRID};
pub use exponential::{ExpAb, ExpAbc};
pub use peak::{find_peaks, Peak, PeakKind};
pub use r1rho::{R1rhoExact, R1rhoPerturbation};

/// Capabilities shared by every equation variant.
///
/// `pars` is always the global parameter vector and `map` the slot list of
/// the curve being evaluated, so `pars[map[j]]` is local parameter `j`.
pub trait EquationModel: Send + Sync {
    /// Catalogue name, e.g. `"CPMGFAST"`.
    fn name(&self) -> &'static str;

    /// Local parameter names in slot order.
    fn par_names(&self) -> &'static [&'static str];

    /// Number of leading slots that are shared by a whole group of curves.
    fn n_group_pars(&self) -> usize;

    /// Number of independent variables per data row.
    fn n_vars(&self) -> usize;

    /// Predicted observable for one row.
    fn evaluate(&self, pars: &[f64], map: &[usize], x: ArrayView1<'_, f64>, curve: usize) -> f64;

    /// Starting values for every global parameter, or `None` when the data
    /// hold no usable signal.
    fn guess(&self, data: &FitData, map: &ParameterMap, config: &FitConfig) -> Option<Array1<f64>>;

    /// Lower and upper bound windows for every global parameter.
    fn bounds(
        &self,
        guess: &Array1<f64>,
        data: &FitData,
        map: &ParameterMap,
        config: &FitConfig,
    ) -> (Array1<f64>, Array1<f64>);

    /// How each local slot is shared between curves.
    fn slot_sharing(&self, r2_mask: &[usize]) -> Vec<SlotSharing>;

    /// Map for `n` curves with no sharing.
    fn make_map(&self, n: usize) -> ParameterMap {
        map::make_map(n, self.par_names().len())
    }

    /// Map for `n` curves of `m` unshared slots each.
    fn make_map_sized(&self, n: usize, m: usize) -> ParameterMap {
        map::make_map(n, m)
    }

    /// Map for `n` curves with the group slots shared by all of them.
    fn make_shared_map(&self, n: usize) -> ParameterMap {
        map::make_group_map(n, self.par_names().len(), self.n_group_pars())
    }

    /// Grouping-aware map built from state descriptors.
    fn make_state_map(
        &self,
        state_count: &[usize],
        states: &[Vec<usize>],
        r2_mask: &[usize],
    ) -> Result<ParameterMap> {
        ParameterMapBuilder::new(state_count, states)?.build(&self.slot_sharing(r2_mask))
    }

    /// Exchange rate.
    fn kex(&self, pars: &[f64]) -> f64 {
        pars.first().copied().unwrap_or(0.0)
    }

    /// Exchange contribution to the observable at `field`.
    fn rex(&self, _pars: &[f64], _map: &[usize], _field: f64) -> f64 {
        0.0
    }

    /// Whether an external guess provider may stand in for the rubric.
    fn uses_neural_guess(&self) -> bool {
        false
    }

    /// Input vector handed to a guess provider; CPMG profiles resampled onto
    /// the canonical grid unless the equation reads its data differently.
    fn provider_input(&self, data: &FitData) -> Option<Vec<f64>> {
        crate::guess::provider_input(data)
    }
}

/// Closed catalogue of equation variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Equation {
    #[serde(rename = "NOEX")]
    NoEx,
    #[serde(rename = "CPMGFAST")]
    CpmgFast,
    #[serde(rename = "CPMGSLOW")]
    CpmgSlow,
    #[serde(rename = "CPMGMQ")]
    CpmgMq,
    #[serde(rename = "CESTEXACT")]
    CestExact,
    #[serde(rename = "CESTR1RHOPERT")]
    CestR1rhoPerturbation,
    #[serde(rename = "R1RHOPERT")]
    R1rhoPerturbation,
    #[serde(rename = "R1RHOEXACT")]
    R1rhoExact,
    #[serde(rename = "EXPAB")]
    ExpAb,
    #[serde(rename = "EXPABC")]
    ExpAbc,
}

static NOEX: NoEx = NoEx;
static CPMG_FAST: CpmgFast = CpmgFast;
static CPMG_SLOW: CpmgSlow = CpmgSlow;
static CPMG_MQ: CpmgMq = CpmgMq;
static CEST_EXACT: CestExact = CestExact;
static CEST_R1RHO_PERT: CestR1rhoPerturbation = CestR1rhoPerturbation;
static R1RHO_PERT: R1rhoPerturbation = R1rhoPerturbation;
static R1RHO_EXACT: R1rhoExact = R1rhoExact;
static EXP_AB: ExpAb = ExpAb;
static EXP_ABC: ExpAbc = ExpAbc;

impl Equation {
    /// Every variant, in catalogue order.
    pub const ALL: [Equation; 10] = [
        Equation::NoEx,
        Equation::CpmgFast,
        Equation::CpmgSlow,
        Equation::CpmgMq,
        Equation::CestExact,
        Equation::CestR1rhoPerturbation,
        Equation::R1rhoPerturbation,
        Equation::R1rhoExact,
        Equation::ExpAb,
        Equation::ExpAbc,
    ];

    /// The model implementing this variant.
    pub fn model(self) -> &'static dyn EquationModel {
        match self {
            Equation::NoEx => &NOEX,
            Equation::CpmgFast => &CPMG_FAST,
            Equation::CpmgSlow => &CPMG_SLOW,
            Equation::CpmgMq => &CPMG_MQ,
            Equation::CestExact => &CEST_EXACT,
            Equation::CestR1rhoPerturbation => &CEST_R1RHO_PERT,
            Equation::R1rhoPerturbation => &R1RHO_PERT,
            Equation::R1rhoExact => &R1RHO_EXACT,
            Equation::ExpAb => &EXP_AB,
            Equation::ExpAbc => &EXP_ABC,
        }
    }

    /// Catalogue name.
    pub fn name(self) -> &'static str {
        self.model().name()
    }

    /// Look up a variant by catalogue name, ignoring case.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| RelaxError::UnknownEquation(name.to_string()))
    }

    /// The CPMG variants.
    pub fn cpmg() -> [Equation; 4] {
        [Equation::NoEx, Equation::CpmgFast, Equation::CpmgSlow, Equation::CpmgMq]
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Equation {
    type Err = RelaxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Per-curve summary used by the guess rubrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CurveStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl CurveStats {
    pub(crate) fn of(y: &Array1<f64>) -> Self {
        let min = y.iter().copied().fold(f64::INFINITY, f64::min);
        let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = y.mean().unwrap_or(0.0);
        Self { min, max, mean }
    }
}

/// Average per-curve slot estimates onto the global vector.
///
/// `per_curve[c][j]` is curve `c`'s estimate for its slot `j`; global entries
/// backed by several curves receive the mean of their estimates.
pub(crate) fn scatter_mean(map: &ParameterMap, per_curve: &[Vec<f64>]) -> Array1<f64> {
    let n_pars = map.n_pars();
    let mut sums = Array1::<f64>::zeros(n_pars);
    let mut counts = vec![0usize; n_pars];
    for (slots, values) in map.iter().zip(per_curve) {
        for (&g, &v) in slots.iter().zip(values) {
            sums[g] += v;
            counts[g] += 1;
        }
    }
    for (g, &n) in counts.iter().enumerate() {
        if n > 0 {
            sums[g] /= n as f64;
        }
    }
    sums
}

/// Fill bound windows slot by slot.
///
/// `rule(curve, slot, guess)` returns the `(lower, upper)` window for the
/// global entry behind that slot.
pub(crate) fn slot_bounds<F>(
    guess: &Array1<f64>,
    map: &ParameterMap,
    mut rule: F,
) -> (Array1<f64>, Array1<f64>)
where
    F: FnMut(usize, usize, f64) -> (f64, f64),
{
    let mut lower = Array1::zeros(guess.len());
    let mut upper = Array1::zeros(guess.len());
    for (curve, slots) in map.iter().enumerate() {
        for (slot, &g) in slots.iter().enumerate() {
            let (lo, hi) = rule(curve, slot, guess[g]);
            lower[g] = lo;
            upper[g] = hi;
        }
    }
    (lower, upper)
}

/// Local parameter values of one curve.
pub fn local_parameters(pars: &[f64], map: &[usize]) -> Vec<f64> {
    map.iter().map(|&g| pars[g]).collect()
}
