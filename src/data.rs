//! Measured curves and their flattened form.
//!
//! A [`Profile`] is one residue/condition curve. A [`Dataset`] collects the
//! profiles of one fit together with the cardinality of each grouping axis,
//! and [`FitData`] flattens it into the row-oriented layout the equations and
//! the objective consume: one row of independent variables per point, plus the
//! id of the curve the point belongs to.

use ndarray::{s, Array1, Array2, Axis};

use crate::error::{RelaxError, Result};

/// Number of grouping axes in a state descriptor.
pub const STATE_AXES: usize = 4;

/// State axis holding the residue index.
pub const RESIDUE_AXIS: usize = 0;
/// State axis holding the static field index.
pub const FIELD_AXIS: usize = 1;
/// State axis holding the temperature index.
pub const TEMPERATURE_AXIS: usize = 2;
/// State axis holding the nucleus index.
pub const NUCLEUS_AXIS: usize = 3;

/// One experimental curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Residue or peak label.
    pub label: String,
    /// Independent variables, one row per point.
    pub x: Array2<f64>,
    /// Observed values.
    pub y: Array1<f64>,
    /// Per-point uncertainties.
    pub err: Array1<f64>,
    /// Static field of the observed nucleus (MHz).
    pub field: f64,
    /// Position along each grouping axis; empty until assigned.
    pub state: Vec<usize>,
}

impl Profile {
    /// Build a profile from explicit rows.
    pub fn new(
        label: impl Into<String>,
        x: Array2<f64>,
        y: Array1<f64>,
        err: Array1<f64>,
        field: f64,
    ) -> Result<Self> {
        let label = label.into();
        if x.nrows() != y.len() || y.len() != err.len() {
            return Err(RelaxError::InvalidInput(format!(
                "profile {}: {} rows, {} values, {} errors",
                label,
                x.nrows(),
                y.len(),
                err.len()
            )));
        }
        if y.is_empty() {
            return Err(RelaxError::InvalidInput(format!("profile {} is empty", label)));
        }
        let finite = x.iter().chain(y.iter()).chain(err.iter()).all(|v| v.is_finite());
        if !finite || !field.is_finite() {
            return Err(RelaxError::InvalidInput(format!(
                "profile {} contains non-finite values",
                label
            )));
        }
        if err.iter().any(|&e| e < 0.0) {
            return Err(RelaxError::InvalidInput(format!(
                "profile {} has negative errors",
                label
            )));
        }
        Ok(Self {
            label,
            x,
            y,
            err,
            field,
            state: Vec::new(),
        })
    }

    /// CPMG dispersion curve. Rows are `[ν_cpmg, field_x, field_h, τ]`.
    pub fn cpmg(
        label: impl Into<String>,
        nu_cpmg: &[f64],
        y: Vec<f64>,
        err: Vec<f64>,
        field_x: f64,
        field_h: f64,
        tau: f64,
    ) -> Result<Self> {
        let x = rows(nu_cpmg, &[field_x, field_h, tau]);
        Self::new(label, x, Array1::from(y), Array1::from(err), field_x)
    }

    /// CEST saturation profile. Rows are `[offset_ppm, b1_hz, t_ex, field]`.
    pub fn cest(
        label: impl Into<String>,
        offsets_ppm: &[f64],
        y: Vec<f64>,
        err: Vec<f64>,
        b1_hz: f64,
        t_ex: f64,
        field: f64,
    ) -> Result<Self> {
        let x = rows(offsets_ppm, &[b1_hz, t_ex, field]);
        Self::new(label, x, Array1::from(y), Array1::from(err), field)
    }

    /// R1ρ profile. Rows are `[offset_ppm, b1_hz, t_relax, field]`.
    pub fn r1rho(
        label: impl Into<String>,
        offsets_ppm: &[f64],
        y: Vec<f64>,
        err: Vec<f64>,
        b1_hz: f64,
        t_relax: f64,
        field: f64,
    ) -> Result<Self> {
        Self::cest(label, offsets_ppm, y, err, b1_hz, t_relax, field)
    }

    /// Relaxation decay curve. Rows are `[t]`.
    pub fn decay(label: impl Into<String>, t: &[f64], y: Vec<f64>, err: Vec<f64>) -> Result<Self> {
        let x = rows(t, &[]);
        Self::new(label, x, Array1::from(y), Array1::from(err), 0.0)
    }

    /// Attach a state descriptor.
    pub fn with_state(mut self, state: Vec<usize>) -> Self {
        self.state = state;
        self
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// True when the profile has no points.
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

fn rows(first: &[f64], constants: &[f64]) -> Array2<f64> {
    let mut x = Array2::zeros((first.len(), constants.len() + 1));
    for (i, &v) in first.iter().enumerate() {
        x[[i, 0]] = v;
        for (j, &c) in constants.iter().enumerate() {
            x[[i, j + 1]] = c;
        }
    }
    x
}

/// The profiles of one fit plus the grouping axis cardinalities.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    profiles: Vec<Profile>,
    state_count: Vec<usize>,
}

impl Dataset {
    /// Collect profiles into a dataset.
    ///
    /// Profiles without a state descriptor are treated as distinct residues
    /// measured under one condition. State counts are inferred as one past the
    /// largest value seen along each axis; use [`Dataset::with_state_count`]
    /// to declare them explicitly.
    pub fn new(mut profiles: Vec<Profile>) -> Result<Self> {
        if profiles.is_empty() {
            return Err(RelaxError::InvalidInput("dataset has no profiles".to_string()));
        }
        let n_vars = profiles[0].x.ncols();
        if let Some(p) = profiles.iter().find(|p| p.x.ncols() != n_vars) {
            return Err(RelaxError::InvalidInput(format!(
                "profile {} has {} variables, expected {}",
                p.label,
                p.x.ncols(),
                n_vars
            )));
        }

        let unassigned = profiles.iter().all(|p| p.state.is_empty());
        if unassigned {
            for (i, p) in profiles.iter_mut().enumerate() {
                p.state = vec![0; STATE_AXES];
                p.state[RESIDUE_AXIS] = i;
            }
        }

        let width = profiles.iter().map(|p| p.state.len()).max().unwrap_or(0);
        let mut state_count = vec![1; width];
        for p in &profiles {
            for (axis, &s) in p.state.iter().enumerate() {
                state_count[axis] = state_count[axis].max(s + 1);
            }
        }

        Ok(Self {
            profiles,
            state_count,
        })
    }

    /// Declare the cardinality of each grouping axis.
    pub fn with_state_count(mut self, state_count: Vec<usize>) -> Self {
        self.state_count = state_count;
        self
    }

    /// Profiles in curve-id order.
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Cardinality of each grouping axis.
    pub fn state_count(&self) -> &[usize] {
        &self.state_count
    }

    /// State descriptor of each profile.
    pub fn states(&self) -> Vec<Vec<usize>> {
        self.profiles.iter().map(|p| p.state.clone()).collect()
    }

    /// Number of curves.
    pub fn n_curves(&self) -> usize {
        self.profiles.len()
    }

    /// Flatten into row form.
    pub fn flatten(&self) -> FitData {
        let n_vars = self.profiles[0].x.ncols();
        let n_rows: usize = self.profiles.iter().map(Profile::len).sum();
        let mut x = Array2::zeros((n_rows, n_vars));
        let mut y = Array1::zeros(n_rows);
        let mut err = Array1::zeros(n_rows);
        let mut ids = Vec::with_capacity(n_rows);

        let mut row = 0;
        for (id, p) in self.profiles.iter().enumerate() {
            let n = p.len();
            x.slice_mut(s![row..row + n, ..]).assign(&p.x);
            y.slice_mut(s![row..row + n]).assign(&p.y);
            err.slice_mut(s![row..row + n]).assign(&p.err);
            ids.extend(std::iter::repeat(id).take(n));
            row += n;
        }

        FitData {
            x,
            y,
            err,
            ids,
            fields: self.profiles.iter().map(|p| p.field).collect(),
        }
    }
}

/// Row-oriented view of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct FitData {
    /// Independent variables, one row per point.
    pub x: Array2<f64>,
    /// Observed values.
    pub y: Array1<f64>,
    /// Per-point uncertainties.
    pub err: Array1<f64>,
    /// Curve id of each row.
    pub ids: Vec<usize>,
    /// Field of each curve.
    pub fields: Vec<f64>,
}

impl FitData {
    /// Number of points.
    pub fn n_points(&self) -> usize {
        self.y.len()
    }

    /// Number of curves.
    pub fn n_curves(&self) -> usize {
        self.fields.len()
    }

    /// Number of independent variables per row.
    pub fn n_vars(&self) -> usize {
        self.x.ncols()
    }

    /// Row indices belonging to curve `id`.
    pub fn rows_of(&self, id: usize) -> Vec<usize> {
        self.ids
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == id)
            .map(|(i, _)| i)
            .collect()
    }

    /// The `(x, y)` subset of curve `id`.
    pub fn curve(&self, id: usize) -> (Array2<f64>, Array1<f64>) {
        let rows = self.rows_of(id);
        (self.x.select(Axis(0), &rows), self.y.select(Axis(0), &rows))
    }

    /// Copy with the observed values replaced.
    pub fn with_y(&self, y: Array1<f64>) -> Result<Self> {
        if y.len() != self.y.len() {
            return Err(RelaxError::DimensionMismatch(format!(
                "Expected {} values, got {}",
                self.y.len(),
                y.len()
            )));
        }
        Ok(Self { y, ..self.clone() })
    }

    /// Copy holding only the given rows, in the given order, repeats allowed.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), rows),
            y: self.y.select(Axis(0), rows),
            err: self.err.select(Axis(0), rows),
            ids: rows.iter().map(|&r| self.ids[r]).collect(),
            fields: self.fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpmg(label: &str, field: f64) -> Profile {
        Profile::cpmg(
            label,
            &[50.0, 100.0, 500.0],
            vec![20.0, 15.0, 11.0],
            vec![0.5, 0.5, 0.5],
            field,
            field * 10.0,
            0.04,
        )
        .unwrap()
    }

    #[test]
    fn test_cpmg_rows() {
        let p = cpmg("A12", 60.8);
        assert_eq!(p.x.shape(), &[3, 4]);
        assert_eq!(p.x[[1, 0]], 100.0);
        assert_eq!(p.x[[2, 1]], 60.8);
        assert_eq!(p.x[[0, 2]], 608.0);
        assert_eq!(p.x[[0, 3]], 0.04);
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        let result = Profile::cpmg("A1", &[50.0, 100.0], vec![1.0], vec![0.1, 0.1], 60.0, 600.0, 0.04);
        assert!(matches!(result, Err(RelaxError::InvalidInput(_))));
        let result = Profile::decay("A1", &[0.0], vec![f64::NAN], vec![0.1]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_states() {
        let data = Dataset::new(vec![cpmg("A1", 60.0), cpmg("A2", 60.0)]).unwrap();
        assert_eq!(data.state_count(), &[2, 1, 1, 1]);
        assert_eq!(data.states()[1], vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_flatten_and_curve() {
        let data = Dataset::new(vec![cpmg("A1", 60.0), cpmg("A2", 80.0)]).unwrap();
        let flat = data.flatten();
        assert_eq!(flat.n_points(), 6);
        assert_eq!(flat.ids, vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(flat.fields, vec![60.0, 80.0]);
        let (x, y) = flat.curve(1);
        assert_eq!(x.nrows(), 3);
        assert_eq!(x[[0, 1]], 80.0);
        assert_eq!(y[2], 11.0);
    }

    #[test]
    fn test_select_rows_repeats() {
        let data = Dataset::new(vec![cpmg("A1", 60.0)]).unwrap().flatten();
        let sub = data.select_rows(&[2, 2, 0]);
        assert_eq!(sub.y.to_vec(), vec![11.0, 11.0, 20.0]);
        assert_eq!(sub.ids, vec![0, 0, 0]);
    }
}
