//! Resampling of CPMG profiles onto the canonical frequency grid.

use crate::data::FitData;
use crate::models::CPMG_GRID;

/// Column of the proton field in a CPMG row.
const FIELD_H_COLUMN: usize = 2;
/// Column of the total relaxation delay in a CPMG row.
const TAU_COLUMN: usize = 3;

/// Linearly interpolate `(x, y)` at every point of `grid`.
///
/// Input points need not be sorted. Outside the observed range the nearest
/// observed value is repeated, so nothing is ever extrapolated along a slope.
/// Returns `None` when there are no points.
pub fn interpolate(x: &[f64], y: &[f64], grid: &[f64]) -> Option<Vec<f64>> {
    let mut points: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
    if points.is_empty() {
        return None;
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (x_first, y_first) = points[0];
    let (x_last, y_last) = points[points.len() - 1];

    let values = grid
        .iter()
        .map(|&g| {
            if g <= x_first {
                return y_first;
            }
            if g >= x_last {
                return y_last;
            }
            let upper = points.partition_point(|p| p.0 < g);
            let (x1, y1) = points[upper];
            let (x0, y0) = points[upper - 1];
            if x1 == x0 {
                y1
            } else {
                y0 + (y1 - y0) * (g - x0) / (x1 - x0)
            }
        })
        .collect();
    Some(values)
}

/// Fixed-size input vector for a guess provider.
///
/// Curves are taken in ascending proton field (ties by curve id). Each
/// contributes its profile resampled onto [`CPMG_GRID`] followed by its proton
/// field; the total delay of the first row closes the vector. `None` when the
/// rows are not CPMG rows or a curve has no points.
pub fn provider_input(data: &FitData) -> Option<Vec<f64>> {
    if data.n_vars() <= TAU_COLUMN || data.n_points() == 0 {
        return None;
    }

    let mut curves: Vec<(usize, f64)> = (0..data.n_curves())
        .map(|id| {
            let rows = data.rows_of(id);
            let field_h = rows
                .first()
                .map_or(f64::INFINITY, |&r| data.x[[r, FIELD_H_COLUMN]]);
            (id, field_h)
        })
        .collect();
    curves.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut input = Vec::with_capacity(curves.len() * (CPMG_GRID.len() + 1) + 1);
    for (id, field_h) in curves {
        let (x, y) = data.curve(id);
        let nu: Vec<f64> = x.column(0).to_vec();
        let y: Vec<f64> = y.to_vec();
        input.extend(interpolate(&nu, &y, &CPMG_GRID)?);
        input.push(field_h);
    }
    input.push(data.x[[0, TAU_COLUMN]]);
    Some(input)
}
