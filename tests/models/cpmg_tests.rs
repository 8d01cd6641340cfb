//! CPMG equation values

use std::f64::consts::PI;

use approx::assert_relative_eq;
use ndarray::array;
use relaxfit::models::CPMG_GRID;
use relaxfit::{Equation, EquationModel};

#[test]
fn test_noex_is_constant() {
    let model = Equation::NoEx.model();
    for nu in [10.0, 100.0, 2000.0] {
        let row = array![nu, 81.0, 800.0, 0.04];
        assert_eq!(model.evaluate(&[12.5], &[0], row.view(), 0), 12.5);
    }
}

#[test]
fn test_fast_exchange_worked_example() {
    // kex = 100, R2 = 10, dPPMmin = 1 at ν = 50 Hz and a 1 MHz field
    let model = Equation::CpmgFast.model();
    let row = array![50.0, 1.0, 10.0, 0.04];
    let value = model.evaluate(&[100.0, 10.0, 1.0], &[0, 1, 2], row.view(), 0);

    let rex = (2.0 * PI).powi(2) / 4.0 / 100.0;
    assert_relative_eq!(rex, 0.098696, epsilon = 1e-6);
    let expected = 10.0 + rex * (1.0 - 2.0 * (0.5f64).tanh());
    assert_relative_eq!(value, expected, epsilon = 1e-12);
}

#[test]
fn test_no_exchange_limit_returns_r2() {
    let row = array![100.0, 81.0, 800.0, 0.04];
    for equation in [Equation::CpmgFast, Equation::CpmgSlow] {
        let model = equation.model();
        let pars: Vec<f64> = match equation {
            Equation::CpmgFast => vec![0.0, 14.0, 1.0],
            _ => vec![0.0, 0.9, 14.0, 1.0],
        };
        let map: Vec<usize> = (0..pars.len()).collect();
        assert_eq!(model.evaluate(&pars, &map, row.view(), 0), 14.0, "{}", equation);
    }
}

#[test]
fn test_dispersion_decays_with_pulsing_rate() {
    let model = Equation::CpmgFast.model();
    let pars = [500.0, 10.0, 0.5];
    let values: Vec<f64> = CPMG_GRID
        .iter()
        .map(|&nu| model.evaluate(&pars, &[0, 1, 2], array![nu, 81.0, 800.0, 0.04].view(), 0))
        .collect();
    for pair in values.windows(2) {
        assert!(pair[1] <= pair[0]);
    }
    let rex = model.rex(&pars, &[0, 1, 2], 81.0);
    assert!(values[0] - 10.0 <= rex + 1e-9);
}
