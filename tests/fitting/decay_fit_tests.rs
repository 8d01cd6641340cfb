//! Fits of relaxation decays

use relaxfit::{CurveFitter, Dataset, Equation, FitConfig, OptimizerKind};

use crate::test_helpers::{decay_profile, rel_diff};

#[test]
fn test_two_parameter_decay() {
    let dataset = Dataset::new(vec![
        decay_profile("A5", 10.0, 2.0, 0.0, 0.0, 0),
        decay_profile("A6", 4.0, 3.5, 0.0, 0.0, 0),
    ])
    .unwrap();
    let fitter = CurveFitter::new(FitConfig::default().with_calc_error(false)).unwrap();
    let result = fitter.fit(Equation::ExpAb, &dataset).unwrap();

    assert_eq!(result.params.len(), 4);
    assert_eq!(result.kex, 0.0);
    let a6 = result.curve("A6").unwrap();
    assert!(rel_diff(a6.value("A").unwrap().value, 4.0) < 1e-3);
    assert!(rel_diff(a6.value("R").unwrap().value, 3.5) < 1e-3);
    assert_eq!(a6.rex, 0.0);
}

#[test]
fn test_three_parameter_decay_with_offset() {
    let dataset = Dataset::new(vec![decay_profile("T1", 10.0, 2.0, 0.5, 0.0, 0)]).unwrap();
    let fitter = CurveFitter::new(FitConfig::default().with_calc_error(false)).unwrap();
    let result = fitter.fit(Equation::ExpAbc, &dataset).unwrap();

    assert!(rel_diff(result.params[0], 10.0) < 0.05, "A = {}", result.params[0]);
    assert!(rel_diff(result.params[1], 2.0) < 0.05, "R = {}", result.params[1]);
    assert!((result.params[2] - 0.5).abs() < 0.3, "C = {}", result.params[2]);
}

#[test]
fn test_nelder_mead_refinement() {
    let dataset = Dataset::new(vec![decay_profile("A5", 10.0, 2.0, 0.0, 0.0, 0)]).unwrap();
    let config = FitConfig::default()
        .with_calc_error(false)
        .with_refine_optimizer(OptimizerKind::NelderMead);
    let fitter = CurveFitter::new(config).unwrap();
    let result = fitter.fit(Equation::ExpAb, &dataset).unwrap();

    assert!(rel_diff(result.params[0], 10.0) < 1e-2, "A = {}", result.params[0]);
    assert!(rel_diff(result.params[1], 2.0) < 1e-2, "R = {}", result.params[1]);
    assert_eq!(result.settings.refine_optimizer, OptimizerKind::NelderMead);
}

#[test]
fn test_covariance_errors_follow_noise() {
    let fitter = CurveFitter::new(FitConfig::default().with_calc_error(false)).unwrap();
    let small = fitter
        .fit(
            Equation::ExpAb,
            &Dataset::new(vec![decay_profile("A5", 10.0, 2.0, 0.0, 0.05, 11)]).unwrap(),
        )
        .unwrap();
    let large = fitter
        .fit(
            Equation::ExpAb,
            &Dataset::new(vec![decay_profile("A5", 10.0, 2.0, 0.0, 0.2, 11)]).unwrap(),
        )
        .unwrap();
    for j in 0..2 {
        assert!(small.errors[j].is_finite() && small.errors[j] > 0.0);
        assert!(large.errors[j] > small.errors[j]);
    }
}

#[test]
fn test_absolute_value_fit() {
    let dataset = Dataset::new(vec![decay_profile("A5", 10.0, 2.0, 0.0, 0.05, 2)]).unwrap();
    let config = FitConfig::default()
        .with_calc_error(false)
        .with_abs_value_fit(true);
    let fitter = CurveFitter::new(config).unwrap();
    let result = fitter.fit(Equation::ExpAb, &dataset).unwrap();
    assert!(rel_diff(result.params[1], 2.0) < 0.1, "R = {}", result.params[1]);
    assert!(result.settings.abs_value_fit);
}

#[test]
fn test_three_parameter_recovery_curve() {
    // R1 recovery: rises from C - |A| toward C
    let dataset = Dataset::new(vec![decay_profile("T1", -2.0, 1.5, 3.0, 0.0, 0)]).unwrap();
    let fitter = CurveFitter::new(FitConfig::default().with_calc_error(false)).unwrap();
    let result = fitter.fit(Equation::ExpAbc, &dataset).unwrap();

    assert!(rel_diff(result.params[0], -2.0) < 0.05, "A = {}", result.params[0]);
    assert!(rel_diff(result.params[1], 1.5) < 0.05, "R = {}", result.params[1]);
    assert!(rel_diff(result.params[2], 3.0) < 0.05, "C = {}", result.params[2]);
    assert!(result.stats.chi_sq < 1.0, "chi_sq = {}", result.stats.chi_sq);
}
