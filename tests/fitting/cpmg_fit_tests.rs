//! Fits of synthetic CPMG dispersion data

use relaxfit::{CurveFitter, Dataset, Equation, FitConfig};
use serde_json::Value;

use crate::test_helpers::{cpmg_fast_profile, rel_diff};

fn quick_config() -> FitConfig {
    FitConfig::default().with_calc_error(false)
}

#[test]
fn test_fast_exchange_recovery_single_curve() {
    let profile = cpmg_fast_profile("45", [800.0, 12.0, 0.4], 81.0, 0.0, 0);
    let dataset = Dataset::new(vec![profile]).unwrap();
    let fitter = CurveFitter::new(quick_config()).unwrap();
    let result = fitter.fit(Equation::CpmgFast, &dataset).unwrap();

    assert!(rel_diff(result.kex, 800.0) < 0.02, "kex = {}", result.kex);
    let curve = result.curve("45").unwrap();
    assert!(rel_diff(curve.value("R2").unwrap().value, 12.0) < 0.02);
    assert!(rel_diff(curve.value("dPPMmin").unwrap().value, 0.4) < 0.02);
    assert!(result.stats.chi_sq < 1e-2, "chi_sq = {}", result.stats.chi_sq);
    assert!(result.ensemble.is_none());
    assert_eq!(result.errors.len(), 3);
}

#[test]
fn test_grouped_fit_shares_exchange_rate() {
    let mut profiles = Vec::new();
    for (residue, (r2, dppm)) in [(12.0, 0.4), (15.0, 0.25)].into_iter().enumerate() {
        for (f, field) in [81.0, 60.8].into_iter().enumerate() {
            let label = format!("{}", 10 + residue);
            let seed = (residue * 2 + f) as u64;
            let profile = cpmg_fast_profile(&label, [700.0, r2 + f as f64, dppm], field, 0.0, seed)
                .with_state(vec![residue, f, 0, 0]);
            profiles.push(profile);
        }
    }
    let dataset = Dataset::new(profiles).unwrap();
    let fitter = CurveFitter::new(quick_config()).unwrap();

    let map = fitter.parameter_map(Equation::CpmgFast, &dataset).unwrap();
    // one kex, R2 per residue and field, dPPMmin per residue
    assert_eq!(map.n_pars(), 7);

    let result = fitter.fit(Equation::CpmgFast, &dataset).unwrap();
    assert!(rel_diff(result.kex, 700.0) < 0.03, "kex = {}", result.kex);
    for curve in &result.curves {
        assert_eq!(curve.value("Kex").unwrap().value, result.kex);
    }
    let r2: Vec<f64> = result
        .curves
        .iter()
        .map(|c| c.value("R2").unwrap().value)
        .collect();
    for (fitted, expected) in r2.iter().zip([12.0, 13.0, 15.0, 16.0]) {
        assert!(rel_diff(*fitted, expected) < 0.03, "R2 {} vs {}", fitted, expected);
    }
    // the higher field carries the larger exchange contribution
    assert!(result.curves[0].rex > result.curves[1].rex);
}

#[test]
fn test_fit_best_prefers_exchange_for_dispersive_data() {
    let profile = cpmg_fast_profile("45", [800.0, 12.0, 0.4], 81.0, 0.2, 3);
    let dataset = Dataset::new(vec![profile]).unwrap();
    let fitter = CurveFitter::new(quick_config()).unwrap();
    let best = fitter
        .fit_best(&[Equation::NoEx, Equation::CpmgFast], &dataset)
        .unwrap();
    assert_eq!(best.equation, Equation::CpmgFast);

    let noex = fitter.fit(Equation::NoEx, &dataset).unwrap();
    assert!(noex.stats.aicc > best.stats.aicc);
    assert_eq!(noex.kex, 0.0);
}

#[test]
fn test_result_serializes_to_json() {
    let profile = cpmg_fast_profile("45", [800.0, 12.0, 0.4], 81.0, 0.2, 5);
    let dataset = Dataset::new(vec![profile]).unwrap();
    let fitter = CurveFitter::new(quick_config()).unwrap();
    let result = fitter.fit(Equation::CpmgFast, &dataset).unwrap();

    let json: Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["equation"], "CPMGFAST");
    assert_eq!(json["stats"]["n_points"], 12);
    assert_eq!(json["stats"]["n_pars"], 3);
    assert_eq!(json["curves"][0]["label"], "45");
    assert_eq!(json["settings"]["refine_optimizer"], "levenberg_marquardt");
    assert!(json["ensemble"].is_null());
}

#[test]
fn test_wrong_length_guess_is_rejected() {
    let profile = cpmg_fast_profile("45", [800.0, 12.0, 0.4], 81.0, 0.0, 0);
    let dataset = Dataset::new(vec![profile]).unwrap();
    let fitter = CurveFitter::new(quick_config()).unwrap();
    let guess = ndarray::array![800.0, 12.0];
    assert!(fitter.fit_with_guess(Equation::CpmgFast, &dataset, guess).is_err());

    let guess = ndarray::array![900.0, 11.0, 0.35];
    let result = fitter.fit_with_guess(Equation::CpmgFast, &dataset, guess).unwrap();
    assert!(rel_diff(result.kex, 800.0) < 0.02);
}

#[test]
fn test_exchange_rate_leaves_frequency_cap() {
    // the guess sits exactly on the capped upper bound of kex
    let profile = cpmg_fast_profile("45", [800.0, 12.0, 0.4], 81.0, 0.0, 0);
    let dataset = Dataset::new(vec![profile]).unwrap();
    let fitter = CurveFitter::new(quick_config().with_cpmg_max_freq(1200.0)).unwrap();
    let guess = ndarray::array![1200.0, 12.0, 0.4];
    let result = fitter.fit_with_guess(Equation::CpmgFast, &dataset, guess).unwrap();

    assert!(rel_diff(result.kex, 800.0) < 0.05, "kex = {}", result.kex);
    assert!(result.stats.chi_sq < 1e-2, "chi_sq = {}", result.stats.chi_sq);
}
