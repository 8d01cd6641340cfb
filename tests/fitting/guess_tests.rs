//! Starting values and the external guess provider

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use relaxfit::error::RelaxError;
use relaxfit::{CachedProvider, CurveFitter, Dataset, Equation, FitConfig, Prediction, Profile};

use crate::test_helpers::{cpmg_fast_profile, rel_diff};

fn dispersive() -> Dataset {
    Dataset::new(vec![cpmg_fast_profile("45", [800.0, 12.0, 0.4], 81.0, 0.0, 0)]).unwrap()
}

#[test]
fn test_flat_cest_profile_has_no_guess() {
    let offsets: Vec<f64> = (0..41).map(|i| -10.0 + 0.5 * i as f64).collect();
    let profile = Profile::cest(
        "G12",
        &offsets,
        vec![0.97; offsets.len()],
        vec![0.01; offsets.len()],
        25.0,
        0.4,
        80.0,
    )
    .unwrap();
    let dataset = Dataset::new(vec![profile]).unwrap();
    let fitter = CurveFitter::new(FitConfig::default().with_calc_error(false)).unwrap();
    assert!(matches!(
        fitter.fit(Equation::CestExact, &dataset),
        Err(RelaxError::GuessUnavailable { .. })
    ));
}

#[test]
fn test_provider_answer_is_used() {
    let provider = Arc::new(|_equation: Equation, input: &[f64]| {
        assert!(!input.is_empty());
        Prediction::Available(vec![900.0, 11.0, 0.35])
    });
    let config = FitConfig::default()
        .with_calc_error(false)
        .with_neural_guess(true);
    let fitter = CurveFitter::new(config).unwrap().with_provider(provider);
    let guess = fitter.guess_parameters(Equation::CpmgFast, &dispersive()).unwrap();
    assert_eq!(guess.to_vec(), vec![900.0, 11.0, 0.35]);
}

#[test]
fn test_provider_ignored_without_flag() {
    let provider = Arc::new(|_equation: Equation, _input: &[f64]| {
        Prediction::Available(vec![900.0, 11.0, 0.35])
    });
    let fitter = CurveFitter::new(FitConfig::default().with_calc_error(false))
        .unwrap()
        .with_provider(provider);
    let guess = fitter.guess_parameters(Equation::CpmgFast, &dispersive()).unwrap();
    assert_ne!(guess.to_vec(), vec![900.0, 11.0, 0.35]);
}

#[test]
fn test_failed_provider_falls_back_to_rubric() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let provider = CachedProvider::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(RelaxError::InvalidInput("weights not found".to_string()))
    });
    let config = FitConfig::default()
        .with_calc_error(false)
        .with_neural_guess(true);
    let fitter = CurveFitter::new(config)
        .unwrap()
        .with_provider(Arc::new(provider));

    let rubric = CurveFitter::new(FitConfig::default().with_calc_error(false))
        .unwrap()
        .guess_parameters(Equation::CpmgFast, &dispersive())
        .unwrap();
    for _ in 0..3 {
        let guess = fitter.guess_parameters(Equation::CpmgFast, &dispersive()).unwrap();
        assert_eq!(guess, rubric);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let result = fitter.fit(Equation::CpmgFast, &dispersive()).unwrap();
    assert!(rel_diff(result.kex, 800.0) < 0.02);
}

#[test]
fn test_malformed_provider_answer_falls_back() {
    let provider = Arc::new(|_equation: Equation, _input: &[f64]| {
        Prediction::Available(vec![900.0, f64::NAN, 0.35])
    });
    let config = FitConfig::default()
        .with_calc_error(false)
        .with_neural_guess(true);
    let fitter = CurveFitter::new(config).unwrap().with_provider(provider);
    let guess = fitter.guess_parameters(Equation::CpmgFast, &dispersive()).unwrap();
    assert!(guess.iter().all(|v| v.is_finite()));
}

#[test]
fn test_provider_seeds_cest_from_dip_features() {
    let offsets: Vec<f64> = (0..41).map(|i| -10.0 + 0.5 * i as f64).collect();
    let y: Vec<f64> = offsets
        .iter()
        .map(|&o| 0.95 - 0.8 / (1.0 + (o / 0.4).powi(2)) - 0.15 / (1.0 + ((o - 4.0) / 0.6).powi(2)))
        .collect();
    let profile =
        Profile::cest("G12", &offsets, y, vec![0.01; offsets.len()], 25.0, 0.4, 80.0).unwrap();
    let dataset = Dataset::new(vec![profile]).unwrap();
    let answer = vec![150.0, 0.1, 0.0, 4.0, 2.5, 2.5, 20.0, 60.0];

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let reply = answer.clone();
    let provider = Arc::new(move |_equation: Equation, input: &[f64]| {
        if let Ok(mut seen) = record.lock() {
            *seen = input.to_vec();
        }
        Prediction::Available(reply.clone())
    });
    let config = FitConfig::default()
        .with_calc_error(false)
        .with_neural_guess(true);
    let fitter = CurveFitter::new(config).unwrap().with_provider(provider);

    for equation in [Equation::CestExact, Equation::CestR1rhoPerturbation] {
        let guess = fitter.guess_parameters(equation, &dataset).unwrap();
        assert_eq!(guess.to_vec(), answer);

        let input = seen.lock().unwrap().clone();
        assert_eq!(input.len(), 10);
        // major dip, minor dip, baseline, then B1, saturation time, field
        assert!(input[0].abs() < 0.3, "major at {}", input[0]);
        assert!(input[1] > input[4]);
        assert!((input[3] - 4.0).abs() < 0.3, "minor at {}", input[3]);
        assert!(input[6] > 0.9);
        assert_eq!(&input[7..], &[25.0, 0.4, 80.0]);
    }
}
