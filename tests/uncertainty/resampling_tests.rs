//! Resampling through the fitter

use relaxfit::{CancellationToken, CurveFitter, Dataset, Equation, FitConfig, ResamplingMode};

use crate::test_helpers::{cpmg_fast_profile, decay_profile};

fn decay_dataset() -> Dataset {
    Dataset::new(vec![decay_profile("A5", 10.0, 2.0, 0.0, 0.05, 4)]).unwrap()
}

fn config() -> FitConfig {
    FitConfig::default().with_sample_size(30).with_seed(2024)
}

#[test]
fn test_seeded_ensembles_are_reproducible() {
    let a = CurveFitter::new(config().with_threads(1))
        .unwrap()
        .fit(Equation::ExpAb, &decay_dataset())
        .unwrap();
    let b = CurveFitter::new(config().with_threads(4))
        .unwrap()
        .fit(Equation::ExpAb, &decay_dataset())
        .unwrap();

    let (ea, eb) = (a.ensemble.unwrap(), b.ensemble.unwrap());
    assert_eq!(ea.samples, eb.samples);
    assert_eq!(ea.n_success(), 30);
    assert_eq!(a.errors, ea.std);
    assert_eq!(a.settings.sample_size, 30);
}

#[test]
fn test_ensemble_brackets_the_fit() {
    let result = CurveFitter::new(config())
        .unwrap()
        .fit(Equation::ExpAb, &decay_dataset())
        .unwrap();
    let ensemble = result.ensemble.unwrap();
    for j in 0..2 {
        assert!(ensemble.std[j] > 0.0);
        let widest = ensemble.intervals.iter().find(|ci| ci.level > 0.9).unwrap();
        assert!(widest.lower[j] <= ensemble.median[j] && ensemble.median[j] <= widest.upper[j]);
    }
}

#[test]
fn test_bootstrap_resampling_of_cpmg_fit() {
    let dataset =
        Dataset::new(vec![cpmg_fast_profile("45", [800.0, 12.0, 0.4], 81.0, 0.2, 9)]).unwrap();
    let config = config()
        .with_sample_size(12)
        .with_resampling(ResamplingMode::BootstrapResiduals);
    let result = CurveFitter::new(config)
        .unwrap()
        .fit(Equation::CpmgFast, &dataset)
        .unwrap();
    let ensemble = result.ensemble.unwrap();
    assert_eq!(ensemble.n_success() + ensemble.n_failed, 12);
    assert!(ensemble.n_success() > 0);
    assert_eq!(result.settings.resampling, Some(ResamplingMode::BootstrapResiduals));
}

#[test]
fn test_cancelled_fit_skips_every_trial() {
    let token = CancellationToken::new();
    token.cancel();
    let result = CurveFitter::new(config())
        .unwrap()
        .with_cancellation(token)
        .fit(Equation::ExpAb, &decay_dataset())
        .unwrap();
    let ensemble = result.ensemble.unwrap();
    assert_eq!(ensemble.n_success(), 0);
    assert_eq!(ensemble.n_skipped, 30);
    assert!(result.errors.iter().all(|e| e.is_nan()));
}
