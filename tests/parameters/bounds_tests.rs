//! Tests for bound derivation

use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use relaxfit::parameters::BoundsEngine;
use relaxfit::{Dataset, Equation, EquationModel, FitConfig, Profile};

use crate::test_helpers::{cpmg_fast_profile, decay_profile};

fn cest_profile() -> Profile {
    let offsets: Vec<f64> = (0..41).map(|i| -10.0 + 0.5 * i as f64).collect();
    let y: Vec<f64> = offsets
        .iter()
        .map(|&o| {
            let major = 0.8 / (1.0 + (o / 0.4).powi(2));
            let minor = 0.15 / (1.0 + ((o - 4.0) / 0.6).powi(2));
            0.95 - major - minor
        })
        .collect();
    Profile::cest("G12", &offsets, y, vec![0.01; offsets.len()], 25.0, 0.4, 80.0).unwrap()
}

fn dataset_for(equation: Equation) -> Dataset {
    let profiles = match equation {
        Equation::ExpAb | Equation::ExpAbc => vec![
            decay_profile("a", 10.0, 2.0, 0.5, 0.0, 0),
            decay_profile("b", 6.0, 3.0, 0.5, 0.0, 0),
        ],
        Equation::CestExact
        | Equation::CestR1rhoPerturbation
        | Equation::R1rhoPerturbation
        | Equation::R1rhoExact => vec![cest_profile()],
        _ => vec![
            cpmg_fast_profile("a", [800.0, 12.0, 0.4], 81.0, 0.0, 0),
            cpmg_fast_profile("b", [800.0, 15.0, 0.2], 81.0, 0.0, 0),
        ],
    };
    Dataset::new(profiles).unwrap()
}

#[test]
fn test_bounds_bracket_random_guesses() {
    let config = FitConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for equation in Equation::ALL {
        let model = equation.model();
        let dataset = dataset_for(equation);
        let data = dataset.flatten();
        let map = model.make_state_map(dataset.state_count(), &dataset.states(), &config.r2_mask).unwrap();
        for _ in 0..50 {
            let guess: Array1<f64> = (0..map.n_pars())
                .map(|_| {
                    let magnitude = 10f64.powf(rng.gen_range(-3.0..3.0));
                    if rng.gen_bool(0.1) {
                        -magnitude
                    } else if rng.gen_bool(0.05) {
                        0.0
                    } else {
                        magnitude
                    }
                })
                .collect();
            let bounds = BoundsEngine::derive(model, &guess, &data, &map, &config).unwrap();
            for i in 0..guess.len() {
                assert!(
                    bounds.lower[i] <= guess[i] && guess[i] <= bounds.upper[i],
                    "{}: parameter {} guess {} outside [{}, {}]",
                    equation,
                    i,
                    guess[i],
                    bounds.lower[i],
                    bounds.upper[i]
                );
                assert!(bounds.upper[i] > bounds.lower[i]);
            }
        }
    }
}

#[test]
fn test_bounds_reject_bad_guesses() {
    let config = FitConfig::default();
    let dataset = dataset_for(Equation::CpmgFast);
    let data = dataset.flatten();
    let model = Equation::CpmgFast.model();
    let map = model.make_map(2);

    let short = Array1::from(vec![1.0, 2.0]);
    assert!(BoundsEngine::derive(model, &short, &data, &map, &config).is_err());

    let mut guess = Array1::from_elem(map.n_pars(), 1.0);
    guess[0] = f64::NAN;
    assert!(BoundsEngine::derive(model, &guess, &data, &map, &config).is_err());
}

#[test]
fn test_bounds_open_around_guess_on_rubric_edge() {
    let config = FitConfig::default();
    let dataset = dataset_for(Equation::CpmgSlow);
    let data = dataset.flatten();
    let model = Equation::CpmgSlow.model();
    let map = model.make_map(2);

    // kex past the frequency cap, pA on the rubric's upper edge, R2 at zero
    let mut guess = Array1::from_elem(map.n_pars(), 1.0);
    for curve in 0..2 {
        let slots = map.curve(curve);
        guess[slots[0]] = 3000.0;
        guess[slots[1]] = 0.999;
        guess[slots[2]] = 0.0;
        guess[slots[3]] = 0.3;
    }
    let bounds = BoundsEngine::derive(model, &guess, &data, &map, &config).unwrap();
    for i in 0..guess.len() {
        assert!(
            bounds.lower[i] < guess[i] && guess[i] < bounds.upper[i],
            "parameter {} guess {} not inside ({}, {})",
            i,
            guess[i],
            bounds.lower[i],
            bounds.upper[i]
        );
    }
    let slots = map.curve(0);
    assert!((bounds.upper[slots[0]] - 3300.0).abs() < 1e-9);
    assert!((bounds.upper[slots[1]] - 1.099).abs() < 1e-9);
    assert!((bounds.lower[slots[2]] + 0.1).abs() < 1e-9);
    // positive guesses keep a non-negative floor
    assert!(bounds.lower[slots[3]] >= 0.0);
}

#[test]
fn test_r1rho_r1_window_tracks_relaxation_loss() {
    let model = Equation::R1rhoPerturbation.model();
    let pars = [300.0, 0.1, 0.0, 3.0, 1.5, 1.5, 10.0, 10.0];
    let slots = [0, 1, 2, 3, 4, 5, 6, 7];
    let t = 0.1;
    let offsets: Vec<f64> = (0..=60).map(|i| -6.0 + 0.2 * i as f64).collect();
    let y: Vec<f64> = offsets
        .iter()
        .map(|&o| model.evaluate(&pars, &slots, ndarray::array![o, 50.0, t, 80.0].view(), 0))
        .collect();
    let profile = Profile::r1rho("K7", &offsets, y, vec![0.1; 61], 50.0, t, 80.0).unwrap();
    let dataset = Dataset::new(vec![profile]).unwrap();
    let data = dataset.flatten();
    let config = FitConfig::default();
    let map = model.make_map(1);
    let guess = model.guess(&data, &map, &config).unwrap();
    let bounds = BoundsEngine::derive(model, &guess, &data, &map, &config).unwrap();

    for slot in [4, 5] {
        let g = guess[slot];
        // R1 values whose intensity after t stays within 0.1 of the guess
        let intensity = (-g * t).exp();
        let lo = -(intensity + 0.1).min(1.0 - 1e-6).ln() / t;
        let hi = -(intensity - 0.1).max(1e-3).ln() / t;
        assert!((bounds.lower[slot] - lo.max(0.0)).abs() < 1e-9);
        assert!((bounds.upper[slot] - hi).abs() < 1e-9);
        assert!(bounds.lower[slot] > 0.0);
    }
}
