//! End-to-end fitting tests

mod cpmg_fit_tests;
mod decay_fit_tests;
mod guess_tests;
