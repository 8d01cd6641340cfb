//! Tests for resampling uncertainties

mod resampling_tests;
