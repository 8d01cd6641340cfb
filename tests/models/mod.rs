//! Tests for the equation catalogue

mod catalogue_tests;
mod cpmg_tests;
