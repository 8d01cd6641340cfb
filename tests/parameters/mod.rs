//! Tests for the parameter system

mod bounds_tests;
mod map_tests;
