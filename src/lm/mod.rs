//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides a bounded Levenberg-Marquardt engine for nonlinear
//! least-squares problems. Bounds are enforced through a sine transform of
//! each parameter, so the damped Gauss-Newton steps themselves are
//! unconstrained.

pub mod algorithm;
pub mod config;

// Re-export key types
pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::LmConfig;
