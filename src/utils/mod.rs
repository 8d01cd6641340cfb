//! Numerical helpers shared by the refiners.

pub mod finite_difference;
pub mod matrix_convert;
pub mod parallel;

pub use finite_difference::jacobian;
pub use parallel::jacobian_parallel;
