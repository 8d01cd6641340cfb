//! # Parameter System
//!
//! The global parameter vector of a fit and the structures around it.
//!
//! ## Core Components
//!
//! - [`ParameterMap`]: which global entry backs each local slot of each curve
//! - [`ParameterMapBuilder`]: grouping-aware maps from state descriptors
//! - [`Bounds`] and [`BoundsTransform`]: box constraints and the sine transform
//!   the Levenberg-Marquardt refiner optimizes through
//! - [`BoundsEngine`]: derives [`BoundVectors`] that bracket the guess
//!
//! ## Example Usage
//!
//! ```rust
//! use relaxfit::parameters::{ParameterMapBuilder, SlotSharing};
//!
//! // Two residues, each measured at two fields
//! let counts = vec![2, 2, 1, 1];
//! let states = vec![
//!     vec![0, 0, 0, 0],
//!     vec![0, 1, 0, 0],
//!     vec![1, 0, 0, 0],
//!     vec![1, 1, 0, 0],
//! ];
//!
//! // Exchange rate shared, R2 per residue and field
//! let map = ParameterMapBuilder::new(&counts, &states)
//!     .unwrap()
//!     .build(&[SlotSharing::Shared, SlotSharing::Masked(vec![0, 1])])
//!     .unwrap();
//! assert_eq!(map.n_pars(), 5);
//! assert_eq!(map.curve(3), &[0, 4]);
//! ```

pub mod bounds;
pub mod map;

pub use bounds::{BoundVectors, Bounds, BoundsEngine, BoundsError, BoundsTransform};
pub use map::{
    make_group_map, make_map, map_index, ParameterMap, ParameterMapBuilder, SlotSharing,
};
