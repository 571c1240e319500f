//! # Core Models Module
//!
//! Data structures describing a packing of identical hard particles.
//!
//! ## Key Components
//!
//! - [`ids`] - Index type used to address particles in the arena
//! - [`particle`] - A single particle (position only; cell membership is owned by the grid)
//! - [`world`] - The fixed-capacity particle store, domain edge length and dimensionality
//!
//! ## Usage
//!
//! ```ignore
//! use hardpack::core::models::world::{Dimensionality, World};
//!
//! let world = World::with_packing_density(100, 0.3, Dimensionality::Three);
//! assert_eq!(world.len(), 100);
//! ```

pub mod ids;
pub mod particle;
pub mod world;
