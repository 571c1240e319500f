//! # Core Module
//!
//! The foundation layer of hardpack: particle storage and the periodic geometry the
//! rest of the library relies on.
//!
//! ## Architecture
//!
//! - **Particle Representation** ([`models`]) - The fixed-capacity particle arena
//!   (`World`) together with the domain size and dimensionality
//! - **Geometry** ([`utils`]) - Periodic wrapping and nearest-image vectors for a
//!   cubic (or square) periodic domain
//!
//! Nothing in this module knows about cells, tasks or sampling; it only describes
//! where the particles are and how distances are measured under periodic boundaries.

pub mod models;
pub mod utils;
