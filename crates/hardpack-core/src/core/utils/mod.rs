//! Small stateless helpers shared across the library.

pub mod geometry;
