//! # hardpack Core Library
//!
//! A library for Monte Carlo simulation of dense hard-sphere (3D) and hard-disk (2D)
//! packings in a periodic cubic domain, with structural measurements such as the
//! pair correlation function g(r).
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture so that each layer can be tested on
//! its own and composed freely.
//!
//! - **[`core`]: The Foundation.** Plain data models (`World`, `Particle`) and the
//!   periodic geometry helpers every other layer builds on.
//!
//! - **[`engine`]: The Logic Core.** The stateful machinery: the `SpatialGrid` that
//!   partitions the domain into cells for neighbour queries, the cooperative task
//!   scheduler (`start` / `tick` / `stop`), the Monte Carlo and measurement tasks, and
//!   the samplers that turn configurations into statistics.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together into a
//!   complete fill -> relax -> sample simulation with a single entry point.

pub mod core;
pub mod engine;
pub mod workflows;
