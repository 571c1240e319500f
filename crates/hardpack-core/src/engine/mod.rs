//! # Engine Module
//!
//! This module implements the simulation engine for hard-particle packings in hardpack:
//! the spatial partition grid, the task lifecycle that sequences simulation phases, the
//! Monte Carlo move engine and the samplers that measure the resulting structure.
//!
//! ## Overview
//!
//! A simulation is a [`context::Simulation`] (world, optional grid, random generator
//! and progress reporter) driven by the [`scheduler`]. Every phase of a run is a
//! [`scheduler::Task`] with a `start`, repeated `tick` and `stop`; the Monte Carlo task
//! owns the grid between its `start` and `stop`, and measurement tasks only read the
//! world through grid queries.
//!
//! ## Architecture
//!
//! - **Spatial Grid** ([`grid`]) - Uniform periodic cell decomposition with intrusive
//!   per-cell particle lists, neighbour visitation and all-pairs enumeration
//! - **Scheduler** ([`scheduler`]) - Task trait, sequence combinator and driver loop
//! - **Tasks** ([`tasks`]) - Monte Carlo filling and sweeping, periodic measurement
//! - **Samplers** ([`samplers`]) - Statistics accumulated from pair enumeration
//! - **Configuration** ([`config`]) - Validated simulation parameters and their builder
//! - **Progress Monitoring** ([`progress`]) - Progress reporting and user feedback mechanisms
//! - **Error Handling** ([`error`]) - Engine-specific error types and error propagation
//!
//! ## Key Capabilities
//!
//! - **O(1) membership updates** when a particle crosses a cell boundary
//! - **Early-exit overlap tests** through short-circuiting neighbour visitors
//! - **Exhaustive pair enumeration** that skips empty cells entirely
//! - **Deterministic runs** from an explicit random seed
//! - **Independent self-checks** that recompute all grid bookkeeping from scratch

pub mod config;
pub mod context;
pub mod error;
pub mod grid;
pub mod progress;
pub mod samplers;
pub mod scheduler;
pub mod tasks;
