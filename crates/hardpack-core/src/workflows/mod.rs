//! # Workflows Module
//!
//! This module provides the high-level entry points that run complete simulations with
//! hardpack.
//!
//! ## Overview
//!
//! Workflows are the top-level API of the library. Each one builds the world from a
//! validated configuration, assembles the engine tasks into a sequence, drives the
//! scheduler and collects the results, so callers never deal with grid allocation or
//! task lifecycles directly.
//!
//! ## Architecture
//!
//! - **Simulation Workflow** ([`simulate`]) - Fill, relax and sample: the full Monte
//!   Carlo run with pair-correlation measurement.
//! - **Check Workflow** ([`check`]) - Fill and sweep a world while validating every
//!   piece of grid bookkeeping against an independent recomputation.
//!
//! ## Key Capabilities
//!
//! - **End-to-end runs** from particle count and density to a g(r) table
//! - **Progress monitoring** through phase and task events
//! - **Reproducibility** through an optional random seed
//! - **Structural validation** of the spatial grid on real configurations

pub mod check;
pub mod simulate;
