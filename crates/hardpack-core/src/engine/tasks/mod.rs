//! Simulation phases run by the [`scheduler`](super::scheduler).
//!
//! The Monte Carlo task owns the spatial grid for its lifetime: it allocates and fills
//! it on `start`, moves particles through it on every `tick` and releases it on `stop`.
//! The measurement task runs after it in the same iteration and only reads the world
//! through grid queries, so every sample sees the state left by the latest sweep.

pub mod measurement;
pub mod monte_carlo;
