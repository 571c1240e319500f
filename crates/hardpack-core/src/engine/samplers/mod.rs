//! Statistics gathered from the particle configuration while a run is sampling.
//!
//! A sampler follows the same lifecycle as a task, driven by the
//! [`MeasurementTask`](super::tasks::measurement::MeasurementTask): `start` when the
//! relax period ends, `sample` at every sampling iteration, and `stop` once, only if
//! `start` ran. Samplers only read the simulation; pair access goes through the
//! spatial grid.

pub mod pair_correlation;

use super::context::Simulation;
use super::error::EngineError;
use super::scheduler::TaskSignal;

pub trait Sampler {
    fn name(&self) -> &'static str;

    fn start(&mut self, _sim: &Simulation<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    /// Takes one sample. Returning [`TaskSignal::Stop`] ends the run cleanly.
    fn sample(&mut self, sim: &Simulation<'_>, iteration: u64) -> Result<TaskSignal, EngineError>;

    fn stop(&mut self, _sim: &Simulation<'_>) -> Result<(), EngineError> {
        Ok(())
    }
}
