use crate::engine::config::MeasurementConfig;
use crate::engine::context::Simulation;
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use crate::engine::samplers::Sampler;
use crate::engine::scheduler::{Task, TaskSignal};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementPhase {
    Relaxing,
    Sampling { since: u64 },
    Finished,
}

/// When to sample, extracted from [`MeasurementConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub relax_iterations: u64,
    pub sample_interval: u64,
    pub sample_iterations: Option<u64>,
}

impl From<&MeasurementConfig> for Schedule {
    fn from(config: &MeasurementConfig) -> Self {
        Self {
            relax_iterations: config.relax_iterations,
            sample_interval: config.sample_interval,
            sample_iterations: config.sample_iterations,
        }
    }
}

/// Waits out the relax period, then drives a [`Sampler`] every `sample_interval`
/// iterations and signals [`TaskSignal::Stop`] after the first sample taken once the
/// sampling period has elapsed.
///
/// A zero interval turns the task into a no-op that never starts its sampler.
pub struct MeasurementTask<S> {
    schedule: Schedule,
    sampler: S,
    phase: MeasurementPhase,
    samples: u64,
    sampler_started: bool,
}

impl<S: Sampler> MeasurementTask<S> {
    pub fn new(schedule: Schedule, sampler: S) -> Self {
        Self {
            schedule,
            sampler,
            phase: MeasurementPhase::Relaxing,
            samples: 0,
            sampler_started: false,
        }
    }

    pub fn phase(&self) -> MeasurementPhase {
        self.phase
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn into_sampler(self) -> S {
        self.sampler
    }

    fn begin_sampling(&mut self, sim: &Simulation<'_>, iteration: u64) -> Result<(), EngineError> {
        self.sampler.start(sim)?;
        self.sampler_started = true;
        self.phase = MeasurementPhase::Sampling { since: iteration };
        info!(
            sampler = self.sampler.name(),
            iteration,
            "Relaxation finished, sampling started."
        );
        sim.reporter.report(Progress::PhaseStart { name: "Sampling" });
        if let Some(total) = self.schedule.sample_iterations {
            sim.reporter.report(Progress::TaskStart { total_steps: total });
        }
        Ok(())
    }
}

impl<'a, S: Sampler> Task<Simulation<'a>> for MeasurementTask<S> {
    fn name(&self) -> &'static str {
        "measurement"
    }

    fn tick(&mut self, sim: &mut Simulation<'a>, iteration: u64) -> TaskSignal {
        if self.schedule.sample_interval == 0 {
            return TaskSignal::Ok;
        }

        let since = match self.phase {
            MeasurementPhase::Finished => return TaskSignal::Stop,
            MeasurementPhase::Sampling { since } => since,
            MeasurementPhase::Relaxing => {
                if iteration < self.schedule.relax_iterations {
                    return TaskSignal::Ok;
                }
                if let Err(e) = self.begin_sampling(sim, iteration) {
                    error!(sampler = self.sampler.name(), error = %e, "Sampler failed to start.");
                    return TaskSignal::Error;
                }
                iteration
            }
        };

        let elapsed = iteration - since;
        let period = self.schedule.sample_iterations;
        if period.is_some_and(|total| elapsed < total) {
            sim.reporter.report(Progress::TaskIncrement);
        }
        if elapsed % self.schedule.sample_interval != 0 {
            return TaskSignal::Ok;
        }

        let signal = match self.sampler.sample(sim, iteration) {
            Ok(signal) => signal,
            Err(e) => {
                error!(sampler = self.sampler.name(), iteration, error = %e, "Sampling failed.");
                return TaskSignal::Error;
            }
        };
        self.samples += 1;
        sim.reporter.report(Progress::Counter {
            label: "samples",
            value: self.samples as f64,
        });

        // The period ends on the first sample taken at or after its last iteration.
        if period.is_some_and(|total| elapsed >= total) {
            self.phase = MeasurementPhase::Finished;
            return signal.combine(TaskSignal::Stop);
        }
        signal
    }

    fn stop(&mut self, sim: &mut Simulation<'a>) -> Result<(), EngineError> {
        if !self.sampler_started {
            return Ok(());
        }
        self.sampler_started = false;
        self.phase = MeasurementPhase::Finished;
        if self.schedule.sample_iterations.is_some() {
            sim.reporter.report(Progress::TaskFinish);
        }
        sim.reporter.report(Progress::PhaseFinish);
        info!(samples = self.samples, "Measurement finished.");
        self.sampler.stop(sim)
    }
}
