use crate::core::models::world::World;
use crate::engine::config::SimulationConfig;
use crate::engine::context::Simulation;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::samplers::pair_correlation::{PairCorrelationRow, PairCorrelationSampler};
use crate::engine::scheduler::{self, RunSummary, Sequence, Task};
use crate::engine::tasks::measurement::{MeasurementTask, Schedule};
use crate::engine::tasks::monte_carlo::{CellLayout, MonteCarloTask, MoveStats};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub summary: RunSummary,
    pub move_stats: MoveStats,
    pub layout: Option<CellLayout>,
    /// Number of pair-correlation samples taken.
    pub samples: u64,
    /// Empty when measurement was disabled or never left the relax period.
    pub pair_correlation: Vec<PairCorrelationRow>,
    /// Final particle configuration.
    pub world: World,
}

#[instrument(skip_all, name = "simulation_workflow")]
pub fn run<'a>(
    config: &SimulationConfig,
    reporter: &'a ProgressReporter<'a>,
) -> Result<SimulationResult, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    let system = &config.system;
    let world = World::with_packing_density(
        system.num_particles,
        system.packing_density,
        system.dimensionality,
    );
    info!(
        particles = world.len(),
        packing_density = system.packing_density,
        world_size = world.size(),
        dimensionality = ?system.dimensionality,
        "Created world."
    );
    let mut sim = Simulation::new(world, config.seed, reporter);
    reporter.report(Progress::PhaseFinish);

    let mut monte_carlo = MonteCarloTask::new(config.monte_carlo);
    let mut measurement = config
        .measurement
        .as_ref()
        .filter(|m| m.sample_interval > 0)
        .map(|m| {
            MeasurementTask::new(
                Schedule::from(m),
                PairCorrelationSampler::new(m.pair_correlation.clone()),
            )
        });

    let bounded = config.max_iterations.is_some()
        || config
            .measurement
            .as_ref()
            .is_some_and(|m| m.sample_interval > 0 && m.sample_iterations.is_some());
    if !bounded {
        warn!("No sampling period or iteration limit is set; the run continues until interrupted.");
    }

    let summary = {
        let mut sequence = Sequence::<Simulation<'a>>::new()
            .then(&mut monte_carlo)
            .then_optional(measurement.as_mut().map(|m| m as &mut dyn Task<Simulation<'a>>));
        scheduler::run(&mut sequence, &mut sim, config.max_iterations)?
    };

    let move_stats = monte_carlo.stats();
    info!(
        iterations = summary.iterations,
        signal = ?summary.signal,
        acceptance = move_stats.acceptance_ratio(),
        "Simulation finished."
    );

    let (samples, pair_correlation) = match measurement {
        Some(task) => (task.samples(), task.into_sampler().into_table()),
        None => (0, Vec::new()),
    };

    Ok(SimulationResult {
        summary,
        move_stats,
        layout: monte_carlo.layout(),
        samples,
        pair_correlation,
        world: sim.world,
    })
}
