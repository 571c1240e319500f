use crate::core::models::world::World;
use crate::engine::config::SimulationConfig;
use crate::engine::context::Simulation;
use crate::engine::error::EngineError;
use crate::engine::grid::SpatialGrid;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::scheduler::{Task, TaskSignal};
use crate::engine::tasks::monte_carlo::{CellLayout, MonteCarloTask, MoveStats};
use tracing::{info, instrument, warn};

/// Outcome of a grid validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub layout: Option<CellLayout>,
    pub passed_after_fill: bool,
    pub passed_after_sweeps: bool,
    pub sweeps: u64,
    pub move_stats: MoveStats,
    /// Smallest nearest-image distance between neighbouring particles at the end.
    pub closest_approach: Option<f64>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.passed_after_fill
            && self.passed_after_sweeps
            && self.closest_approach.is_none_or(|d| d >= 1.0)
    }
}

fn closest_approach(world: &World, grid: &SpatialGrid) -> Option<f64> {
    let mut closest: Option<f64> = None;
    grid.visit_all_pairs(|a, b| {
        let d2 = world.separation2(a, b);
        closest = Some(closest.map_or(d2, |c| c.min(d2)));
    });
    closest.map(f64::sqrt)
}

/// Fills a world, then sweeps it `sweeps` times, running the full grid self-check
/// (including cell assignment) after the fill and after the last sweep.
#[instrument(skip_all, name = "check_workflow", fields(sweeps = sweeps))]
pub fn run<'a>(
    config: &SimulationConfig,
    sweeps: u64,
    reporter: &'a ProgressReporter<'a>,
) -> Result<CheckReport, EngineError> {
    let system = &config.system;
    let world = World::with_packing_density(
        system.num_particles,
        system.packing_density,
        system.dimensionality,
    );
    let mut sim = Simulation::new(world, config.seed, reporter);
    let mut task = MonteCarloTask::new(config.monte_carlo);

    task.start(&mut sim)?;
    let passed_after_fill = sim.grid()?.self_check(&sim.world, true);
    if !passed_after_fill {
        warn!("Grid self-check failed after filling.");
    }

    reporter.report(Progress::PhaseStart { name: "Sweeping" });
    reporter.report(Progress::TaskStart {
        total_steps: sweeps,
    });
    let mut completed = 0;
    for iteration in 0..sweeps {
        let signal = task.tick(&mut sim, iteration);
        reporter.report(Progress::TaskIncrement);
        if signal != TaskSignal::Ok {
            warn!(iteration, signal = ?signal, "Sweep did not complete.");
            break;
        }
        completed += 1;
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    let grid = sim.grid()?;
    let passed_after_sweeps = completed == sweeps && grid.self_check(&sim.world, true);
    let closest_approach = closest_approach(&sim.world, grid);
    let report = CheckReport {
        layout: task.layout(),
        passed_after_fill,
        passed_after_sweeps,
        sweeps: completed,
        move_stats: task.stats(),
        closest_approach,
    };
    task.stop(&mut sim)?;

    info!(passed = report.passed(), "Grid check finished.");
    Ok(report)
}
