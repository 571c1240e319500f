use crate::core::models::ids::ParticleId;
use crate::core::models::particle::DIAMETER;
use crate::core::models::world::World;
use crate::engine::config::{CellSizing, MonteCarloConfig};
use crate::engine::context::Simulation;
use crate::engine::error::EngineError;
use crate::engine::grid::SpatialGrid;
use crate::engine::progress::Progress;
use crate::engine::scheduler::{Task, TaskSignal};
use nalgebra::Vector3;
use rand::Rng;
use rand::rngs::StdRng;
use std::ops::ControlFlow;
use tracing::{debug, error, info, instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Filling,
    Sweeping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveStats {
    pub attempted: u64,
    pub accepted: u64,
}

impl MoveStats {
    /// Fraction of trial moves that were accepted, or 0 before any move was tried.
    pub fn acceptance_ratio(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }
}

/// Number of cells per axis and the true cell edge for a world of edge `world_size`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellLayout {
    pub cells_per_axis: usize,
    pub cell_length: f64,
}

impl CellLayout {
    /// Resolves the requested sizing against the domain.
    ///
    /// A requested length is stretched to `world_size / floor(world_size / length)` so
    /// that whole cells tile the domain.
    ///
    /// # Errors
    ///
    /// Fails for a non-positive length, a domain that cannot hold one cell, or a
    /// resulting cell narrower than a particle.
    pub fn resolve(world_size: f64, sizing: CellSizing) -> Result<Self, EngineError> {
        let cells_per_axis = match sizing {
            CellSizing::Length(length) => {
                if !(length > 0.0) {
                    return Err(EngineError::NonPositiveCellSize(length));
                }
                let count = (world_size / length).floor();
                if !(count >= 1.0) {
                    return Err(EngineError::DomainTooSmall {
                        world_size,
                        cell_size: length,
                    });
                }
                count as usize
            }
            CellSizing::Count(0) => {
                return Err(EngineError::DomainTooSmall {
                    world_size,
                    cell_size: f64::INFINITY,
                });
            }
            CellSizing::Count(count) => count,
        };

        let cell_length = world_size / cells_per_axis as f64;
        if !(cell_length >= DIAMETER) {
            return Err(EngineError::CellSmallerThanParticle {
                cell_size: cell_length,
                diameter: DIAMETER,
            });
        }
        Ok(Self {
            cells_per_axis,
            cell_length,
        })
    }
}

/// Whether `id` overlaps any particle in its grid neighbourhood.
///
/// Two particles overlap when their squared nearest-image distance is strictly less
/// than the squared diameter.
pub fn overlaps_any(
    world: &World,
    grid: &SpatialGrid,
    id: ParticleId,
) -> Result<bool, EngineError> {
    let flow = grid.visit_neighbors_of(id, |other| {
        if world.separation2(id, other) < DIAMETER * DIAMETER {
            ControlFlow::Break(other)
        } else {
            ControlFlow::Continue(())
        }
    })?;
    Ok(flow.is_break())
}

fn random_position(rng: &mut StdRng, world: &World) -> Vector3<f64> {
    let half = world.size() / 2.0;
    let mut position = Vector3::new(rng.gen_range(-half..half), rng.gen_range(-half..half), 0.0);
    if !world.is_two_dimensional() {
        position.z = rng.gen_range(-half..half);
    }
    position
}

/// Hard-particle Monte Carlo: sequential random insertion followed by sweeps of
/// random single-particle displacements rejected on overlap.
pub struct MonteCarloTask {
    config: MonteCarloConfig,
    phase: Phase,
    stats: MoveStats,
    layout: Option<CellLayout>,
}

impl MonteCarloTask {
    pub fn new(config: MonteCarloConfig) -> Self {
        Self {
            config,
            phase: Phase::Uninitialized,
            stats: MoveStats::default(),
            layout: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> MoveStats {
        self.stats
    }

    /// The resolved grid layout, once `start` has run.
    pub fn layout(&self) -> Option<CellLayout> {
        self.layout
    }

    #[instrument(skip_all, name = "monte_carlo_fill")]
    fn fill(&mut self, sim: &mut Simulation<'_>) -> Result<(), EngineError> {
        let Simulation {
            world,
            grid,
            rng,
            reporter,
        } = sim;
        let grid = grid.as_mut().ok_or(EngineError::GridNotAllocated)?;

        reporter.report(Progress::PhaseStart { name: "Filling" });
        reporter.report(Progress::TaskStart {
            total_steps: world.len() as u64,
        });

        let mut total_attempts = 0u64;
        for id in world.ids() {
            world.set_position(id, Vector3::zeros());
            grid.insert(world, id)?;

            let mut attempts = 0u64;
            loop {
                if self
                    .config
                    .fill_attempt_limit
                    .is_some_and(|limit| attempts >= limit)
                {
                    return Err(EngineError::FillFailed {
                        particle: id.index(),
                        attempts,
                    });
                }
                attempts += 1;
                let position = random_position(rng, world);
                world.set_position(id, position);
                grid.rebox(world, id)?;
                if !overlaps_any(world, grid, id)? {
                    break;
                }
            }
            trace!(particle = %id, attempts, "Placed particle.");
            total_attempts += attempts;
            reporter.report(Progress::TaskIncrement);
        }

        reporter.report(Progress::TaskFinish);
        reporter.report(Progress::PhaseFinish);
        info!(
            particles = world.len(),
            attempts = total_attempts,
            "Filled world without overlaps."
        );
        Ok(())
    }

    /// One sweep: `N` trial moves, each on a particle drawn with replacement.
    fn sweep(&mut self, sim: &mut Simulation<'_>) -> Result<(), EngineError> {
        let Simulation {
            world, grid, rng, ..
        } = sim;
        let grid = grid.as_mut().ok_or(EngineError::GridNotAllocated)?;

        let n = world.len();
        for _ in 0..n {
            let id = ParticleId(rng.gen_range(0..n));
            self.trial_move(world, grid, rng, id)?;
        }
        Ok(())
    }

    /// Displaces `id` by a uniform step and keeps the move only if it creates no
    /// overlap. A rejected move leaves the position and the cell of `id` exactly as
    /// they were. Returns whether the move was accepted.
    fn trial_move(
        &mut self,
        world: &mut World,
        grid: &mut SpatialGrid,
        rng: &mut StdRng,
        id: ParticleId,
    ) -> Result<bool, EngineError> {
        let half_step = self.config.step_size / 2.0;
        let old = world.position(id);
        let mut displacement = Vector3::new(
            rng.gen_range(-half_step..half_step),
            rng.gen_range(-half_step..half_step),
            0.0,
        );
        if !world.is_two_dimensional() {
            displacement.z = rng.gen_range(-half_step..half_step);
        }

        world.set_position(id, old + displacement);
        grid.rebox(world, id)?;
        self.stats.attempted += 1;

        if overlaps_any(world, grid, id)? {
            world.set_position(id, old);
            grid.rebox(world, id)?;
            return Ok(false);
        }
        self.stats.accepted += 1;
        Ok(true)
    }
}

impl<'a> Task<Simulation<'a>> for MonteCarloTask {
    fn name(&self) -> &'static str {
        "monte_carlo"
    }

    fn start(&mut self, sim: &mut Simulation<'a>) -> Result<(), EngineError> {
        let layout = CellLayout::resolve(sim.world.size(), self.config.cell_sizing)?;
        let n = layout.cells_per_axis;
        let nz = if sim.world.is_two_dimensional() { 1 } else { n };
        sim.allocate_grid(n, n, nz, layout.cell_length)?;
        info!(
            cells_per_axis = n,
            cell_length = layout.cell_length,
            world_size = sim.world.size(),
            "Allocated spatial grid."
        );
        sim.reporter.report(Progress::Message(format!(
            "Grid of {} cells per axis, cell size {:.4}",
            n, layout.cell_length
        )));
        self.layout = Some(layout);

        self.phase = Phase::Filling;
        if let Err(e) = self.fill(sim) {
            sim.free_grid();
            self.phase = Phase::Stopped;
            return Err(e);
        }
        self.phase = Phase::Sweeping;
        Ok(())
    }

    fn tick(&mut self, sim: &mut Simulation<'a>, iteration: u64) -> TaskSignal {
        if self.phase != Phase::Sweeping {
            error!(phase = ?self.phase, iteration, "Monte Carlo tick outside the sweeping phase.");
            return TaskSignal::Error;
        }
        match self.sweep(sim) {
            Ok(()) => {
                sim.reporter.report(Progress::Counter {
                    label: "acceptance",
                    value: self.stats.acceptance_ratio(),
                });
                TaskSignal::Ok
            }
            Err(e) => {
                error!(iteration, error = %e, "Monte Carlo sweep failed.");
                TaskSignal::Error
            }
        }
    }

    fn stop(&mut self, sim: &mut Simulation<'a>) -> Result<(), EngineError> {
        debug!(
            attempted = self.stats.attempted,
            accepted = self.stats.accepted,
            acceptance = self.stats.acceptance_ratio(),
            "Monte Carlo statistics."
        );
        sim.free_grid();
        self.phase = Phase::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::world::Dimensionality;
    use crate::engine::progress::ProgressReporter;

    fn config(sizing: CellSizing) -> MonteCarloConfig {
        MonteCarloConfig {
            cell_sizing: sizing,
            step_size: 0.1,
            fill_attempt_limit: None,
        }
    }

    fn min_separation2(world: &World) -> f64 {
        let ids: Vec<_> = world.ids().collect();
        let mut min = f64::INFINITY;
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                min = min.min(world.separation2(a, b));
            }
        }
        min
    }

    #[test]
    fn layout_stretches_requested_length_to_tile_domain() {
        let layout = CellLayout::resolve(10.0, CellSizing::Length(3.0)).unwrap();
        assert_eq!(layout.cells_per_axis, 3);
        assert!((layout.cell_length - 10.0 / 3.0).abs() < 1e-12);

        let layout = CellLayout::resolve(10.0, CellSizing::Count(4)).unwrap();
        assert_eq!(layout.cells_per_axis, 4);
        assert!((layout.cell_length - 2.5).abs() < 1e-12);
    }

    #[test]
    fn layout_rejects_unsatisfiable_setups() {
        assert!(matches!(
            CellLayout::resolve(10.0, CellSizing::Length(0.0)),
            Err(EngineError::NonPositiveCellSize(_))
        ));
        assert!(matches!(
            CellLayout::resolve(10.0, CellSizing::Length(-1.0)),
            Err(EngineError::NonPositiveCellSize(_))
        ));
        assert!(matches!(
            CellLayout::resolve(0.8, CellSizing::Length(1.0)),
            Err(EngineError::DomainTooSmall { .. })
        ));
        assert!(matches!(
            CellLayout::resolve(10.0, CellSizing::Length(0.9)),
            Err(EngineError::CellSmallerThanParticle { .. })
        ));
        assert!(matches!(
            CellLayout::resolve(10.0, CellSizing::Count(11)),
            Err(EngineError::CellSmallerThanParticle { .. })
        ));
        assert!(matches!(
            CellLayout::resolve(0.0, CellSizing::Length(1.0)),
            Err(EngineError::DomainTooSmall { .. })
        ));
    }

    #[test]
    fn fill_of_hundred_spheres_has_no_overlaps_and_passes_self_check() {
        let reporter = ProgressReporter::new();
        let world = World::with_packing_density(100, 0.3, Dimensionality::Three);
        let mut sim = Simulation::new(world, Some(42), &reporter);
        let mut task = MonteCarloTask::new(config(CellSizing::Length(1.2)));

        task.start(&mut sim).unwrap();
        assert_eq!(task.phase(), Phase::Sweeping);

        let grid = sim.grid().unwrap();
        assert_eq!(grid.len(), 100);
        assert_eq!(grid.dims(), [4, 4, 4]);
        assert!(grid.self_check(&sim.world, true));
        assert!(min_separation2(&sim.world) >= DIAMETER * DIAMETER);
    }

    #[test]
    fn fill_in_two_dimensions_uses_a_flat_grid() {
        let reporter = ProgressReporter::new();
        let world = World::with_packing_density(80, 0.4, Dimensionality::Two);
        let mut sim = Simulation::new(world, Some(3), &reporter);
        let mut task = MonteCarloTask::new(config(CellSizing::Length(1.0)));

        task.start(&mut sim).unwrap();
        let grid = sim.grid().unwrap();
        assert_eq!(grid.dims()[2], 1);
        assert!(grid.self_check(&sim.world, true));
        assert!(sim.world.particles().iter().all(|p| p.position.z == 0.0));
        assert!(min_separation2(&sim.world) >= DIAMETER * DIAMETER);
    }

    #[test]
    fn sweeps_never_leave_overlaps() {
        let cases = [(Dimensionality::Three, 0.3), (Dimensionality::Two, 0.4)];
        for (dimensionality, density) in cases {
            let reporter = ProgressReporter::new();
            let world = World::with_packing_density(60, density, dimensionality);
            let mut sim = Simulation::new(world, Some(11), &reporter);
            let mut task = MonteCarloTask::new(MonteCarloConfig {
                cell_sizing: CellSizing::Length(1.0),
                step_size: 0.6,
                fill_attempt_limit: None,
            });

            task.start(&mut sim).unwrap();
            for iteration in 0..25 {
                assert_eq!(task.tick(&mut sim, iteration), TaskSignal::Ok);
                assert!(min_separation2(&sim.world) >= DIAMETER * DIAMETER);
            }
            assert!(sim.grid().unwrap().self_check(&sim.world, true));

            let stats = task.stats();
            assert_eq!(stats.attempted, 60 * 25);
            assert!(stats.accepted > 0 && stats.accepted < stats.attempted);
        }
    }

    #[test]
    fn rejected_moves_restore_position_and_cell_exactly() {
        let reporter = ProgressReporter::new();
        let world = World::with_packing_density(60, 0.3, Dimensionality::Three);
        let mut sim = Simulation::new(world, Some(17), &reporter);
        let mut task = MonteCarloTask::new(MonteCarloConfig {
            cell_sizing: CellSizing::Length(1.0),
            step_size: 1.5,
            fill_attempt_limit: None,
        });
        task.start(&mut sim).unwrap();

        let Simulation {
            world, grid, rng, ..
        } = &mut sim;
        let grid = grid.as_mut().unwrap();
        let mut rejected = 0;
        for round in 0..3000 {
            let id = ParticleId(round % world.len());
            let before = world.position(id);
            let cell = grid.cell_of(id);

            if task.trial_move(world, grid, rng, id).unwrap() {
                let after = world.position(id);
                assert_eq!(grid.cell_of(id), Some(grid.cell_for_position(&after)));
            } else {
                rejected += 1;
                let after = world.position(id);
                assert_eq!(after.map(f64::to_bits), before.map(f64::to_bits));
                assert_eq!(grid.cell_of(id), cell);
            }
        }

        assert!(rejected > 0);
        assert_eq!(task.stats().attempted, 3000);
        assert_eq!(task.stats().attempted - task.stats().accepted, rejected);
        assert!(grid.self_check(world, true));
    }

    #[test]
    fn moves_across_cell_edges_and_the_boundary_are_undone_on_overlap() {
        let reporter = ProgressReporter::new();
        let world = World::new(4, 6.0, Dimensionality::Two);
        let mut sim = Simulation::new(world, Some(4), &reporter);
        // Two stacked pairs: one on a cell edge, one on the periodic boundary.
        let start = [(0.01, 0.01), (0.01, 0.01), (2.99, -3.0), (2.99, -3.0)];
        for (index, &(x, y)) in start.iter().enumerate() {
            sim.world.set_position(ParticleId(index), Vector3::new(x, y, 0.0));
        }
        sim.allocate_grid(6, 6, 1, 1.0).unwrap();
        let mut task = MonteCarloTask::new(config(CellSizing::Length(1.0)));

        let Simulation {
            world, grid, rng, ..
        } = &mut sim;
        let grid = grid.as_mut().unwrap();
        for id in world.ids() {
            grid.insert(world, id).unwrap();
        }
        let before = world.clone();
        let cells: Vec<_> = world.ids().map(|id| grid.cell_of(id)).collect();

        for round in 0..200 {
            let id = ParticleId(round % 4);
            assert!(!task.trial_move(world, grid, rng, id).unwrap());
        }
        assert_eq!(*world, before);
        let cells_after: Vec<_> = world.ids().map(|id| grid.cell_of(id)).collect();
        assert_eq!(cells_after, cells);
        assert_eq!(task.stats().accepted, 0);
        assert!(grid.self_check(world, false));
    }

    #[test]
    fn stop_releases_the_grid_and_keeps_positions() {
        let reporter = ProgressReporter::new();
        let world = World::with_packing_density(20, 0.2, Dimensionality::Three);
        let mut sim = Simulation::new(world, Some(5), &reporter);
        let mut task = MonteCarloTask::new(config(CellSizing::Length(1.0)));
        task.start(&mut sim).unwrap();
        task.tick(&mut sim, 0);
        let positions = sim.world.clone();

        task.stop(&mut sim).unwrap();
        assert_eq!(task.phase(), Phase::Stopped);
        assert!(sim.grid.is_none());
        assert_eq!(sim.world, positions);
        assert_eq!(task.tick(&mut sim, 1), TaskSignal::Error);
    }

    #[test]
    fn exhausted_fill_limit_fails_start_without_leaking_the_grid() {
        let reporter = ProgressReporter::new();
        let world = World::with_packing_density(30, 0.85, Dimensionality::Two);
        let mut sim = Simulation::new(world, Some(9), &reporter);
        let mut task = MonteCarloTask::new(MonteCarloConfig {
            cell_sizing: CellSizing::Length(1.0),
            step_size: 0.1,
            fill_attempt_limit: Some(200),
        });

        assert!(matches!(
            task.start(&mut sim),
            Err(EngineError::FillFailed { attempts: 200, .. })
        ));
        assert!(sim.grid.is_none());
    }

    #[test]
    fn start_on_empty_world_reports_domain_too_small() {
        let reporter = ProgressReporter::new();
        let world = World::with_packing_density(0, 0.3, Dimensionality::Three);
        let mut sim = Simulation::new(world, Some(1), &reporter);
        let mut task = MonteCarloTask::new(config(CellSizing::Length(1.0)));
        assert!(matches!(
            task.start(&mut sim),
            Err(EngineError::DomainTooSmall { .. })
        ));
        assert!(sim.grid.is_none());
    }

    #[test]
    fn overlap_test_uses_nearest_image() {
        let reporter = ProgressReporter::new();
        let world = World::new(2, 4.0, Dimensionality::Three);
        let mut sim = Simulation::new(world, Some(1), &reporter);
        sim.world.set_position(ParticleId(0), Vector3::new(-1.9, 0.0, 0.0));
        sim.world.set_position(ParticleId(1), Vector3::new(1.8, 0.0, 0.0));
        sim.allocate_grid(4, 4, 4, 1.0).unwrap();
        let (world, grid) = sim.world_and_grid().unwrap();
        grid.insert(world, ParticleId(0)).unwrap();
        grid.insert(world, ParticleId(1)).unwrap();
        assert!(overlaps_any(world, grid, ParticleId(0)).unwrap());

        world.set_position(ParticleId(1), Vector3::new(1.0, 0.0, 0.0));
        grid.rebox(world, ParticleId(1)).unwrap();
        assert!(!overlaps_any(world, grid, ParticleId(0)).unwrap());
    }

    #[test]
    fn move_stats_ratio_handles_zero_attempts() {
        assert_eq!(MoveStats::default().acceptance_ratio(), 0.0);
        let stats = MoveStats {
            attempted: 4,
            accepted: 1,
        };
        assert!((stats.acceptance_ratio() - 0.25).abs() < 1e-12);
    }
}
