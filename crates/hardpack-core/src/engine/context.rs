use super::error::EngineError;
use super::grid::SpatialGrid;
use super::progress::ProgressReporter;
use crate::core::models::world::World;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

/// Mutable state shared by every task of a run.
///
/// The world lives for the whole run. The grid exists only between the Monte Carlo
/// task's `start` and `stop`; readers must treat a missing grid as "no queries
/// possible" rather than as an error in the world.
pub struct Simulation<'a> {
    pub world: World,
    pub grid: Option<SpatialGrid>,
    pub rng: StdRng,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> Simulation<'a> {
    /// Creates a context around `world`. The generator is seeded from `seed` when given,
    /// otherwise from system entropy.
    pub fn new(world: World, seed: Option<u64>, reporter: &'a ProgressReporter<'a>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            world,
            grid: None,
            rng,
            reporter,
        }
    }

    /// Allocates an empty `nx * ny * nz` grid sized for every particle of the world.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::GridAlreadyAllocated`] if a grid exists, or the grid's own
    /// validation error for zero dimensions or a bad cell length.
    pub fn allocate_grid(
        &mut self,
        nx: usize,
        ny: usize,
        nz: usize,
        cell_length: f64,
    ) -> Result<&mut SpatialGrid, EngineError> {
        if self.grid.is_some() {
            return Err(EngineError::GridAlreadyAllocated);
        }
        let grid = SpatialGrid::new(nx, ny, nz, cell_length, self.world.len())?;
        Ok(self.grid.insert(grid))
    }

    /// Unlinks every particle and releases the grid. Does nothing when no grid exists.
    pub fn free_grid(&mut self) {
        if let Some(mut grid) = self.grid.take() {
            debug!(particles = grid.len(), "Releasing spatial grid.");
            grid.clear();
        }
    }

    pub fn grid(&self) -> Result<&SpatialGrid, EngineError> {
        self.grid.as_ref().ok_or(EngineError::GridNotAllocated)
    }

    /// Splits the context into the world and the grid so both can be mutated together.
    pub fn world_and_grid(&mut self) -> Result<(&mut World, &mut SpatialGrid), EngineError> {
        let grid = self.grid.as_mut().ok_or(EngineError::GridNotAllocated)?;
        Ok((&mut self.world, grid))
    }
}
