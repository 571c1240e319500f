use thiserror::Error;

use super::config::ConfigError;
use super::grid::GridError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Spatial grid error: {0}")]
    Grid(#[from] GridError),

    #[error("Spatial grid is already allocated; free it before allocating a new one")]
    GridAlreadyAllocated,

    #[error("Spatial grid is not allocated")]
    GridNotAllocated,

    #[error("Cell size must be positive, got {0}")]
    NonPositiveCellSize(f64),

    #[error("Cell size {cell_size} is smaller than the particle diameter {diameter}")]
    CellSmallerThanParticle { cell_size: f64, diameter: f64 },

    #[error("World of size {world_size} is too small to hold a single cell of size {cell_size}")]
    DomainTooSmall { world_size: f64, cell_size: f64 },

    #[error("Could not place particle {particle} without overlap after {attempts} attempts")]
    FillFailed { particle: usize, attempts: u64 },

    #[error("Failed to write {what}: {source}")]
    Output {
        what: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
