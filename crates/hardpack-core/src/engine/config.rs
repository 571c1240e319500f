use crate::core::models::world::Dimensionality;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemConfig {
    pub num_particles: usize,
    /// Fraction of the domain covered by particles.
    pub packing_density: f64,
    pub dimensionality: Dimensionality,
}

/// How the spatial grid is sized along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellSizing {
    /// Requested cell edge length. The true length is stretched so that an integer
    /// number of cells tiles the domain.
    Length(f64),
    /// Explicit number of cells per axis.
    Count(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonteCarloConfig {
    pub cell_sizing: CellSizing,
    /// Maximum extent of a trial displacement; each axis moves by up to `step_size / 2`.
    pub step_size: f64,
    /// Give up filling after this many rejected positions for a single particle.
    pub fill_attempt_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairCorrelationConfig {
    pub num_bins: usize,
    pub max_radius: f64,
    /// Where to write the `(r, g)` table. Nothing is written when absent.
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementConfig {
    /// Iterations to wait before the first sample is taken.
    pub relax_iterations: u64,
    /// Iterations between two samples. Zero disables measuring.
    pub sample_interval: u64,
    /// Length of the sampling period; sample indefinitely when `None`.
    pub sample_iterations: Option<u64>,
    pub pair_correlation: PairCorrelationConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub system: SystemConfig,
    pub monte_carlo: MonteCarloConfig,
    pub measurement: Option<MeasurementConfig>,
    pub seed: Option<u64>,
    /// Hard cap on scheduler iterations; run until a task stops when `None`.
    pub max_iterations: Option<u64>,
}

#[derive(Default)]
pub struct SimulationConfigBuilder {
    num_particles: Option<usize>,
    packing_density: Option<f64>,
    dimensionality: Option<Dimensionality>,
    cell_sizing: Option<CellSizing>,
    step_size: Option<f64>,
    fill_attempt_limit: Option<u64>,
    measurement: Option<MeasurementConfig>,
    seed: Option<u64>,
    max_iterations: Option<u64>,
}

impl SimulationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_particles(mut self, n: usize) -> Self {
        self.num_particles = Some(n);
        self
    }
    pub fn packing_density(mut self, density: f64) -> Self {
        self.packing_density = Some(density);
        self
    }
    pub fn dimensionality(mut self, dimensionality: Dimensionality) -> Self {
        self.dimensionality = Some(dimensionality);
        self
    }
    pub fn cell_sizing(mut self, sizing: CellSizing) -> Self {
        self.cell_sizing = Some(sizing);
        self
    }
    pub fn step_size(mut self, delta: f64) -> Self {
        self.step_size = Some(delta);
        self
    }
    pub fn fill_attempt_limit(mut self, limit: Option<u64>) -> Self {
        self.fill_attempt_limit = limit;
        self
    }
    pub fn measurement(mut self, measurement: Option<MeasurementConfig>) -> Self {
        self.measurement = measurement;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
    pub fn max_iterations(mut self, iterations: Option<u64>) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn build(self) -> Result<SimulationConfig, ConfigError> {
        let system = SystemConfig {
            num_particles: self
                .num_particles
                .ok_or(ConfigError::MissingParameter("num_particles"))?,
            packing_density: self
                .packing_density
                .ok_or(ConfigError::MissingParameter("packing_density"))?,
            dimensionality: self
                .dimensionality
                .ok_or(ConfigError::MissingParameter("dimensionality"))?,
        };
        let monte_carlo = MonteCarloConfig {
            cell_sizing: self
                .cell_sizing
                .ok_or(ConfigError::MissingParameter("cell_sizing"))?,
            step_size: self
                .step_size
                .ok_or(ConfigError::MissingParameter("step_size"))?,
            fill_attempt_limit: self.fill_attempt_limit,
        };

        require_positive("packing_density", system.packing_density)?;
        require_positive("step_size", monte_carlo.step_size)?;
        match monte_carlo.cell_sizing {
            CellSizing::Length(length) => require_positive("cell_size", length)?,
            CellSizing::Count(0) => {
                return Err(ConfigError::InvalidParameter {
                    name: "cell_count",
                    reason: "at least one cell per axis is required".to_string(),
                });
            }
            CellSizing::Count(_) => {}
        }
        if let Some(measurement) = &self.measurement {
            let pc = &measurement.pair_correlation;
            if pc.num_bins == 0 {
                return Err(ConfigError::InvalidParameter {
                    name: "num_bins",
                    reason: "the histogram needs at least one bin".to_string(),
                });
            }
            require_positive("max_radius", pc.max_radius)?;
        }

        Ok(SimulationConfig {
            system,
            monte_carlo,
            measurement: self.measurement,
            seed: self.seed,
            max_iterations: self.max_iterations,
        })
    }
}

fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must be a finite positive number, got {}", value),
        })
    }
}
