use super::Sampler;
use crate::core::models::world::Dimensionality;
use crate::engine::config::PairCorrelationConfig;
use crate::engine::context::Simulation;
use crate::engine::error::EngineError;
use crate::engine::scheduler::TaskSignal;
use serde::Serialize;
use std::f64::consts::PI;
use std::path::Path;
use tracing::{debug, info};

/// One bin of the pair correlation function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairCorrelationRow {
    /// Bin centre.
    pub r: f64,
    pub g: f64,
}

/// Accumulates a histogram of nearest-image pair distances and normalises it into
/// `g(r)` when sampling ends.
#[derive(Debug, Clone)]
pub struct PairCorrelationSampler {
    config: PairCorrelationConfig,
    histogram: Vec<u64>,
    samples: u64,
    table: Vec<PairCorrelationRow>,
}

impl PairCorrelationSampler {
    pub fn new(config: PairCorrelationConfig) -> Self {
        Self {
            histogram: vec![0; config.num_bins],
            config,
            samples: 0,
            table: Vec::new(),
        }
    }

    pub fn histogram(&self) -> &[u64] {
        &self.histogram
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// The normalised `(r, g)` table, in increasing `r`. Empty until the sampler stops.
    pub fn table(&self) -> &[PairCorrelationRow] {
        &self.table
    }

    pub fn into_table(self) -> Vec<PairCorrelationRow> {
        self.table
    }

    fn bin_width(&self) -> f64 {
        self.config.max_radius / self.config.num_bins as f64
    }

    /// Normalises the histogram against the pair count expected at uniform density.
    ///
    /// # Arguments
    ///
    /// * `num_particles` - Particles in the world.
    /// * `number_density` - Particles per unit area (2D) or volume (3D).
    /// * `dimensionality` - Chooses the shell measure `2 pi r` or `4 pi r^2`.
    ///
    /// # Return
    ///
    /// One row per bin. Every `g` is 0 when nothing was sampled.
    pub fn normalize(
        &self,
        num_particles: usize,
        number_density: f64,
        dimensionality: Dimensionality,
    ) -> Vec<PairCorrelationRow> {
        let dr = self.bin_width();
        let per_particle = num_particles as f64 * self.samples as f64;
        self.histogram
            .iter()
            .enumerate()
            .map(|(i, &count)| {
                let r = (i as f64 + 0.5) * dr;
                let shell = match dimensionality {
                    Dimensionality::Two => 2.0 * PI * r,
                    Dimensionality::Three => 4.0 * PI * r * r,
                };
                let expected = number_density * dr * shell;
                let g = if per_particle > 0.0 && expected > 0.0 {
                    (2.0 * count as f64 / per_particle) / expected
                } else {
                    0.0
                };
                PairCorrelationRow { r, g }
            })
            .collect()
    }

    fn write_table(&self, path: &Path) -> Result<(), EngineError> {
        let output = |source| EngineError::Output {
            what: "pair correlation table",
            source,
        };
        let mut writer = csv::Writer::from_path(path).map_err(output)?;
        for row in &self.table {
            writer.serialize(row).map_err(output)?;
        }
        writer.flush()?;
        info!(path = %path.display(), rows = self.table.len(), "Wrote pair correlation table.");
        Ok(())
    }
}

impl Sampler for PairCorrelationSampler {
    fn name(&self) -> &'static str {
        "pair_correlation"
    }

    fn start(&mut self, _sim: &Simulation<'_>) -> Result<(), EngineError> {
        self.histogram = vec![0; self.config.num_bins];
        self.samples = 0;
        self.table.clear();
        Ok(())
    }

    fn sample(&mut self, sim: &Simulation<'_>, iteration: u64) -> Result<TaskSignal, EngineError> {
        let grid = sim.grid()?;
        if self.histogram.is_empty() {
            return Ok(TaskSignal::Ok);
        }
        let world = &sim.world;
        let max_radius = self.config.max_radius;
        let last_bin = self.histogram.len() - 1;
        let scale = self.config.num_bins as f64 / max_radius;

        let histogram = &mut self.histogram;
        let mut counted = 0u64;
        grid.visit_pairs_within(max_radius, |a, b| {
            let r = world.separation2(a, b).sqrt();
            if r < max_radius {
                histogram[((r * scale) as usize).min(last_bin)] += 1;
                counted += 1;
            }
        });
        self.samples += 1;
        debug!(iteration, pairs = counted, "Sampled pair distances.");
        Ok(TaskSignal::Ok)
    }

    fn stop(&mut self, sim: &Simulation<'_>) -> Result<(), EngineError> {
        let world = &sim.world;
        self.table = self.normalize(world.len(), world.number_density(), world.dimensionality());
        info!(
            samples = self.samples,
            bins = self.table.len(),
            "Normalised pair correlation."
        );
        if let Some(path) = &self.config.output_path {
            self.write_table(path)?;
        }
        Ok(())
    }
}
