use super::ids::ParticleId;
use super::particle::{Particle, RADIUS};
use crate::core::utils::geometry;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Number of spatial dimensions the simulation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Dimensionality {
    /// Hard disks in a periodic square.
    #[serde(rename = "2d")]
    Two,
    /// Hard spheres in a periodic cube.
    #[default]
    #[serde(rename = "3d")]
    Three,
}

impl Dimensionality {
    /// Number of axes actually used (2 or 3).
    pub fn axes(self) -> usize {
        match self {
            Dimensionality::Two => 2,
            Dimensionality::Three => 3,
        }
    }

    /// Area (2D) or volume (3D) of a single particle.
    pub fn particle_measure(self) -> f64 {
        match self {
            Dimensionality::Two => PI * RADIUS * RADIUS,
            Dimensionality::Three => 4.0 / 3.0 * PI * RADIUS * RADIUS * RADIUS,
        }
    }
}

/// Fixed-capacity store of identical particles in a periodic domain.
///
/// The world is created once, sized to the requested particle count, and is never
/// resized. Positions are centred on the origin, so every used coordinate lies in
/// `[-size / 2, size / 2)` once it has been wrapped.
#[derive(Debug, Clone, PartialEq)]
pub struct World {
    /// Particle arena, addressed by [`ParticleId`].
    particles: Vec<Particle>,
    /// Edge length of the periodic domain along every used axis.
    size: f64,
    /// Whether the domain is a square (2D) or a cube (3D).
    dimensionality: Dimensionality,
}

impl World {
    /// Creates a world of `num_particles` particles, all at the origin.
    ///
    /// # Arguments
    ///
    /// * `num_particles` - Capacity of the arena.
    /// * `size` - Edge length of the periodic domain.
    /// * `dimensionality` - 2D disks or 3D spheres.
    pub fn new(num_particles: usize, size: f64, dimensionality: Dimensionality) -> Self {
        Self {
            particles: vec![Particle::default(); num_particles],
            size,
            dimensionality,
        }
    }

    /// Creates a world whose edge length is chosen so that `num_particles`
    /// unit-diameter particles fill the requested packing fraction.
    pub fn with_packing_density(
        num_particles: usize,
        packing_density: f64,
        dimensionality: Dimensionality,
    ) -> Self {
        let size = Self::edge_length_for(num_particles, packing_density, dimensionality);
        Self::new(num_particles, size, dimensionality)
    }

    /// Edge length of a domain holding `num_particles` at `packing_density`.
    ///
    /// `sqrt(N * pi r^2 / density)` in 2D, `cbrt(N * 4/3 pi r^3 / density)` in 3D.
    pub fn edge_length_for(
        num_particles: usize,
        packing_density: f64,
        dimensionality: Dimensionality,
    ) -> f64 {
        let measure = num_particles as f64 * dimensionality.particle_measure() / packing_density;
        match dimensionality {
            Dimensionality::Two => measure.sqrt(),
            Dimensionality::Three => measure.cbrt(),
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn dimensionality(&self) -> Dimensionality {
        self.dimensionality
    }

    pub fn is_two_dimensional(&self) -> bool {
        self.dimensionality == Dimensionality::Two
    }

    /// Periodic lengths per axis; the unused z axis reports 0 in 2D mode.
    pub fn extent(&self) -> Vector3<f64> {
        match self.dimensionality {
            Dimensionality::Two => Vector3::new(self.size, self.size, 0.0),
            Dimensionality::Three => Vector3::new(self.size, self.size, self.size),
        }
    }

    /// Area (2D) or volume (3D) of the domain.
    pub fn domain_measure(&self) -> f64 {
        self.size.powi(self.dimensionality.axes() as i32)
    }

    /// Particles per unit area (2D) or volume (3D).
    pub fn number_density(&self) -> f64 {
        self.len() as f64 / self.domain_measure()
    }

    /// Fraction of the domain covered by particles.
    pub fn packing_fraction(&self) -> f64 {
        self.number_density() * self.dimensionality.particle_measure()
    }

    pub fn particle(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(id.index())
    }

    pub fn particle_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        self.particles.get_mut(id.index())
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Position of a particle.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a particle of this world.
    #[inline]
    pub fn position(&self, id: ParticleId) -> Vector3<f64> {
        self.particles[id.index()].position
    }

    /// Overwrites the position of a particle.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a particle of this world.
    #[inline]
    pub fn set_position(&mut self, id: ParticleId, position: Vector3<f64>) {
        self.particles[id.index()].position = position;
    }

    /// Returns an iterator over the ids of all particles, in arena order.
    pub fn ids(&self) -> impl Iterator<Item = ParticleId> + use<> {
        (0..self.particles.len()).map(ParticleId)
    }

    /// Nearest-image vector pointing from `a` to `b`.
    pub fn nearest_image_vector(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> Vector3<f64> {
        geometry::nearest_image_vector(&self.extent(), a, b)
    }

    pub fn nearest_image_distance(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
        self.nearest_image_vector(a, b).norm()
    }

    pub fn nearest_image_distance2(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
        self.nearest_image_vector(a, b).norm_squared()
    }

    /// Unit vector along the nearest-image direction from `a` to `b`.
    ///
    /// Returns `None` when both positions coincide.
    pub fn nearest_image_unit_vector(
        &self,
        a: &Vector3<f64>,
        b: &Vector3<f64>,
    ) -> Option<Vector3<f64>> {
        self.nearest_image_vector(a, b).try_normalize(f64::EPSILON)
    }

    /// Squared nearest-image distance between two particles of this world.
    #[inline]
    pub fn separation2(&self, a: ParticleId, b: ParticleId) -> f64 {
        self.nearest_image_distance2(&self.position(a), &self.position(b))
    }
}
