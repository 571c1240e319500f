use nalgebra::Vector3;

/// Radius of every particle. All particles share the same size.
pub const RADIUS: f64 = 0.5;

/// Diameter of every particle; two particles overlap when closer than this.
pub const DIAMETER: f64 = 2.0 * RADIUS;

/// A single hard sphere (or disk in 2D mode).
///
/// Only the position lives here. Which cell of the spatial grid currently owns
/// the particle is tracked by the grid itself, so a particle can outlive the grid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Particle {
    /// Position in the domain. The z component is unused (kept at 0) in 2D mode.
    pub position: Vector3<f64>,
}

impl Particle {
    pub fn new(position: Vector3<f64>) -> Self {
        Self { position }
    }
}
