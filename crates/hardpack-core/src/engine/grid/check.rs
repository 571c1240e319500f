//! Consistency checks that recompute the grid's bookkeeping from scratch.
//!
//! These are test and debugging oracles. They walk every cell, so they are far too
//! slow for the Monte Carlo hot path.

use super::{CellIdx, SpatialGrid, flat_index, wrapped_index};
use crate::core::models::ids::ParticleId;
use crate::core::models::world::World;
use itertools::iproduct;
use std::ops::{ControlFlow, RangeInclusive};
use tracing::{error, warn};

/// Offsets along one axis whose cells are distinct from each other and from the
/// origin cell under periodic wrap.
fn distinct_steps(n: usize) -> RangeInclusive<isize> {
    let low = if n >= 3 { -1 } else { 0 };
    let high = if n >= 2 { 1 } else { 0 };
    low..=high
}

impl SpatialGrid {
    /// Recomputes and cross-checks every piece of incremental bookkeeping:
    /// particle list links, per-cell counts, the occupied-cell list, the pair and
    /// neighbour enumeration counts, and (when `verify_cell_assignment` is set)
    /// that every particle sits in the cell its position maps to.
    ///
    /// Problems are logged; the return value says whether everything was consistent.
    pub fn self_check(&self, world: &World, verify_cell_assignment: bool) -> bool {
        let mut ok = self.check_cell_lists(world, verify_cell_assignment);
        ok &= self.check_occupied_list();
        ok &= self.pair_count_check();
        ok &= self.neighbor_count_check();
        ok
    }

    fn check_cell_lists(&self, world: &World, verify_cell_assignment: bool) -> bool {
        let mut ok = true;
        let mut walked = 0;
        let mut counted = 0;

        for (index, cell) in self.cells.iter().enumerate() {
            let this = CellIdx(index);
            let Some(head) = cell.head else {
                if cell.len != 0 {
                    error!(
                        cell = index,
                        expected = cell.len,
                        "Cell has no head but a non-zero count."
                    );
                    ok = false;
                }
                continue;
            };

            let mut p = head;
            let mut found = 0;
            loop {
                let link = self.links[p.index()];
                if self.links[link.next.index()].prev != p
                    || self.links[link.prev.index()].next != p
                {
                    error!(particle = %p, cell = index, "Particle is in a broken list.");
                    ok = false;
                }
                if link.cell != Some(this) {
                    error!(
                        particle = %p,
                        cell = index,
                        "Particle's owning cell does not match its list."
                    );
                    ok = false;
                }
                if verify_cell_assignment {
                    if let Some(particle) = world.particle(p) {
                        let correct = self.cell_for_position(&self.wrap(&particle.position));
                        if correct != this {
                            let position = particle.position;
                            error!(
                                particle = %p,
                                actual = ?self.cell_coords(this),
                                correct = ?self.cell_coords(correct),
                                x = position.x, y = position.y, z = position.z,
                                "Particle is in the wrong cell."
                            );
                            ok = false;
                        }
                    }
                }
                found += 1;
                walked += 1;
                p = link.next;
                if p == head || found > self.links.len() {
                    break;
                }
            }

            if found != cell.len {
                error!(
                    cell = index,
                    found,
                    expected = cell.len,
                    "Cell population mismatch."
                );
                ok = false;
            }
            counted += cell.len;
        }

        if walked != self.num_particles || counted != self.num_particles {
            error!(
                walked,
                counted,
                expected = self.num_particles,
                "Total particle count mismatch."
            );
            ok = false;
        }
        ok
    }

    fn check_occupied_list(&self) -> bool {
        let mut ok = true;

        let mut listed = 0;
        if let Some(head) = self.occupied_head {
            let mut cell = head;
            loop {
                let c = &self.cells[cell.0];
                let next_back = c.next_occupied.and_then(|n| self.cells[n.0].prev_occupied);
                let prev_forward = c.prev_occupied.and_then(|p| self.cells[p.0].next_occupied);
                if next_back != Some(cell) || prev_forward != Some(cell) {
                    error!(cell = cell.0, "Occupied-cell list is broken.");
                    ok = false;
                }
                listed += 1;
                if listed > self.cells.len() {
                    error!("Occupied-cell list holds more cells than the grid has.");
                    ok = false;
                    break;
                }
                match c.next_occupied {
                    Some(next) if next != head => cell = next,
                    _ => break,
                }
            }
        }

        let mut occupied = 0;
        for (index, c) in self.cells.iter().enumerate() {
            let in_list = c.next_occupied.is_some() || c.prev_occupied.is_some();
            if c.len == 0 && in_list {
                error!(
                    cell = index,
                    "Empty cell appears in the occupied-cell list."
                );
                ok = false;
            } else if c.len > 0 {
                occupied += 1;
                if !in_list {
                    error!(
                        cell = index,
                        "Occupied cell is missing from the occupied-cell list."
                    );
                    ok = false;
                }
            }
        }

        if listed != occupied {
            error!(
                listed,
                occupied,
                "Occupied-cell list length does not match occupancy."
            );
            ok = false;
        }
        ok
    }

    /// Checks that [`visit_all_pairs`](Self::visit_all_pairs) never pairs a particle
    /// with itself and visits exactly as many pairs as the cell occupancies imply.
    pub fn pair_count_check(&self) -> bool {
        let mut visited = 0usize;
        let mut self_pairs = 0usize;
        self.visit_all_pairs(|p, q| {
            visited += 1;
            if p == q {
                self_pairs += 1;
            }
        });

        let mut expected = 0usize;
        for (ix, iy, iz) in iproduct!(0..self.dims[0], 0..self.dims[1], 0..self.dims[2]) {
            let cell = CellIdx(flat_index(self.dims, [ix, iy, iz]));
            let n1 = self.population(cell);
            expected += n1 * n1.saturating_sub(1) / 2;
            for other in self.distinct_block(ix, iy, iz) {
                if other > cell {
                    expected += n1 * self.population(other);
                }
            }
        }

        if self_pairs > 0 {
            error!(
                self_pairs,
                "Pair enumeration produced particles paired with themselves."
            );
        }
        if visited != expected {
            warn!(
                visited,
                expected,
                particles = self.num_particles,
                "Pair enumeration visited the wrong number of pairs."
            );
        }
        self_pairs == 0 && visited == expected
    }

    /// Checks, for every particle, that
    /// [`visit_neighbors_of`](Self::visit_neighbors_of) visits each particle of the
    /// surrounding cell block exactly once and never the particle itself.
    pub fn neighbor_count_check(&self) -> bool {
        let mut ok = true;
        for (ix, iy, iz) in iproduct!(0..self.dims[0], 0..self.dims[1], 0..self.dims[2]) {
            let cell = CellIdx(flat_index(self.dims, [ix, iy, iz]));
            let in_block: usize = self
                .distinct_block(ix, iy, iz)
                .filter(|&other| other != cell)
                .map(|other| self.population(other))
                .sum();
            let expected = in_block + self.population(cell).saturating_sub(1);

            for p in self.members(cell) {
                let mut visited = 0usize;
                let mut itself = false;
                let flow = self.visit_neighbors_of(p, |q: ParticleId| {
                    visited += 1;
                    itself |= q == p;
                    ControlFlow::<()>::Continue(())
                });
                if flow.is_err() || itself || visited != expected {
                    warn!(
                        particle = %p,
                        cell = cell.0,
                        visited,
                        expected,
                        itself,
                        "Neighbour enumeration visited the wrong particles."
                    );
                    ok = false;
                }
            }
        }
        ok
    }

    /// The cells of the 3x3x3 block around `(ix, iy, iz)`, restricted to offsets that
    /// are distinct under periodic wrap. Includes the cell itself.
    fn distinct_block(
        &self,
        ix: usize,
        iy: usize,
        iz: usize,
    ) -> impl Iterator<Item = CellIdx> + '_ {
        let [nx, ny, nz] = self.dims;
        iproduct!(distinct_steps(nx), distinct_steps(ny), distinct_steps(nz)).map(
            move |(dx, dy, dz)| {
                CellIdx(flat_index(
                    self.dims,
                    [
                        wrapped_index(ix, dx, nx),
                        wrapped_index(iy, dy, ny),
                        wrapped_index(iz, dz, nz),
                    ],
                ))
            },
        )
    }
}
