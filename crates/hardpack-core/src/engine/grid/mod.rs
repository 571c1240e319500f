//! Uniform spatial partition of the periodic domain.
//!
//! The domain is cut into `nx * ny * nz` cubic cells. Every cell keeps a circular
//! doubly-linked list of the particles inside it, threaded through a per-particle
//! link table indexed by [`ParticleId`]. Cells that hold at least one particle are
//! additionally threaded on a circular *occupied* list, so full-system enumeration
//! never touches empty cells.
//!
//! Each cell stores its six directional neighbours (`-x`, `+x`, `-y`, `+y`, `-z`,
//! `+z`) with the periodic wrap already resolved. When an axis has fewer than three
//! cells, the `+` neighbour is absent (with two cells it would be the same cell as
//! the `-` neighbour), and with a single cell both are absent (the neighbour would be
//! the cell itself). Diagonal neighbours are reached by chasing these links, so an
//! absent link prunes every offset that goes through it.

mod check;

use crate::core::models::ids::ParticleId;
use crate::core::models::world::World;
use crate::core::utils::geometry;
use itertools::iproduct;
use nalgebra::Vector3;
use std::ops::ControlFlow;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum GridError {
    #[error("Grid dimensions must all be non-zero, got {nx}x{ny}x{nz}")]
    ZeroDimension { nx: usize, ny: usize, nz: usize },
    #[error("Cell length must be a finite positive number, got {0}")]
    InvalidCellLength(f64),
    #[error("Particle {0} is already linked into a cell")]
    AlreadyLinked(ParticleId),
    #[error("Particle {0} is not linked into any cell")]
    NotLinked(ParticleId),
    #[error("Particle {id} is outside the grid capacity of {capacity} particles")]
    OutOfRange { id: ParticleId, capacity: usize },
}

/// Index of a cell in the grid's cell array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIdx(usize);

impl CellIdx {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    PrevX = 0,
    NextX = 1,
    PrevY = 2,
    NextY = 3,
    PrevZ = 4,
    NextZ = 5,
}

impl Direction {
    const fn along(axis: usize, step: i8) -> Option<Direction> {
        match (axis, step) {
            (0, -1) => Some(Direction::PrevX),
            (0, 1) => Some(Direction::NextX),
            (1, -1) => Some(Direction::PrevY),
            (1, 1) => Some(Direction::NextY),
            (2, -1) => Some(Direction::PrevZ),
            (2, 1) => Some(Direction::NextZ),
            _ => None,
        }
    }
}

const fn neighbor_offsets() -> [[i8; 3]; 26] {
    let mut offsets = [[0i8; 3]; 26];
    let mut n = 0;
    let mut i = 0;
    while i < 27 {
        let offset = [(i / 9) as i8 - 1, ((i / 3) % 3) as i8 - 1, (i % 3) as i8 - 1];
        if !(offset[0] == 0 && offset[1] == 0 && offset[2] == 0) {
            offsets[n] = offset;
            n += 1;
        }
        i += 1;
    }
    offsets
}

/// All 26 offsets of the 3x3x3 block around a cell, excluding the cell itself.
const NEIGHBOR_OFFSETS: [[i8; 3]; 26] = neighbor_offsets();

#[derive(Debug, Clone, Default)]
struct Cell {
    head: Option<ParticleId>,
    len: usize,
    /// Both `None` exactly when the cell is empty.
    prev_occupied: Option<CellIdx>,
    next_occupied: Option<CellIdx>,
    neighbors: [Option<CellIdx>; 6],
}

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: ParticleId,
    next: ParticleId,
    cell: Option<CellIdx>,
}

impl Link {
    fn detached(id: ParticleId) -> Self {
        Self {
            prev: id,
            next: id,
            cell: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cells: Vec<Cell>,
    links: Vec<Link>,
    occupied_head: Option<CellIdx>,
    dims: [usize; 3],
    cell_length: f64,
    /// `dims * cell_length`, cached for wrapping and cell lookup.
    extent: Vector3<f64>,
    num_particles: usize,
}

impl SpatialGrid {
    /// Allocates an empty `nx * ny * nz` grid with cubic cells of edge `cell_length`,
    /// able to hold the particles `0..capacity`.
    pub fn new(
        nx: usize,
        ny: usize,
        nz: usize,
        cell_length: f64,
        capacity: usize,
    ) -> Result<Self, GridError> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(GridError::ZeroDimension { nx, ny, nz });
        }
        if !(cell_length.is_finite() && cell_length > 0.0) {
            return Err(GridError::InvalidCellLength(cell_length));
        }

        let dims = [nx, ny, nz];
        let mut cells = vec![Cell::default(); nx * ny * nz];
        for (ix, iy, iz) in iproduct!(0..nx, 0..ny, 0..nz) {
            let here = [ix, iy, iz];
            let cell = &mut cells[flat_index(dims, here)];
            for axis in 0..3 {
                let n = dims[axis];
                for step in [-1i8, 1] {
                    let present = if step < 0 { n >= 2 } else { n >= 3 };
                    let Some(direction) = Direction::along(axis, step) else {
                        continue;
                    };
                    cell.neighbors[direction as usize] = present.then(|| {
                        let mut coords = here;
                        coords[axis] = wrapped_index(here[axis], step as isize, n);
                        CellIdx(flat_index(dims, coords))
                    });
                }
            }
        }

        debug!(
            nx,
            ny,
            nz,
            cell_length,
            capacity,
            "Allocated spatial grid of {} cells.",
            cells.len()
        );

        Ok(Self {
            cells,
            links: (0..capacity).map(|i| Link::detached(ParticleId(i))).collect(),
            occupied_head: None,
            dims,
            cell_length,
            extent: Vector3::new(nx as f64, ny as f64, nz as f64) * cell_length,
            num_particles: 0,
        })
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn cell_length(&self) -> f64 {
        self.cell_length
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.extent
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of particles currently linked into the grid.
    pub fn len(&self) -> usize {
        self.num_particles
    }

    pub fn is_empty(&self) -> bool {
        self.num_particles == 0
    }

    pub fn capacity(&self) -> usize {
        self.links.len()
    }

    /// The cell currently owning `id`, if it is linked.
    pub fn cell_of(&self, id: ParticleId) -> Option<CellIdx> {
        self.links.get(id.index()).and_then(|link| link.cell)
    }

    pub fn population(&self, cell: CellIdx) -> usize {
        self.cells.get(cell.0).map_or(0, |c| c.len)
    }

    /// Cell that owns a position already wrapped into the grid's periodic box.
    pub fn cell_for_position(&self, position: &Vector3<f64>) -> CellIdx {
        let shifted = position + self.extent * 0.5;
        let axis_index = |value: f64, n: usize| -> usize {
            let raw = (value / self.cell_length).floor();
            if raw.is_nan() || raw < 0.0 {
                0
            } else {
                (raw as usize).min(n - 1)
            }
        };
        let coords = [
            axis_index(shifted.x, self.dims[0]),
            axis_index(shifted.y, self.dims[1]),
            axis_index(shifted.z, self.dims[2]),
        ];
        CellIdx(flat_index(self.dims, coords))
    }

    /// Wraps `position` into the grid's periodic box.
    pub fn wrap(&self, position: &Vector3<f64>) -> Vector3<f64> {
        geometry::wrap_periodic(&self.extent, position)
    }

    /// Links `id` into the cell owning its (wrapped) position.
    pub fn insert(&mut self, world: &mut World, id: ParticleId) -> Result<(), GridError> {
        let link = self.link(id)?;
        if link.cell.is_some() {
            return Err(GridError::AlreadyLinked(id));
        }
        let position = self.wrap(&world.position(id));
        world.set_position(id, position);
        let cell = self.cell_for_position(&position);
        self.attach(id, cell);
        self.num_particles += 1;
        Ok(())
    }

    /// Unlinks `id` from its cell.
    pub fn remove(&mut self, id: ParticleId) -> Result<(), GridError> {
        self.detach(id)?;
        self.num_particles -= 1;
        Ok(())
    }

    /// Re-wraps the position of `id` and moves it to the correct cell if it left
    /// its current one. Returns whether the particle changed cell.
    pub fn rebox(&mut self, world: &mut World, id: ParticleId) -> Result<bool, GridError> {
        let current = self.link(id)?.cell.ok_or(GridError::NotLinked(id))?;
        let position = self.wrap(&world.position(id));
        world.set_position(id, position);
        let correct = self.cell_for_position(&position);
        if correct == current {
            return Ok(false);
        }
        self.detach(id)?;
        self.attach(id, correct);
        Ok(true)
    }

    /// Reboxes every particle of `world`. Returns how many changed cell.
    pub fn rebox_all(&mut self, world: &mut World) -> Result<usize, GridError> {
        let mut moved = 0;
        for id in world.ids() {
            if self.rebox(world, id)? {
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// Calls `visit` with every particle sharing a cell with `id` and every particle in
    /// the adjacent cells (26 in 3D, 8 in 2D), stopping at the first `Break`.
    pub fn visit_neighbors_of<B>(
        &self,
        id: ParticleId,
        mut visit: impl FnMut(ParticleId) -> ControlFlow<B>,
    ) -> Result<ControlFlow<B>, GridError> {
        let link = self.link(id)?;
        let cell = link.cell.ok_or(GridError::NotLinked(id))?;
        Ok(self.walk_neighbors(id, link, cell, &mut visit))
    }

    fn walk_neighbors<B>(
        &self,
        id: ParticleId,
        link: Link,
        cell: CellIdx,
        visit: &mut impl FnMut(ParticleId) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        let mut other = link.next;
        for _ in 1..self.cells[cell.0].len {
            visit(other)?;
            other = self.links[other.index()].next;
        }
        debug_assert_eq!(other, id);

        for offset in NEIGHBOR_OFFSETS {
            if let Some(neighbor) = self.offset_cell(cell, offset) {
                for other in self.members(neighbor) {
                    visit(other)?;
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Calls `visit` once for every unordered pair of distinct particles that share
    /// a cell or sit in adjacent cells. No visiting order is guaranteed.
    pub fn visit_all_pairs(&self, mut visit: impl FnMut(ParticleId, ParticleId)) {
        for cell in self.occupied_cells() {
            let len = self.cells[cell.0].len;
            let mut first = self.cells[cell.0].head;
            for i in 0..len {
                let Some(p) = first else { break };
                let mut q = self.links[p.index()].next;
                for _ in (i + 1)..len {
                    visit(p, q);
                    q = self.links[q.index()].next;
                }
                first = Some(self.links[p.index()].next);
            }

            for offset in NEIGHBOR_OFFSETS {
                let Some(neighbor) = self.offset_cell(cell, offset) else {
                    continue;
                };
                if neighbor <= cell || self.cells[neighbor.0].len == 0 {
                    continue;
                }
                for p in self.members(cell) {
                    for q in self.members(neighbor) {
                        visit(p, q);
                    }
                }
            }
        }
    }

    /// Like [`visit_all_pairs`](Self::visit_all_pairs), but widens the cell block so
    /// that every pair closer than `radius` is visited, even when `radius` exceeds the
    /// cell length. Pairs farther apart may be visited too; callers filter by distance.
    pub fn visit_pairs_within(&self, radius: f64, mut visit: impl FnMut(ParticleId, ParticleId)) {
        let reach = (radius / self.cell_length).ceil();
        if !(reach > 1.0) {
            return self.visit_all_pairs(visit);
        }
        // Past the widest axis every cell is already in reach.
        let widest = self.dims.iter().copied().max().unwrap_or(1);
        let reach = reach.min(widest as f64) as isize;
        // Offsets that name distinct cells along each axis under periodic wrap.
        let steps = self.dims.map(|n| {
            if 2 * reach + 1 >= n as isize {
                (0..n as isize).collect::<Vec<_>>()
            } else {
                (-reach..=reach).collect()
            }
        });

        for cell in self.occupied_cells() {
            let [ix, iy, iz] = self.cell_coords(cell);
            for (&dx, &dy, &dz) in iproduct!(&steps[0], &steps[1], &steps[2]) {
                let other = CellIdx(flat_index(
                    self.dims,
                    [
                        wrapped_index(ix, dx, self.dims[0]),
                        wrapped_index(iy, dy, self.dims[1]),
                        wrapped_index(iz, dz, self.dims[2]),
                    ],
                ));
                if other < cell || self.cells[other.0].len == 0 {
                    continue;
                }
                if other == cell {
                    let members: Vec<_> = self.members(cell).collect();
                    for (i, &p) in members.iter().enumerate() {
                        for &q in &members[i + 1..] {
                            visit(p, q);
                        }
                    }
                } else {
                    for p in self.members(cell) {
                        for q in self.members(other) {
                            visit(p, q);
                        }
                    }
                }
            }
        }
    }

    fn cell_coords(&self, cell: CellIdx) -> [usize; 3] {
        let [_, ny, nz] = self.dims;
        [cell.0 / (ny * nz), (cell.0 / nz) % ny, cell.0 % nz]
    }

    /// Unlinks every particle, leaving all cells empty.
    pub fn clear(&mut self) {
        for index in 0..self.cells.len() {
            while let Some(head) = self.cells[index].head {
                if self.detach(head).is_err() {
                    break;
                }
            }
        }
        self.num_particles = 0;
        self.occupied_head = None;
    }

    /// Iterates over the particles of `cell`, starting at its head.
    pub fn members(&self, cell: CellIdx) -> CellMembers<'_> {
        let c = &self.cells[cell.0];
        CellMembers {
            grid: self,
            next: c.head,
            remaining: c.len,
        }
    }

    /// Iterates over the occupied cells in occupied-list order.
    pub fn occupied_cells(&self) -> OccupiedCells<'_> {
        OccupiedCells {
            grid: self,
            next: self.occupied_head,
            remaining: self.cells.len(),
        }
    }

    fn offset_cell(&self, cell: CellIdx, offset: [i8; 3]) -> Option<CellIdx> {
        let mut current = cell;
        for (axis, &step) in offset.iter().enumerate() {
            if let Some(direction) = Direction::along(axis, step) {
                current = self.cells[current.0].neighbors[direction as usize]?;
            }
        }
        Some(current)
    }

    fn link(&self, id: ParticleId) -> Result<Link, GridError> {
        self.links
            .get(id.index())
            .copied()
            .ok_or(GridError::OutOfRange {
                id,
                capacity: self.links.len(),
            })
    }

    fn attach(&mut self, id: ParticleId, cell: CellIdx) {
        let c = &mut self.cells[cell.0];
        c.len += 1;
        match c.head {
            None => {
                c.head = Some(id);
                self.links[id.index()] = Link {
                    prev: id,
                    next: id,
                    cell: Some(cell),
                };
                self.push_occupied(cell);
            }
            Some(head) => {
                let tail = self.links[head.index()].prev;
                self.links[id.index()] = Link {
                    prev: tail,
                    next: head,
                    cell: Some(cell),
                };
                self.links[tail.index()].next = id;
                self.links[head.index()].prev = id;
            }
        }
    }

    fn detach(&mut self, id: ParticleId) -> Result<CellIdx, GridError> {
        let link = self.link(id)?;
        let cell = link.cell.ok_or(GridError::NotLinked(id))?;
        let c = &mut self.cells[cell.0];
        c.len -= 1;
        if c.len == 0 {
            c.head = None;
            self.pop_occupied(cell);
        } else {
            if c.head == Some(id) {
                c.head = Some(link.next);
            }
            self.links[link.prev.index()].next = link.next;
            self.links[link.next.index()].prev = link.prev;
        }
        self.links[id.index()] = Link::detached(id);
        Ok(cell)
    }

    fn push_occupied(&mut self, cell: CellIdx) {
        match self.occupied_head {
            None => {
                let c = &mut self.cells[cell.0];
                c.prev_occupied = Some(cell);
                c.next_occupied = Some(cell);
                self.occupied_head = Some(cell);
            }
            Some(head) => {
                let tail = self.cells[head.0].prev_occupied.unwrap_or(head);
                let c = &mut self.cells[cell.0];
                c.prev_occupied = Some(tail);
                c.next_occupied = Some(head);
                self.cells[tail.0].next_occupied = Some(cell);
                self.cells[head.0].prev_occupied = Some(cell);
            }
        }
    }

    fn pop_occupied(&mut self, cell: CellIdx) {
        let (prev, next) = {
            let c = &mut self.cells[cell.0];
            (c.prev_occupied.take(), c.next_occupied.take())
        };
        match (prev, next) {
            (Some(prev), Some(next)) if next != cell => {
                self.cells[prev.0].next_occupied = Some(next);
                self.cells[next.0].prev_occupied = Some(prev);
                if self.occupied_head == Some(cell) {
                    self.occupied_head = Some(next);
                }
            }
            _ => self.occupied_head = None,
        }
    }
}

pub struct CellMembers<'g> {
    grid: &'g SpatialGrid,
    next: Option<ParticleId>,
    remaining: usize,
}

impl Iterator for CellMembers<'_> {
    type Item = ParticleId;

    fn next(&mut self) -> Option<ParticleId> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next?;
        self.remaining -= 1;
        self.next = Some(self.grid.links[current.index()].next);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

pub struct OccupiedCells<'g> {
    grid: &'g SpatialGrid,
    next: Option<CellIdx>,
    /// Bound on the walk, so a corrupted list cannot loop forever.
    remaining: usize,
}

impl Iterator for OccupiedCells<'_> {
    type Item = CellIdx;

    fn next(&mut self) -> Option<CellIdx> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next?;
        self.remaining -= 1;
        let head = self.grid.occupied_head;
        self.next = self.grid.cells[current.0]
            .next_occupied
            .filter(|&c| Some(c) != head);
        Some(current)
    }
}

#[inline]
fn flat_index(dims: [usize; 3], coords: [usize; 3]) -> usize {
    coords[0] * dims[1] * dims[2] + coords[1] * dims[2] + coords[2]
}

#[inline]
fn wrapped_index(index: usize, step: isize, n: usize) -> usize {
    (index as isize + step).rem_euclid(n as isize) as usize
}
