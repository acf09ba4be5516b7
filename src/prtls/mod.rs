pub mod boundary;
pub mod push;
pub mod sort;

use crate::flds::grid::ScalarGrid;
use crate::{Float, SpeciesConfig};
use itertools::izip;
use rand::prelude::*;
use rand::rngs::SmallRng;
use serde::Deserialize;

/// Edge length of the square particle tiles, in cells.
pub const TILE_SIZE: usize = 16;

/// Structure-of-arrays particle buffer. All arrays share the same capacity;
/// `size` is the number of occupied slots. A slot with `invalid == true` is
/// logically empty and reclaimed by the sorter.
pub struct PartVec {
    pub ix: Vec<i32>,
    pub iy: Vec<i32>,
    pub x: Vec<Float>,
    pub y: Vec<Float>,
    pub ux: Vec<Float>,
    pub uy: Vec<Float>,
    pub uz: Vec<Float>,
    pub invalid: Vec<bool>,
    pub size: usize,
}

impl PartVec {
    pub fn with_capacity(cap: usize) -> PartVec {
        PartVec {
            ix: vec![0; cap],
            iy: vec![0; cap],
            x: vec![0.0; cap],
            y: vec![0.0; cap],
            ux: vec![0.0; cap],
            uy: vec![0.0; cap],
            uz: vec![0.0; cap],
            invalid: vec![true; cap],
            size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ix.len()
    }

    pub fn realloc(&mut self, new_cap: usize) {
        self.ix.resize(new_cap, 0);
        self.iy.resize(new_cap, 0);
        self.x.resize(new_cap, 0.0);
        self.y.resize(new_cap, 0.0);
        self.ux.resize(new_cap, 0.0);
        self.uy.resize(new_cap, 0.0);
        self.uz.resize(new_cap, 0.0);
        self.invalid.resize(new_cap, true);
    }

    pub fn clear(&mut self) {
        self.size = 0;
    }

    #[inline]
    pub fn push(&mut self, ix: i32, iy: i32, x: Float, y: Float, ux: Float, uy: Float, uz: Float) {
        assert!(
            self.size < self.capacity(),
            "particle buffer overflow: capacity {}",
            self.capacity()
        );
        let k = self.size;
        self.ix[k] = ix;
        self.iy[k] = iy;
        self.x[k] = x;
        self.y[k] = y;
        self.ux[k] = ux;
        self.uy[k] = uy;
        self.uz[k] = uz;
        self.invalid[k] = false;
        self.size += 1;
    }

    /// Move every particle of `other` into this buffer and reset it.
    pub fn append_drain(&mut self, other: &mut PartVec) {
        for k in 0..other.size {
            self.push(
                other.ix[k], other.iy[k], other.x[k], other.y[k], other.ux[k], other.uy[k],
                other.uz[k],
            );
        }
        other.size = 0;
    }

    pub fn n_alive(&self) -> usize {
        self.invalid[..self.size].iter().filter(|v| !**v).count()
    }
}

/// Initial density profile of a species. Positions are in simulation units
/// and move with the window.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Density {
    Uniform { n: Float },
    Step { n: Float, start: Float },
    Slab { n: Float, start: Float, end: Float },
}

impl Density {
    pub fn n(&self) -> Float {
        match *self {
            Density::Uniform { n } => n,
            Density::Step { n, .. } => n,
            Density::Slab { n, .. } => n,
        }
    }

    fn admits(&self, pos: Float) -> bool {
        match *self {
            Density::Uniform { .. } => true,
            Density::Step { start, .. } => pos >= start,
            Density::Slab { start, end, .. } => pos >= start && pos < end,
        }
    }
}

/// One particle species inside one region: the SoA main vector bucketed
/// into tiles, the incoming buffers filled by the neighbouring regions
/// (and by moving-window injection), and the staged outgoing buffers the
/// simulation hands to the neighbours after the boundary kernel.
pub struct Species {
    pub name: String,
    /// mass over charge ratio
    pub m_q: Float,
    /// charge of an individual macro-particle
    pub q: Float,
    pub ppc: [usize; 2],
    pub ufl: [Float; 3],
    pub uth: [Float; 3],
    pub density: Density,

    pub nx: [usize; 2],
    pub dx: [Float; 2],
    pub dt: Float,
    pub iter: u32,
    pub moving_window: bool,
    pub n_move: i32,

    pub limits_y: [i32; 2],
    pub n_tiles_x: usize,
    pub n_tiles_y: usize,

    pub main: PartVec,
    /// 0: from the region above, 1: from the region below, 2: window injection
    pub incoming: [PartVec; 3],
    /// 0: leaving downwards, 1: leaving upwards
    pub outgoing: [PartVec; 2],
    pub tile_offset: Vec<i32>,
    pub mv_part_offset: Vec<i32>,

    rng: SmallRng,
}

impl Species {
    pub fn new(
        cfg: &SpeciesConfig,
        nx: [usize; 2],
        dx: [Float; 2],
        dt: Float,
        limits_y: [i32; 2],
        moving_window: bool,
        seed: u64,
    ) -> Species {
        let ny_region = (limits_y[1] - limits_y[0]) as usize;
        let n_tiles_x = nx[0] / TILE_SIZE;
        let n_tiles_y = ny_region / TILE_SIZE;
        let n_tiles = n_tiles_x * n_tiles_y;

        let np_cell = cfg.ppc[0] * cfg.ppc[1];
        // q carries the sign of m_q and the reference density
        let q = cfg.density.n() / np_cell as Float * cfg.m_q.signum();

        let np_max = nx[0] * ny_region * np_cell;
        let cap = (np_max / 1024 + 2) * 1024;
        // transfer buffers sized for the perimeter tiles with headroom
        let edge_cap = (np_cell * nx[0].max(ny_region) * 8).max(1024);

        let mut spec = Species {
            name: cfg.name.clone(),
            m_q: cfg.m_q,
            q,
            ppc: cfg.ppc,
            ufl: cfg.ufl,
            uth: cfg.uth,
            density: cfg.density,
            nx,
            dx,
            dt,
            iter: 0,
            moving_window,
            n_move: 0,
            limits_y,
            n_tiles_x,
            n_tiles_y,
            main: PartVec::with_capacity(cap),
            incoming: [
                PartVec::with_capacity(edge_cap),
                PartVec::with_capacity(edge_cap),
                PartVec::with_capacity(edge_cap),
            ],
            outgoing: [
                PartVec::with_capacity(edge_cap),
                PartVec::with_capacity(edge_cap),
            ],
            tile_offset: vec![0; n_tiles + 1],
            mv_part_offset: vec![0; n_tiles + 1],
            rng: SmallRng::seed_from_u64(seed),
        };

        let range_x = [0, nx[0] as i32];
        let Species {
            main,
            ppc,
            density,
            dx: sdx,
            ufl,
            uth,
            rng,
            ..
        } = &mut spec;
        inject_particles(main, range_x, limits_y, *ppc, density, *sdx, 0, *ufl, *uth, rng);
        sort::full_sort(&mut spec);
        spec
    }

    pub fn n_alive(&self) -> usize {
        self.main.n_alive()
    }

    /// Bilinear charge deposit onto a scalar grid, global row indices.
    pub fn deposit_charge(&self, rho: &mut ScalarGrid) {
        let q = self.q;
        let n = self.main.size;
        for (ix, iy, x, y, invalid) in izip!(
            &self.main.ix[..n],
            &self.main.iy[..n],
            &self.main.x[..n],
            &self.main.y[..n],
            &self.main.invalid[..n]
        ) {
            if *invalid {
                continue;
            }
            *rho.get_mut(*ix, *iy) += (1.0 - x) * (1.0 - y) * q;
            *rho.get_mut(*ix + 1, *iy) += x * (1.0 - y) * q;
            *rho.get_mut(*ix, *iy + 1) += (1.0 - x) * y * q;
            *rho.get_mut(*ix + 1, *iy + 1) += x * y * q;
        }
    }

    /// Total kinetic energy of the species, m(gamma - 1) per particle.
    pub fn kinetic_energy(&self) -> f64 {
        let n = self.main.size;
        let mut acc = 0.0f64;
        for (ux, uy, uz, invalid) in izip!(
            &self.main.ux[..n],
            &self.main.uy[..n],
            &self.main.uz[..n],
            &self.main.invalid[..n]
        ) {
            if *invalid {
                continue;
            }
            let usq =
                (*ux as f64).powi(2) + (*uy as f64).powi(2) + (*uz as f64).powi(2);
            let gamma = (1.0 + usq).sqrt();
            acc += usq / (gamma + 1.0);
        }
        acc * (self.m_q * self.q).abs() as f64
    }
}

/// Inject `ppc[0] x ppc[1]` particles per admitted cell of the given cell
/// ranges. Positions are deterministic (uniformly spaced within the cell);
/// momenta sample the fluid velocity plus a thermal spread.
#[allow(clippy::too_many_arguments)]
pub fn inject_particles(
    target: &mut PartVec,
    range_x: [i32; 2],
    range_y: [i32; 2],
    ppc: [usize; 2],
    density: &Density,
    dx: [Float; 2],
    n_move: i32,
    ufl: [Float; 3],
    uth: [Float; 3],
    rng: &mut SmallRng,
) {
    for j in range_y[0]..range_y[1] {
        for i in range_x[0]..range_x[1] {
            let pos = (i + n_move) as Float * dx[0];
            if !density.admits(pos) {
                continue;
            }
            for k1 in 0..ppc[1] {
                for k0 in 0..ppc[0] {
                    let x = (k0 as Float + 0.5) / ppc[0] as Float;
                    let y = (k1 as Float + 0.5) / ppc[1] as Float;
                    let ux = ufl[0] + uth[0] * thermal(rng);
                    let uy = ufl[1] + uth[1] * thermal(rng);
                    let uz = ufl[2] + uth[2] * thermal(rng);
                    target.push(i, j, x, y, ux, uy, uz);
                }
            }
        }
    }
}

#[inline]
fn thermal(rng: &mut SmallRng) -> Float {
    rng.sample(rand_distr::StandardNormal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_injection_fills_every_cell() {
        let mut pv = PartVec::with_capacity(16 * 16 * 4);
        let mut rng = SmallRng::seed_from_u64(1);
        inject_particles(
            &mut pv,
            [0, 16],
            [0, 16],
            [2, 2],
            &Density::Uniform { n: 1.0 },
            [1.0, 1.0],
            0,
            [0.0; 3],
            [0.0; 3],
            &mut rng,
        );
        assert_eq!(pv.size, 16 * 16 * 4);
        for k in 0..pv.size {
            assert!(pv.x[k] > 0.0 && pv.x[k] < 1.0);
            assert!(pv.y[k] > 0.0 && pv.y[k] < 1.0);
            assert!(!pv.invalid[k]);
        }
    }

    #[test]
    fn slab_injection_respects_bounds() {
        let mut pv = PartVec::with_capacity(16 * 16);
        let mut rng = SmallRng::seed_from_u64(1);
        inject_particles(
            &mut pv,
            [0, 16],
            [0, 16],
            [1, 1],
            &Density::Slab {
                n: 1.0,
                start: 4.0,
                end: 8.0,
            },
            [1.0, 1.0],
            0,
            [0.0; 3],
            [0.0; 3],
            &mut rng,
        );
        assert_eq!(pv.size, 4 * 16);
        for k in 0..pv.size {
            assert!(pv.ix[k] >= 4 && pv.ix[k] < 8);
        }
    }

    #[test]
    fn overflow_is_fatal() {
        let mut pv = PartVec::with_capacity(1);
        pv.push(0, 0, 0.5, 0.5, 0.0, 0.0, 0.0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pv.push(1, 0, 0.5, 0.5, 0.0, 0.0, 0.0);
        }));
        assert!(result.is_err());
    }
}
