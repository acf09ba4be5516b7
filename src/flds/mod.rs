pub mod binomial_filter;
pub mod current;
pub mod grid;
pub mod laser;

use crate::flds::current::Current;
use crate::flds::grid::{VecGrid, GC};
use crate::Float;

/// The electromagnetic field state of one region: E and B on the Yee
/// staggered grid, advanced with the finite-difference time-domain scheme.
/// The B half-step / E full-step / B half-step pattern leaves E and B
/// co-centered in time for the particle pusher.
pub struct Emf {
    pub e: VecGrid,
    pub b: VecGrid,
    pub nx: [usize; 2],
    pub dx: [Float; 2],
    pub dt: Float,
    pub iter: u32,
    pub moving_window: bool,
    pub n_move: i32,
}

impl Emf {
    pub fn new(nx: [usize; 2], dx: [Float; 2], dt: Float, moving_window: bool) -> Emf {
        Emf {
            e: VecGrid::new(nx),
            b: VecGrid::new(nx),
            nx,
            dx,
            dt,
            iter: 0,
            moving_window,
            n_move: 0,
        }
    }

    fn yee_b(&mut self, dt_dx: Float, dt_dy: Float) {
        let nx0 = self.nx[0] as i32;
        let ny = self.nx[1] as i32;
        let e = &self.e;
        let b = &mut self.b;
        for j in -1..=ny {
            for i in -1..=nx0 {
                let e00 = e.get(i, j);
                let e10 = e.get(i + 1, j);
                let e01 = e.get(i, j + 1);
                let idx = b.idx(i, j);
                let bv = &mut b.data[idx];
                bv.x += -dt_dy * (e01.z - e00.z);
                bv.y += dt_dx * (e10.z - e00.z);
                bv.z += -dt_dx * (e10.y - e00.y) + dt_dy * (e01.x - e00.x);
            }
        }
    }

    fn yee_e(&mut self, j_grid: &VecGrid, dt_dx: Float, dt_dy: Float, dt: Float) {
        let nx0 = self.nx[0] as i32;
        let ny = self.nx[1] as i32;
        let b = &self.b;
        let e = &mut self.e;
        for j in 0..=ny + 1 {
            for i in 0..=nx0 {
                let b00 = b.get(i, j);
                let bm0 = b.get(i - 1, j);
                let b0m = b.get(i, j - 1);
                let jc = j_grid.get(i, j);
                let idx = e.idx(i, j);
                let ev = &mut e.data[idx];
                ev.x += dt_dy * (b00.z - b0m.z) - dt * jc.x;
                ev.y += -dt_dx * (b00.z - bm0.z) - dt * jc.y;
                ev.z += dt_dx * (b00.y - bm0.y) - dt_dy * (b00.x - b0m.x) - dt * jc.z;
            }
        }
    }

    /// Advance E and B by one time step from the deposited current.
    /// In moving-window mode the grid shifts one cell left once the window
    /// has travelled a full cell.
    pub fn advance(&mut self, current: &Current) {
        let dt = self.dt;
        let dt_dx = dt / self.dx[0];
        let dt_dy = dt / self.dx[1];

        self.iter += 1;
        let shift = self.moving_window
            && (self.iter as Float * dt > self.dx[0] * (self.n_move + 1) as Float);

        self.yee_b(0.5 * dt_dx, 0.5 * dt_dy);
        self.yee_e(&current.j, dt_dx, dt_dy, dt);
        self.yee_b(0.5 * dt_dx, 0.5 * dt_dy);

        if shift {
            self.n_move += 1;
            self.move_window_shift();
        }
    }

    /// Shift every field row left by one cell and zero the rightmost cells.
    pub fn move_window_shift(&mut self) {
        let nrow = self.e.nrow;
        let keep = GC[0][0] + self.nx[0] - 1;
        let nrows_total = GC[1][0] + self.nx[1] + GC[1][1];
        for fld in &mut [&mut self.e, &mut self.b] {
            for row in 0..nrows_total {
                let rs = row * nrow;
                fld.data.copy_within(rs + 1..rs + 1 + keep, rs);
                for v in fld.data[rs + keep..rs + nrow].iter_mut() {
                    *v = grid::VFld::ZERO;
                }
            }
        }
    }

    /// Periodic wrap of the x guard cells. Left untouched in moving-window
    /// mode, where the window shift fills them.
    pub fn update_gc_x(&mut self) {
        if self.moving_window {
            return;
        }
        let nx0 = self.nx[0] as i32;
        let ny = self.nx[1] as i32;
        for fld in &mut [&mut self.e, &mut self.b] {
            for j in -(GC[1][0] as i32)..ny + GC[1][1] as i32 {
                for i in -(GC[0][0] as i32)..0 {
                    let v = fld.get(nx0 + i, j);
                    *fld.get_mut(i, j) = v;
                }
                for i in 0..GC[0][1] as i32 {
                    let v = fld.get(i, j);
                    *fld.get_mut(nx0 + i, j) = v;
                }
            }
        }
    }

    /// Total field energy over the interior cells.
    pub fn energy(&self) -> f64 {
        let mut result = 0.0f64;
        for j in 0..self.nx[1] as i32 {
            for i in 0..self.nx[0] as i32 {
                let e = self.e.get(i, j);
                let b = self.b.get(i, j);
                result += (e.x as f64).powi(2) + (e.y as f64).powi(2) + (e.z as f64).powi(2);
                result += (b.x as f64).powi(2) + (b.y as f64).powi(2) + (b.z as f64).powi(2);
            }
        }
        result * 0.5 * self.dx[0] as f64 * self.dx[1] as f64
    }
}

/// Half-duplex y guard exchange between a region and the one below it.
/// The upper region reads the lower region's last interior rows into its
/// lower guard, and writes its own first interior rows into the lower
/// region's upper guard. Only interior columns are exchanged; the x wrap
/// pass afterwards fills the corners.
pub fn exchange_gc_y(upper: &mut Emf, below: &mut Emf) {
    let nx0 = upper.nx[0] as i32;
    let ny = below.nx[1] as i32;
    for i in 0..nx0 {
        for j in -(GC[1][0] as i32)..0 {
            *upper.e.get_mut(i, j) = below.e.get(i, ny + j);
            *upper.b.get_mut(i, j) = below.b.get(i, ny + j);
        }
        for j in 0..GC[1][1] as i32 {
            *below.e.get_mut(i, ny + j) = upper.e.get(i, j);
            *below.b.get_mut(i, ny + j) = upper.b.get(i, j);
        }
    }
}

/// Single-region variant: the slab is its own neighbour, so the exchange
/// reduces to a periodic wrap in y.
pub fn exchange_gc_y_single(emf: &mut Emf) {
    let nx0 = emf.nx[0] as i32;
    let ny = emf.nx[1] as i32;
    for fld in &mut [&mut emf.e, &mut emf.b] {
        for i in 0..nx0 {
            for j in -(GC[1][0] as i32)..0 {
                let v = fld.get(i, ny + j);
                *fld.get_mut(i, j) = v;
            }
            for j in 0..GC[1][1] as i32 {
                let v = fld.get(i, j);
                *fld.get_mut(i, ny + j) = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flds::grid::VFld;
    use crate::Float;

    fn marked_emf() -> Emf {
        let mut emf = Emf::new([16, 16], [1.0, 1.0], 0.05, false);
        for j in 0..16 {
            for i in 0..16 {
                emf.e.get_mut(i, j).z = (i + 16 * j) as Float;
                emf.b.get_mut(i, j).x = (1 + i + 16 * j) as Float;
            }
        }
        emf
    }

    #[test]
    fn gc_x_periodic() {
        let mut emf = marked_emf();
        emf.update_gc_x();
        for j in 0..16 {
            assert_eq!(emf.e.get(-1, j), emf.e.get(15, j));
            assert_eq!(emf.e.get(16, j), emf.e.get(0, j));
            assert_eq!(emf.e.get(17, j), emf.e.get(1, j));
            assert_eq!(emf.b.get(-1, j), emf.b.get(15, j));
        }
    }

    #[test]
    fn gc_y_single_region_periodic() {
        let mut emf = marked_emf();
        exchange_gc_y_single(&mut emf);
        for i in 0..16 {
            assert_eq!(emf.e.get(i, -1), emf.e.get(i, 15));
            assert_eq!(emf.e.get(i, 16), emf.e.get(i, 0));
            assert_eq!(emf.e.get(i, 17), emf.e.get(i, 1));
        }
    }

    #[test]
    fn window_shift_moves_rows_left() {
        let mut emf = Emf::new([16, 16], [1.0, 1.0], 0.05, true);
        emf.e.get_mut(5, 3).z = 7.0;
        emf.e.get_mut(15, 3).z = 9.0;
        emf.move_window_shift();
        assert_eq!(emf.e.get(4, 3).z, 7.0);
        assert_eq!(emf.e.get(5, 3).z, 0.0);
        // rightmost interior cell is zeroed
        assert_eq!(emf.e.get(15, 3), VFld::ZERO);
    }

    #[test]
    fn vacuum_stays_zero() {
        let mut emf = Emf::new([16, 16], [1.0, 1.0], 0.05, false);
        let current = Current::new([16, 16], [1.0, 1.0], 0.05, false);
        for _ in 0..10 {
            emf.advance(&current);
        }
        assert_eq!(emf.energy(), 0.0);
    }
}
