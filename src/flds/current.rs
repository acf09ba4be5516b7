use crate::flds::grid::{VecGrid, GC};
use crate::Float;

/// The current density deposited by the particles of one region. Reset to
/// zero at the start of every step, filled additively by the deposition
/// kernels (guard cells included), then folded back onto the interior
/// before the field solve reads it.
pub struct Current {
    pub j: VecGrid,
    pub nx: [usize; 2],
    pub dx: [Float; 2],
    pub dt: Float,
    pub moving_window: bool,
}

impl Current {
    pub fn new(nx: [usize; 2], dx: [Float; 2], dt: Float, moving_window: bool) -> Current {
        Current {
            j: VecGrid::new(nx),
            nx,
            dx,
            dt,
            moving_window,
        }
    }

    pub fn reset(&mut self) {
        self.j.zero();
    }

    /// Fold the x guard-cell deposits into the periodically wrapped interior
    /// columns and refresh the guards with the folded values. All rows are
    /// processed so that the y overlap rows stay consistent between
    /// neighbouring regions.
    pub fn reduction_x(&mut self) {
        if self.moving_window {
            return;
        }
        let nx0 = self.nx[0] as i32;
        let ny = self.nx[1] as i32;
        for j in -(GC[1][0] as i32)..ny + GC[1][1] as i32 {
            for i in -(GC[0][0] as i32)..0 {
                let v = self.j.get(i, j);
                *self.j.get_mut(nx0 + i, j) += v;
            }
            for i in 0..GC[0][1] as i32 {
                let v = self.j.get(nx0 + i, j);
                *self.j.get_mut(i, j) += v;
            }
            self.update_gc_x_row(j);
        }
    }

    #[inline]
    fn update_gc_x_row(&mut self, j: i32) {
        let nx0 = self.nx[0] as i32;
        for i in -(GC[0][0] as i32)..0 {
            let v = self.j.get(nx0 + i, j);
            *self.j.get_mut(i, j) = v;
        }
        for i in 0..GC[0][1] as i32 {
            let v = self.j.get(i, j);
            *self.j.get_mut(nx0 + i, j) = v;
        }
    }

    /// Refresh the x guards from the interior (no folding). Used after the
    /// smoothing passes.
    pub fn update_gc_x(&mut self) {
        if self.moving_window {
            return;
        }
        let ny = self.nx[1] as i32;
        for j in -(GC[1][0] as i32)..ny + GC[1][1] as i32 {
            self.update_gc_x_row(j);
        }
    }
}

/// Sum the overlap rows of a region and the region below it and store the
/// total on both sides. The overlap spans the full row, x guards included,
/// so corner deposits survive the fold.
pub fn reduction_y(upper: &mut Current, below: &mut Current) {
    let nx0 = upper.nx[0] as i32;
    let ny = below.nx[1] as i32;
    for i in -(GC[0][0] as i32)..nx0 + GC[0][1] as i32 {
        for k in 0..(GC[1][0] + GC[1][1]) as i32 {
            let j_up = k - GC[1][0] as i32;
            let j_bel = ny - GC[1][0] as i32 + k;
            let v = upper.j.get(i, j_up) + below.j.get(i, j_bel);
            *upper.j.get_mut(i, j_up) = v;
            *below.j.get_mut(i, j_bel) = v;
        }
    }
}

/// Single-region variant of [`reduction_y`]: periodic fold within one slab.
pub fn reduction_y_single(c: &mut Current) {
    let nx0 = c.nx[0] as i32;
    let ny = c.nx[1] as i32;
    for i in -(GC[0][0] as i32)..nx0 + GC[0][1] as i32 {
        for k in 0..(GC[1][0] + GC[1][1]) as i32 {
            let j_lo = k - GC[1][0] as i32;
            let j_hi = ny - GC[1][0] as i32 + k;
            let v = c.j.get(i, j_lo) + c.j.get(i, j_hi);
            *c.j.get_mut(i, j_lo) = v;
            *c.j.get_mut(i, j_hi) = v;
        }
    }
}

/// Refresh the y guard rows from the neighbouring interiors (no folding).
pub fn copy_gc_y(upper: &mut Current, below: &mut Current) {
    let nx0 = upper.nx[0] as i32;
    let ny = below.nx[1] as i32;
    for i in -(GC[0][0] as i32)..nx0 + GC[0][1] as i32 {
        for j in -(GC[1][0] as i32)..0 {
            *upper.j.get_mut(i, j) = below.j.get(i, ny + j);
        }
        for j in 0..GC[1][1] as i32 {
            *below.j.get_mut(i, ny + j) = upper.j.get(i, j);
        }
    }
}

pub fn copy_gc_y_single(c: &mut Current) {
    let nx0 = c.nx[0] as i32;
    let ny = c.nx[1] as i32;
    for i in -(GC[0][0] as i32)..nx0 + GC[0][1] as i32 {
        for j in -(GC[1][0] as i32)..0 {
            let v = c.j.get(i, ny + j);
            *c.j.get_mut(i, j) = v;
        }
        for j in 0..GC[1][1] as i32 {
            let v = c.j.get(i, j);
            *c.j.get_mut(i, ny + j) = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_fold_wraps_guard_deposits() {
        let mut c = Current::new([16, 16], [1.0, 1.0], 0.1, false);
        c.j.get_mut(-1, 4).x = 1.0;
        c.j.get_mut(16, 4).x = 2.0;
        c.j.get_mut(17, 4).x = 4.0;
        c.j.get_mut(15, 4).x = 0.5;
        c.reduction_x();
        assert_eq!(c.j.get(15, 4).x, 1.5);
        assert_eq!(c.j.get(0, 4).x, 2.0);
        assert_eq!(c.j.get(1, 4).x, 4.0);
        // guards refreshed with the folded totals
        assert_eq!(c.j.get(-1, 4).x, 1.5);
        assert_eq!(c.j.get(16, 4).x, 2.0);
    }

    #[test]
    fn y_fold_is_symmetric_across_the_seam() {
        let mut up = Current::new([16, 16], [1.0, 1.0], 0.1, false);
        let mut lo = Current::new([16, 16], [1.0, 1.0], 0.1, false);
        up.j.get_mut(3, -1).z = 1.0;
        lo.j.get_mut(3, 15).z = 2.0;
        up.j.get_mut(3, 0).z = 4.0;
        lo.j.get_mut(3, 16).z = 8.0;
        reduction_y(&mut up, &mut lo);
        assert_eq!(up.j.get(3, -1).z, 3.0);
        assert_eq!(lo.j.get(3, 15).z, 3.0);
        assert_eq!(up.j.get(3, 0).z, 12.0);
        assert_eq!(lo.j.get(3, 16).z, 12.0);
    }
}
