use crate::flds::grid::{VFld, VecGrid, GC};
use crate::Float;

const WEIGHTS: [Float; 3] = [0.25, 0.5, 0.25];

/// One binomial pass along x, in place with a carried previous value.
/// All rows are filtered, guard rows included, so the y pass sees guard
/// rows that match what the neighbouring region computed for the same
/// cells. The x guards of each row are refreshed afterwards.
pub fn smooth_x(j: &mut VecGrid, moving_window: bool) {
    let nx0 = j.nx[0] as i32;
    let ny = j.nx[1] as i32;
    for row in -(GC[1][0] as i32)..ny + GC[1][1] as i32 {
        let mut prev = j.get(-1, row);
        for i in 0..nx0 {
            let cur = j.get(i, row);
            let next = j.get(i + 1, row);
            let v = VFld {
                x: WEIGHTS[0] * prev.x + WEIGHTS[1] * cur.x + WEIGHTS[2] * next.x,
                y: WEIGHTS[0] * prev.y + WEIGHTS[1] * cur.y + WEIGHTS[2] * next.y,
                z: WEIGHTS[0] * prev.z + WEIGHTS[1] * cur.z + WEIGHTS[2] * next.z,
            };
            *j.get_mut(i, row) = v;
            prev = cur;
        }
        if !moving_window {
            for i in -(GC[0][0] as i32)..0 {
                let v = j.get(nx0 + i, row);
                *j.get_mut(i, row) = v;
            }
            for i in 0..GC[0][1] as i32 {
                let v = j.get(i, row);
                *j.get_mut(nx0 + i, row) = v;
            }
        }
    }
}

/// One binomial pass along y over the interior rows, carrying a copy of the
/// previous unfiltered row. The guard rows must be fresh before the call
/// and are refreshed by the caller afterwards.
pub fn smooth_y(j: &mut VecGrid) {
    let nx0 = j.nx[0] as i32;
    let ny = j.nx[1] as i32;
    let mut prev: Vec<VFld> = (0..nx0).map(|i| j.get(i, -1)).collect();
    let mut cur: Vec<VFld> = Vec::with_capacity(nx0 as usize);
    for row in 0..ny {
        cur.clear();
        cur.extend((0..nx0).map(|i| j.get(i, row)));
        for i in 0..nx0 {
            let next = j.get(i, row + 1);
            let c = cur[i as usize];
            let p = prev[i as usize];
            let v = VFld {
                x: WEIGHTS[0] * p.x + WEIGHTS[1] * c.x + WEIGHTS[2] * next.x,
                y: WEIGHTS[0] * p.y + WEIGHTS[1] * c.y + WEIGHTS[2] * next.y,
                z: WEIGHTS[0] * p.z + WEIGHTS[1] * c.z + WEIGHTS[2] * next.z,
            };
            *j.get_mut(i, row) = v;
        }
        std::mem::swap(&mut prev, &mut cur);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_pass_preserves_total() {
        let mut g = VecGrid::new([16, 16]);
        g.get_mut(7, 5).z = 8.0;
        smooth_x(&mut g, false);
        assert_eq!(g.get(6, 5).z, 2.0);
        assert_eq!(g.get(7, 5).z, 4.0);
        assert_eq!(g.get(8, 5).z, 2.0);
        let total: Float = (0..16).map(|i| g.get(i, 5).z).sum();
        assert!((total - 8.0).abs() < 1e-6);
    }

    #[test]
    fn y_pass_preserves_total() {
        let mut g = VecGrid::new([16, 16]);
        g.get_mut(7, 5).z = 8.0;
        smooth_y(&mut g);
        assert_eq!(g.get(7, 4).z, 2.0);
        assert_eq!(g.get(7, 5).z, 4.0);
        assert_eq!(g.get(7, 6).z, 2.0);
    }
}
