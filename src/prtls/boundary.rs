use super::{inject_particles, Species};
use crate::Float;

/// Enforce the x boundary and stage particles leaving the region slab in y.
///
/// Only the perimeter tiles are scanned: a particle can leave its tile by
/// at most one cell per step, so leavers are confined to the first/last
/// tile column and row. Leavers in y are appended to the staged outgoing
/// buffers (handed to the neighbouring regions by the simulation) and
/// their slot is marked invalid for the sorter to reclaim.
pub fn check_boundaries(spec: &mut Species) {
    let nx0 = spec.nx[0] as i32;
    let ny_total = spec.nx[1] as i32;
    let y_lo = spec.limits_y[0];
    let y_hi = spec.limits_y[1];
    let n_tiles_x = spec.n_tiles_x;
    let n_tiles_y = spec.n_tiles_y;
    let moving_window = spec.moving_window;

    let Species {
        main,
        outgoing,
        tile_offset,
        ..
    } = spec;
    let [out_down, out_up] = outgoing;

    // left and right tile columns: periodic wrap, or invalidation once a
    // particle has left the moving window
    for tile_y in 0..n_tiles_y {
        let left = tile_y * n_tiles_x;
        let right = (tile_y + 1) * n_tiles_x - 1;
        for &(tile, leftmost) in &[(left, true), (right, false)] {
            let begin = tile_offset[tile] as usize;
            let end = tile_offset[tile + 1] as usize;
            for k in begin..end {
                if leftmost {
                    if main.ix[k] < 0 {
                        if moving_window {
                            main.invalid[k] = true;
                        } else {
                            main.ix[k] += nx0;
                        }
                    }
                } else if main.ix[k] >= nx0 {
                    if moving_window {
                        main.invalid[k] = true;
                    } else {
                        main.ix[k] -= nx0;
                    }
                }
            }
        }
    }

    // bottom tile row: transfer to the region below
    for tile in 0..n_tiles_x {
        let begin = tile_offset[tile] as usize;
        let end = tile_offset[tile + 1] as usize;
        for k in begin..end {
            if main.invalid[k] {
                continue;
            }
            let mut iy = main.iy[k];
            if iy < y_lo {
                if iy < 0 {
                    iy += ny_total;
                }
                out_down.push(
                    main.ix[k], iy, main.x[k], main.y[k], main.ux[k], main.uy[k], main.uz[k],
                );
                main.invalid[k] = true;
            }
        }
    }

    // top tile row: transfer to the region above
    for tile_x in 0..n_tiles_x {
        let tile = tile_x + (n_tiles_y - 1) * n_tiles_x;
        let begin = tile_offset[tile] as usize;
        let end = tile_offset[tile + 1] as usize;
        for k in begin..end {
            if main.invalid[k] {
                continue;
            }
            let mut iy = main.iy[k];
            if iy >= y_hi {
                if iy >= ny_total {
                    iy -= ny_total;
                }
                out_up.push(
                    main.ix[k], iy, main.x[k], main.y[k], main.ux[k], main.uy[k], main.uz[k],
                );
                main.invalid[k] = true;
            }
        }
    }
}

/// Moving-window shift: once the window has advanced one cell, every
/// particle moves one cell left and fresh particles are injected at the
/// right edge into the injection buffer. Injection is always re-sampled so
/// that nonzero fluid momentum is carried correctly.
pub fn move_window(spec: &mut Species) {
    if !spec.moving_window {
        return;
    }
    if spec.iter as Float * spec.dt <= spec.dx[0] * (spec.n_move + 1) as Float {
        return;
    }

    for k in 0..spec.main.size {
        if !spec.main.invalid[k] {
            spec.main.ix[k] -= 1;
        }
    }
    spec.n_move += 1;

    let nx0 = spec.nx[0] as i32;
    let range_x = [nx0 - 1, nx0];
    let range_y = spec.limits_y;
    let Species {
        incoming,
        ppc,
        density,
        dx,
        n_move,
        ufl,
        uth,
        rng,
        ..
    } = spec;
    incoming[2].clear();
    inject_particles(
        &mut incoming[2],
        range_x,
        range_y,
        *ppc,
        density,
        *dx,
        *n_move,
        *ufl,
        *uth,
        rng,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prtls::{sort, Density};
    use crate::SpeciesConfig;

    fn empty_species(moving_window: bool) -> Species {
        let cfg = SpeciesConfig {
            name: "test".into(),
            m_q: -1.0,
            ppc: [1, 1],
            ufl: [0.0; 3],
            uth: [0.0; 3],
            density: Density::Slab {
                n: 1.0,
                start: 1.0e9,
                end: 1.0e9,
            },
        };
        Species::new(&cfg, [16, 16], [1.0, 1.0], 0.1, [0, 16], moving_window, 7)
    }

    fn seed(spec: &mut Species, ix: i32, iy: i32) {
        spec.main.push(ix, iy, 0.5, 0.5, 0.0, 0.0, 0.0);
        sort::full_sort(spec);
    }

    #[test]
    fn x_wraps_periodically() {
        let mut spec = empty_species(false);
        seed(&mut spec, -1, 4);
        check_boundaries(&mut spec);
        assert_eq!(spec.main.ix[0], 15);
        assert!(!spec.main.invalid[0]);
    }

    #[test]
    fn window_exit_invalidates() {
        let mut spec = empty_species(true);
        seed(&mut spec, -1, 4);
        check_boundaries(&mut spec);
        assert!(spec.main.invalid[0]);
    }

    #[test]
    fn y_leaver_is_staged_with_wrap() {
        let mut spec = empty_species(false);
        seed(&mut spec, 3, -1);
        check_boundaries(&mut spec);
        assert!(spec.main.invalid[0]);
        assert_eq!(spec.outgoing[0].size, 1);
        assert_eq!(spec.outgoing[0].iy[0], 15);
    }

    #[test]
    fn window_injects_rightmost_column() {
        let mut spec = empty_species(true);
        // pretend enough time has passed for one shift
        spec.iter = 20;
        seed(&mut spec, 8, 8);
        move_window(&mut spec);
        assert_eq!(spec.n_move, 1);
        assert_eq!(spec.main.ix[0], 7);
        assert_eq!(spec.incoming[2].size, 0); // slab density far away: nothing injected
        let mut uniform = empty_species(true);
        uniform.density = Density::Uniform { n: 1.0 };
        uniform.iter = 20;
        move_window(&mut uniform);
        assert_eq!(uniform.incoming[2].size, 16);
        for k in 0..uniform.incoming[2].size {
            assert_eq!(uniform.incoming[2].ix[k], 15);
        }
    }
}
