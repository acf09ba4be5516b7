use crate::exec::AdvanceEngine;
use crate::flds::current::Current;
use crate::flds::Emf;
use crate::prtls::{boundary, sort, Species};
use crate::Config;

/// One horizontal slab of the simulation domain: its own field state,
/// current accumulator and species set over the rows `[y_lo, y_hi)`.
/// Neighbouring regions are reached by cyclic index at the simulation
/// level; the region itself holds no cross references.
pub struct Region {
    pub id: usize,
    pub limits_y: [i32; 2],
    pub emf: Emf,
    pub current: Current,
    pub species: Vec<Species>,
}

impl Region {
    pub fn new(id: usize, n_regions: usize, cfg: &Config) -> Region {
        let nx = cfg.params.nx;
        let ny_region = nx[1] / n_regions;
        let limits_y = [(id * ny_region) as i32, ((id + 1) * ny_region) as i32];
        let dx = [
            cfg.params.box_size[0] / nx[0] as crate::Float,
            cfg.params.box_size[1] / nx[1] as crate::Float,
        ];
        let nx_region = [nx[0], ny_region];
        let moving_window = cfg.params.moving_window;

        let species = cfg
            .species
            .iter()
            .enumerate()
            .map(|(s, sc)| {
                Species::new(
                    sc,
                    nx,
                    dx,
                    cfg.params.dt,
                    limits_y,
                    moving_window,
                    (id * 8191 + s) as u64 + 1,
                )
            })
            .collect();

        Region {
            id,
            limits_y,
            emf: Emf::new(nx_region, dx, cfg.params.dt, moving_window),
            current: Current::new(nx_region, dx, cfg.params.dt, moving_window),
            species,
        }
    }

    /// Region-local part of a step: clear the current, advance every
    /// species on the assigned executor, then shift the window and stage
    /// the boundary leavers.
    pub fn advance_local(&mut self, engine: &dyn AdvanceEngine) {
        self.current.reset();
        let Region {
            emf,
            current,
            species,
            ..
        } = self;
        for spec in species.iter_mut() {
            engine.advance(spec, emf, current);
            boundary::move_window(spec);
            boundary::check_boundaries(spec);
        }
    }

    pub fn sort_species(&mut self) {
        for spec in self.species.iter_mut() {
            sort::sort(spec);
        }
    }

    pub fn n_alive(&self) -> usize {
        self.species.iter().map(|s| s.n_alive()).sum()
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.species.iter().map(|s| s.kinetic_energy()).sum()
    }
}
