#![allow(dead_code)]

use tiled_pic::prtls::Density;
use tiled_pic::{Config, Float, Output, Params, SpeciesConfig};

/// A small simulation setup shared by the integration tests: unit cell
/// size, no output, everything on the CPU executor unless a test says
/// otherwise.
pub fn base_config(nx: [usize; 2], n_regions: usize, dt: Float) -> Config {
    Config {
        params: Params {
            nx,
            box_size: [nx[0] as Float, nx[1] as Float],
            dt,
            tmax: 1.0,
            n_regions,
            gpu_fraction: 0.0,
            n_gpu_regions: None,
            n_pass: 0,
            moving_window: false,
        },
        species: vec![],
        laser: None,
        output: Output {
            ndump: 100,
            write_output: false,
        },
    }
}

pub fn species(
    name: &str,
    m_q: Float,
    ppc: [usize; 2],
    ufl: [Float; 3],
    uth: [Float; 3],
) -> SpeciesConfig {
    SpeciesConfig {
        name: name.into(),
        m_q,
        ppc,
        ufl,
        uth,
        density: Density::Uniform { n: 1.0 },
    }
}

/// A species whose density profile admits no cell, so the simulation
/// starts without particles and tests can place them by hand.
pub fn empty_species(name: &str) -> SpeciesConfig {
    SpeciesConfig {
        name: name.into(),
        m_q: -1.0,
        ppc: [1, 1],
        ufl: [0.0; 3],
        uth: [0.0; 3],
        density: Density::Slab {
            n: 1.0,
            start: 1.0e9,
            end: 1.0e9,
        },
    }
}
