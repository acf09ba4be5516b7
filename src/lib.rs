pub mod exec;
pub mod flds;
pub mod prtls;
pub mod region;
pub mod save;

use anyhow::{bail, ensure, Context, Result};
use log::{info, warn};
use rayon::prelude::*;
use serde::Deserialize;
use std::fs;

use crate::exec::Scheduler;
use crate::flds::{current, laser};
use crate::prtls::{Density, TILE_SIZE};
use crate::region::Region;

// We use a type alias for f64/Float to easily support
// double and single precision.
#[cfg(feature = "dprec")]
pub type Float = f64;

#[cfg(not(feature = "dprec"))]
pub type Float = f32;

#[derive(Deserialize)]
pub struct Config {
    pub params: Params,
    #[serde(default)]
    pub species: Vec<SpeciesConfig>,
    #[serde(default)]
    pub laser: Option<LaserConfig>,
    pub output: Output,
}

#[derive(Deserialize)]
pub struct Params {
    pub nx: [usize; 2],
    #[serde(rename = "box")]
    pub box_size: [Float; 2],
    pub dt: Float,
    pub tmax: Float,
    #[serde(default = "one")]
    pub n_regions: usize,
    #[serde(default)]
    pub gpu_fraction: Float,
    #[serde(default)]
    pub n_gpu_regions: Option<usize>,
    /// binomial smoothing passes applied to the current each step
    #[serde(default)]
    pub n_pass: u32,
    #[serde(default)]
    pub moving_window: bool,
}

fn one() -> usize {
    1
}

#[derive(Deserialize)]
pub struct Output {
    #[serde(default = "default_ndump")]
    pub ndump: u32,
    #[serde(default)]
    pub write_output: bool,
}

fn default_ndump() -> u32 {
    100
}

#[derive(Deserialize, Clone)]
pub struct SpeciesConfig {
    pub name: String,
    /// mass over charge ratio
    pub m_q: Float,
    pub ppc: [usize; 2],
    #[serde(default)]
    pub ufl: [Float; 3],
    #[serde(default)]
    pub uth: [Float; 3],
    pub density: Density,
}

#[derive(Deserialize, Clone, Copy, Debug)]
#[serde(rename_all = "lowercase")]
pub enum LaserKind {
    Plane,
    Gaussian,
}

#[derive(Deserialize, Clone, Copy)]
pub struct LaserConfig {
    pub kind: LaserKind,
    pub start: Float,
    #[serde(default)]
    pub fwhm: Float,
    #[serde(default)]
    pub rise: Float,
    #[serde(default)]
    pub flat: Float,
    #[serde(default)]
    pub fall: Float,
    pub a0: Float,
    pub omega0: Float,
    #[serde(default)]
    pub polarization: Float,
    #[serde(default)]
    pub w0: Float,
    #[serde(default)]
    pub axis: Float,
}

impl Config {
    pub fn new() -> Result<Config> {
        let contents =
            fs::read_to_string("config.toml").context("Could not open the config.toml file")?;
        toml::from_str(&contents).context("Could not parse the config file")
    }
}

fn validate(cfg: &Config) -> Result<()> {
    let p = &cfg.params;
    ensure!(p.dt > 0.0, "time step must be > 0");
    ensure!(p.nx[0] > 0 && p.nx[1] > 0, "grid must not be empty");
    ensure!(
        p.box_size[0] > 0.0 && p.box_size[1] > 0.0,
        "simulation box must not be empty"
    );
    if p.nx[0] % TILE_SIZE != 0 {
        bail!("nx[0] = {} is not divisible by the tile size {}", p.nx[0], TILE_SIZE);
    }
    ensure!(p.n_regions >= 1, "need at least one region");
    if p.nx[1] % p.n_regions != 0 {
        bail!(
            "nx[1] = {} cannot be split into {} regions",
            p.nx[1],
            p.n_regions
        );
    }
    let ny_region = p.nx[1] / p.n_regions;
    if ny_region % TILE_SIZE != 0 {
        bail!(
            "region height {} is not divisible by the tile size {}",
            ny_region,
            TILE_SIZE
        );
    }
    ensure!(
        (0.0..=1.0).contains(&p.gpu_fraction),
        "gpu_fraction must lie in [0, 1]"
    );
    for s in cfg.species.iter() {
        ensure!(s.ppc[0] >= 1 && s.ppc[1] >= 1, "species {}: ppc must be >= 1", s.name);
        ensure!(s.m_q != 0.0, "species {}: m_q must be nonzero", s.name);
    }
    ensure!(cfg.output.ndump >= 1, "ndump must be >= 1");

    let dx = [
        p.box_size[0] / p.nx[0] as Float,
        p.box_size[1] / p.nx[1] as Float,
    ];
    let cfl = 1.0 / (1.0 / (dx[0] * dx[0]) + 1.0 / (dx[1] * dx[1])).sqrt();
    if p.dt >= cfl {
        warn!("dt = {} violates the CFL bound {:.4}", p.dt, cfl);
    }
    Ok(())
}

/// The full simulation state: the stack of region slabs plus the scheduler
/// that pins each region's kernels to an executor. A step runs the
/// region-local kernels in parallel and performs the cross-region
/// exchanges (field guard cells, current overlap rows, particle hand-off)
/// in exclusive phases between them.
pub struct Simulation {
    pub regions: Vec<Region>,
    pub scheduler: Scheduler,
    pub iter: u32,
    pub dt: Float,
    pub tmax: Float,
    pub ndump: u32,
    pub write_output: bool,
    pub n_pass: u32,
    pub nx: [usize; 2],
    pub box_size: [Float; 2],
}

impl Simulation {
    pub fn new(cfg: &Config) -> Result<Simulation> {
        validate(cfg)?;
        let laser_cfg = match &cfg.laser {
            Some(l) => Some(laser::normalize(l)?),
            None => None,
        };

        let n = cfg.params.n_regions;
        let mut regions: Vec<Region> = (0..n).map(|id| Region::new(id, n, cfg)).collect();

        if let Some(l) = &laser_cfg {
            for region in regions.iter_mut() {
                laser::add_laser(&mut region.emf, l, region.limits_y[0]);
            }
        }

        let mut sim = Simulation {
            regions,
            scheduler: Scheduler::new(n, cfg.params.gpu_fraction, cfg.params.n_gpu_regions),
            iter: 0,
            dt: cfg.params.dt,
            tmax: cfg.params.tmax,
            ndump: cfg.output.ndump,
            write_output: cfg.output.write_output,
            n_pass: cfg.params.n_pass,
            nx: cfg.params.nx,
            box_size: cfg.params.box_size,
        };
        sim.sync_fields();
        if laser_cfg.is_some() {
            for region in sim.regions.iter_mut() {
                laser::div_corr_x(&mut region.emf);
            }
            sim.sync_fields();
        }
        Ok(sim)
    }

    pub fn time(&self) -> Float {
        self.iter as Float * self.dt
    }

    /// Exchange the field guard cells of every region: y overlap first
    /// (interior columns), then the periodic x wrap, which also fills the
    /// corners from the freshly exchanged rows.
    pub fn sync_fields(&mut self) {
        let regions = &mut self.regions;
        let n = regions.len();
        if n == 1 {
            flds::exchange_gc_y_single(&mut regions[0].emf);
        } else {
            for r in 0..n {
                let below = (r + n - 1) % n;
                let (cur, bel) = two_mut(regions, r, below);
                flds::exchange_gc_y(&mut cur.emf, &mut bel.emf);
            }
        }
        regions.par_iter_mut().for_each(|rg| rg.emf.update_gc_x());
    }

    /// Advance the whole simulation by one time step.
    pub fn step(&mut self) {
        let scheduler = &self.scheduler;
        let regions = &mut self.regions;
        let n = regions.len();

        // region-local kernels: current reset, push + deposit, window
        // shift, boundary staging
        regions
            .par_iter_mut()
            .enumerate()
            .for_each(|(r, region)| region.advance_local(scheduler.engine(r)));

        // hand the staged leavers to the neighbouring regions
        for r in 0..n {
            if n == 1 {
                let region = &mut regions[0];
                for spec in region.species.iter_mut() {
                    let (incoming, outgoing) = (&mut spec.incoming, &mut spec.outgoing);
                    incoming[0].append_drain(&mut outgoing[0]);
                    incoming[1].append_drain(&mut outgoing[1]);
                }
            } else {
                let below = (r + n - 1) % n;
                let (cur, bel) = two_mut(regions, r, below);
                for (sc, sb) in cur.species.iter_mut().zip(bel.species.iter_mut()) {
                    sb.incoming[0].append_drain(&mut sc.outgoing[0]);
                }
                let above = (r + 1) % n;
                let (cur, abv) = two_mut(regions, r, above);
                for (sc, sa) in cur.species.iter_mut().zip(abv.species.iter_mut()) {
                    sa.incoming[1].append_drain(&mut sc.outgoing[1]);
                }
            }
        }

        // fold the current guard deposits: overlap rows between regions
        // first, then the periodic x wrap within each region
        if n == 1 {
            current::reduction_y_single(&mut regions[0].current);
        } else {
            for r in 0..n {
                let below = (r + n - 1) % n;
                let (cur, bel) = two_mut(regions, r, below);
                current::reduction_y(&mut cur.current, &mut bel.current);
            }
        }
        regions.par_iter_mut().for_each(|rg| rg.current.reduction_x());

        for _ in 0..self.n_pass {
            regions.par_iter_mut().for_each(|rg| {
                let mw = rg.current.moving_window;
                flds::binomial_filter::smooth_x(&mut rg.current.j, mw);
            });
            current_copy_gc_y(regions);
            regions
                .par_iter_mut()
                .for_each(|rg| flds::binomial_filter::smooth_y(&mut rg.current.j));
            regions.par_iter_mut().for_each(|rg| rg.current.update_gc_x());
            current_copy_gc_y(regions);
        }

        // field solve, then guard exchange for the next step
        regions.par_iter_mut().for_each(|rg| {
            let Region { emf, current, .. } = rg;
            emf.advance(current);
        });
        if n == 1 {
            flds::exchange_gc_y_single(&mut regions[0].emf);
        } else {
            for r in 0..n {
                let below = (r + n - 1) % n;
                let (cur, bel) = two_mut(regions, r, below);
                flds::exchange_gc_y(&mut cur.emf, &mut bel.emf);
            }
        }
        regions.par_iter_mut().for_each(|rg| rg.emf.update_gc_x());

        // re-bucket the particles and absorb the incoming vectors
        regions.par_iter_mut().for_each(|rg| rg.sort_species());

        self.iter += 1;
    }

    pub fn field_energy(&self) -> f64 {
        self.regions.iter().map(|r| r.emf.energy()).sum()
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.regions.iter().map(|r| r.kinetic_energy()).sum()
    }

    pub fn n_alive(&self) -> usize {
        self.regions.iter().map(|r| r.n_alive()).sum()
    }
}

fn current_copy_gc_y(regions: &mut [Region]) {
    let n = regions.len();
    if n == 1 {
        current::copy_gc_y_single(&mut regions[0].current);
        return;
    }
    for r in 0..n {
        let below = (r + n - 1) % n;
        let (cur, bel) = two_mut(regions, r, below);
        current::copy_gc_y(&mut cur.current, &mut bel.current);
    }
}

fn two_mut<T>(v: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert!(a != b);
    if a < b {
        let (lo, hi) = v.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = v.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

pub fn run(cfg: Config) -> Result<()> {
    let mut sim = Simulation::new(&cfg)?;
    let n_accel = sim
        .scheduler
        .devices
        .iter()
        .filter(|d| **d == exec::Device::Accel)
        .count();
    info!(
        "starting run: {} regions ({} on the accelerator), {} species, {} particles",
        sim.regions.len(),
        n_accel,
        cfg.species.len(),
        sim.n_alive()
    );

    loop {
        if sim.iter % sim.ndump == 0 {
            if sim.write_output {
                save::save_output(&sim).context("writing diagnostics failed")?;
            }
            info!(
                "n = {:6}, t = {:9.3}, field energy = {:.6e}, kinetic energy = {:.6e}",
                sim.iter,
                sim.time(),
                sim.field_energy(),
                sim.kinetic_energy()
            );
        }
        if sim.time() >= sim.tmax {
            break;
        }
        sim.step();
    }
    info!("run finished after {} iterations", sim.iter);
    Ok(())
}
