use crate::flds::grid::{ScalarGrid, VFld};
use crate::Float;
use crate::Simulation;
use anyhow::{Context, Result};
use log::debug;

/// Reassemble one field component over the whole domain, interior cells
/// only, regions stacked bottom to top.
fn reconstruct<F>(sim: &Simulation, comp: F) -> Vec<Float>
where
    F: Fn(&crate::region::Region, i32, i32) -> Float,
{
    let nx0 = sim.nx[0];
    let mut out = Vec::with_capacity(nx0 * sim.nx[1]);
    for region in sim.regions.iter() {
        let ny = region.emf.nx[1] as i32;
        for j in 0..ny {
            for i in 0..nx0 as i32 {
                out.push(comp(region, i, j));
            }
        }
    }
    out
}

fn save_grid(data: Vec<Float>, dir: &str, name: &str) -> Result<()> {
    npy::to_file(format!("{}/{}.npy", dir, name), data)
        .with_context(|| format!("Could not save {} data to file", name))
}

/// Write the grid diagnostics for the current iteration: the E and B
/// components, the out-of-plane current and one charge-density grid per
/// species.
pub fn save_output(sim: &Simulation) -> Result<()> {
    let outdir = format!("output/dat_{:05}", sim.iter / sim.ndump);
    std::fs::create_dir_all(format!("{}/flds", outdir))
        .context("Unable to create output directory")?;
    debug!("writing grid diagnostics to {}", outdir);

    let flds_dir = format!("{}/flds", outdir);
    let e = |f: fn(VFld) -> Float| {
        move |r: &crate::region::Region, i: i32, j: i32| f(r.emf.e.get(i, j))
    };
    let b = |f: fn(VFld) -> Float| {
        move |r: &crate::region::Region, i: i32, j: i32| f(r.emf.b.get(i, j))
    };

    save_grid(reconstruct(sim, e(|v| v.x)), &flds_dir, "E1")?;
    save_grid(reconstruct(sim, e(|v| v.y)), &flds_dir, "E2")?;
    save_grid(reconstruct(sim, e(|v| v.z)), &flds_dir, "E3")?;
    save_grid(reconstruct(sim, b(|v| v.x)), &flds_dir, "B1")?;
    save_grid(reconstruct(sim, b(|v| v.y)), &flds_dir, "B2")?;
    save_grid(reconstruct(sim, b(|v| v.z)), &flds_dir, "B3")?;
    save_grid(
        reconstruct(sim, |r, i, j| r.current.j.get(i, j).z),
        &flds_dir,
        "J3",
    )?;

    let names: Vec<String> = sim.regions[0]
        .species
        .iter()
        .map(|sp| sp.name.clone())
        .collect();
    for (s, name) in names.iter().enumerate() {
        let mut rho = ScalarGrid::new(sim.nx);
        for region in sim.regions.iter() {
            region.species[s].deposit_charge(&mut rho);
        }
        rho.fold_periodic();
        let mut out = Vec::with_capacity(sim.nx[0] * sim.nx[1]);
        for j in 0..sim.nx[1] as i32 {
            for i in 0..sim.nx[0] as i32 {
                out.push(rho.get(i, j));
            }
        }
        save_grid(out, &flds_dir, &format!("charge_{}", name))?;
    }

    Ok(())
}
