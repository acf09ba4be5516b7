use crate::flds::Emf;
use crate::{Float, LaserConfig, LaserKind};
use anyhow::{bail, Result};

const PI: Float = std::f64::consts::PI as Float;

/// Validate the pulse parameters and resolve the FWHM shorthand into
/// rise/flat/fall times.
pub fn normalize(laser: &LaserConfig) -> Result<LaserConfig> {
    let mut l = *laser;
    if l.fwhm != 0.0 {
        if l.fwhm <= 0.0 {
            bail!("invalid laser FWHM, must be > 0");
        }
        l.rise = l.fwhm;
        l.fall = l.fwhm;
        l.flat = 0.0;
    }
    if l.rise <= 0.0 {
        bail!("invalid laser RISE, must be > 0");
    }
    if l.flat < 0.0 {
        bail!("invalid laser FLAT, must be >= 0");
    }
    if l.fall <= 0.0 {
        bail!("invalid laser FALL, must be > 0");
    }
    Ok(l)
}

fn gauss_phase(laser: &LaserConfig, z: Float, r: Float) -> Float {
    let z0 = laser.omega0 * laser.w0 * laser.w0 / 2.0;
    let rho2 = r * r;
    let curv = rho2 * z / (z0 * z0 + z * z);
    let r_wl2 = (z0 * z0) / (z0 * z0 + z * z);
    let gouy_shift = z.atan2(z0);

    r_wl2.sqrt().sqrt()
        * (-rho2 * r_wl2 / (laser.w0 * laser.w0)).exp()
        * (laser.omega0 * (z + curv) - gouy_shift).cos()
}

fn lon_env(laser: &LaserConfig, z: Float) -> Float {
    if z > laser.start {
        // ahead of the pulse
        0.0
    } else if z > laser.start - laser.rise {
        let csi = z - laser.start;
        let e = (0.5 * PI * csi / laser.rise).sin();
        e * e
    } else if z > laser.start - (laser.rise + laser.flat) {
        1.0
    } else if z > laser.start - (laser.rise + laser.flat + laser.fall) {
        let csi = z - (laser.start - laser.rise - laser.flat - laser.fall);
        let e = (0.5 * PI * csi / laser.fall).sin();
        e * e
    } else {
        0.0
    }
}

/// Add a laser pulse to the region's fields. `offset_y` is the global row
/// of the region's first interior row, needed to position the optical axis
/// of a Gaussian beam.
pub fn add_laser(emf: &mut Emf, laser: &LaserConfig, offset_y: i32) {
    let dx = emf.dx[0];
    let dy = emf.dx[1];
    let amp = laser.omega0 * laser.a0;
    let cos_pol = laser.polarization.cos();
    let sin_pol = laser.polarization.sin();
    let r_center = laser.axis;

    match laser.kind {
        LaserKind::Plane => {
            let k = laser.omega0;
            for i in 0..emf.nx[0] as i32 {
                let z = i as Float * dx;
                let z_2 = z + dx / 2.0;
                let lenv = amp * lon_env(laser, z);
                let lenv_2 = amp * lon_env(laser, z_2);
                for j in 0..emf.nx[1] as i32 {
                    let ev = emf.e.get_mut(i, j);
                    ev.y += lenv * (k * z).cos() * cos_pol;
                    ev.z += lenv * (k * z).cos() * sin_pol;
                    let bv = emf.b.get_mut(i, j);
                    bv.y += -lenv_2 * (k * z_2).cos() * sin_pol;
                    bv.z += lenv_2 * (k * z_2).cos() * cos_pol;
                }
            }
        }
        LaserKind::Gaussian => {
            for i in 0..emf.nx[0] as i32 {
                let z = i as Float * dx;
                let z_2 = z + dx / 2.0;
                let lenv = amp * lon_env(laser, z);
                let lenv_2 = amp * lon_env(laser, z_2);
                for j in 0..emf.nx[1] as i32 {
                    let r = (j + offset_y) as Float * dy - r_center;
                    let r_2 = r + dy / 2.0;
                    let ev = emf.e.get_mut(i, j);
                    ev.y += lenv * gauss_phase(laser, z, r_2) * cos_pol;
                    ev.z += lenv * gauss_phase(laser, z, r) * sin_pol;
                    let bv = emf.b.get_mut(i, j);
                    bv.y += -lenv_2 * gauss_phase(laser, z_2, r) * sin_pol;
                    bv.z += lenv_2 * gauss_phase(laser, z_2, r_2) * cos_pol;
                }
            }
        }
    }
}

/// Restore the transverse divergence by integrating the longitudinal field
/// components from the right edge of the region inwards.
pub fn div_corr_x(emf: &mut Emf) {
    let nx0 = emf.nx[0] as i32;
    let ny = emf.nx[1] as i32;
    let dx_dy = (emf.dx[0] / emf.dx[1]) as f64;
    for j in 0..ny {
        let mut ex = 0.0f64;
        let mut bx = 0.0f64;
        for i in (0..nx0).rev() {
            ex += dx_dy * (emf.e.get(i + 1, j).y as f64 - emf.e.get(i + 1, j - 1).y as f64);
            emf.e.get_mut(i, j).x = ex as Float;
            bx += dx_dy * (emf.b.get(i, j + 1).y as f64 - emf.b.get(i, j).y as f64);
            emf.b.get_mut(i, j).x = bx as Float;
        }
    }
}
