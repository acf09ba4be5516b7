mod common;

use tiled_pic::flds::grid::{ScalarGrid, VFld};
use tiled_pic::prtls::sort;
use tiled_pic::{Float, Simulation};

/// A single stationary particle: no current anywhere, the particle does
/// not move and keeps its tile.
#[test]
fn stationary_particle_deposits_nothing() {
    let mut cfg = common::base_config([16, 16], 1, 0.1);
    cfg.species = vec![common::empty_species("probe")];
    let mut sim = Simulation::new(&cfg).unwrap();

    {
        let spec = &mut sim.regions[0].species[0];
        spec.main.push(8, 8, 0.5, 0.5, 0.0, 0.0, 0.0);
        sort::full_sort(spec);
    }
    sim.step();

    for v in sim.regions[0].current.j.data.iter() {
        assert_eq!(*v, VFld::ZERO);
    }
    let spec = &sim.regions[0].species[0];
    assert_eq!(spec.n_alive(), 1);
    assert_eq!(spec.main.ix[0], 8);
    assert_eq!(spec.main.iy[0], 8);
    assert_eq!(spec.main.x[0], 0.5);
    assert_eq!(spec.main.y[0], 0.5);
    assert!(sort::check_tiles(spec));
}

/// A neutral drifting plasma free-streams: the net current cancels, the
/// fields stay zero and every particle advances ballistically by
/// dt * u / gamma per step, modulo the periodic wrap.
#[test]
fn uniform_drift_is_ballistic() {
    let mut cfg = common::base_config([32, 32], 1, 0.2);
    let ufl = [0.1, 0.0, 0.0];
    cfg.species = vec![
        common::species("electrons", -1.0, [1, 1], ufl, [0.0; 3]),
        common::species("positrons", 1.0, [1, 1], ufl, [0.0; 3]),
    ];
    let mut sim = Simulation::new(&cfg).unwrap();

    let x0: Vec<Float> = {
        let spec = &sim.regions[0].species[0];
        (0..spec.main.size)
            .map(|k| spec.main.ix[k] as Float + spec.main.x[k])
            .collect()
    };
    let n0 = sim.n_alive();

    let steps = 100;
    for _ in 0..steps {
        sim.step();
    }

    assert_eq!(sim.n_alive(), n0);
    // opposite-charge deposits cancel to rounding, so the fields stay at
    // the noise floor
    assert!(sim.field_energy() < 1e-6, "residual field energy {}", sim.field_energy());

    let gamma = (1.0 + ufl[0] * ufl[0]).sqrt();
    let shift = steps as Float * 0.2 * ufl[0] / gamma;
    let spec = &sim.regions[0].species[0];
    assert!(sort::check_tiles(spec));
    // the sorter permutes the particles; compare as sorted multisets of
    // wrapped positions
    let mut expected: Vec<Float> = x0.iter().map(|x| (x + shift).rem_euclid(32.0)).collect();
    let mut got: Vec<Float> = (0..spec.main.size)
        .map(|k| spec.main.ix[k] as Float + spec.main.x[k])
        .collect();
    expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
    got.sort_by(|a, b| a.partial_cmp(b).unwrap());
    for (e, g) in expected.iter().zip(got.iter()) {
        assert!((e - g).abs() < 1e-3, "expected {}, got {}", e, g);
    }
}

fn deposit_all(sim: &Simulation) -> ScalarGrid {
    let mut rho = ScalarGrid::new(sim.nx);
    for region in sim.regions.iter() {
        for spec in region.species.iter() {
            spec.deposit_charge(&mut rho);
        }
    }
    rho.fold_periodic();
    rho
}

/// The deposition scheme conserves charge locally: the discrete continuity
/// equation holds cell by cell after one step.
#[test]
fn deposition_conserves_charge() {
    let dt = 0.3 as Float;
    let mut cfg = common::base_config([32, 32], 1, dt);
    cfg.species = vec![common::species(
        "electrons",
        -1.0,
        [2, 2],
        [0.05, 0.02, 0.0],
        [0.2, 0.2, 0.2],
    )];
    let mut sim = Simulation::new(&cfg).unwrap();

    let rho0 = deposit_all(&sim);
    sim.step();
    let rho1 = deposit_all(&sim);

    let j = &sim.regions[0].current.j;
    let mut worst = 0.0f64;
    for jj in 0..32i32 {
        for ii in 0..32i32 {
            let drho = (rho1.get(ii, jj) - rho0.get(ii, jj)) as f64 / dt as f64;
            let div = (j.get(ii, jj).x - j.get(ii - 1, jj).x) as f64
                + (j.get(ii, jj).y - j.get(ii, jj - 1).y) as f64;
            worst = worst.max((drho + div).abs());
        }
    }
    assert!(worst < 1e-4, "continuity residual {}", worst);
}

/// The direct and the tile-cached executors satisfy the same contract:
/// identical runs on the two back-ends stay in agreement.
#[test]
fn executors_agree() {
    let build = |accel: bool| {
        let mut cfg = common::base_config([32, 32], 1, 0.2);
        if accel {
            cfg.params.n_gpu_regions = Some(1);
        }
        cfg.species = vec![common::species(
            "electrons",
            -1.0,
            [2, 2],
            [0.1, 0.0, 0.0],
            [0.05, 0.05, 0.05],
        )];
        let mut sim = Simulation::new(&cfg).unwrap();
        for _ in 0..5 {
            sim.step();
        }
        sim
    };
    let cpu = build(false);
    let accel = build(true);

    assert_eq!(cpu.n_alive(), accel.n_alive());
    let rel = ((cpu.field_energy() - accel.field_energy()) / cpu.field_energy().max(1e-30)).abs();
    assert!(rel < 1e-3, "energy mismatch {}", rel);

    let a = &cpu.regions[0].species[0].main;
    let b = &accel.regions[0].species[0].main;
    let mut xa: Vec<Float> = (0..a.size)
        .filter(|&k| !a.invalid[k])
        .map(|k| a.ix[k] as Float + a.x[k])
        .collect();
    let mut xb: Vec<Float> = (0..b.size)
        .filter(|&k| !b.invalid[k])
        .map(|k| b.ix[k] as Float + b.x[k])
        .collect();
    xa.sort_by(|p, q| p.partial_cmp(q).unwrap());
    xb.sort_by(|p, q| p.partial_cmp(q).unwrap());
    for (p, q) in xa.iter().zip(xb.iter()) {
        assert!((p - q).abs() < 1e-3);
    }
}

/// Counter-streaming slabs drive the filamentation instability: magnetic
/// energy grows out of the noise floor.
#[test]
fn counter_streams_grow_magnetic_energy() {
    let mut cfg = common::base_config([32, 32], 1, 0.3);
    cfg.species = vec![
        common::species("right", -1.0, [2, 2], [0.0, 0.0, 0.4], [0.01, 0.01, 0.01]),
        common::species("left", -1.0, [2, 2], [0.0, 0.0, -0.4], [0.01, 0.01, 0.01]),
    ];
    let mut sim = Simulation::new(&cfg).unwrap();

    let b_energy = |sim: &Simulation| -> f64 {
        let emf = &sim.regions[0].emf;
        let mut acc = 0.0f64;
        for j in 0..32 {
            for i in 0..32 {
                let b = emf.b.get(i, j);
                acc += (b.x as f64).powi(2) + (b.y as f64).powi(2) + (b.z as f64).powi(2);
            }
        }
        acc
    };

    for _ in 0..10 {
        sim.step();
    }
    let early = b_energy(&sim);
    for _ in 0..50 {
        sim.step();
    }
    let late = b_energy(&sim);
    assert!(early > 0.0);
    assert!(late > early, "magnetic energy did not grow: {} -> {}", early, late);
    assert_eq!(sim.n_alive(), 2 * 32 * 32 * 4);
}
