use crate::flds::current::Current;
use crate::flds::Emf;
use crate::prtls::{push, Species};
use crate::Float;

/// Where a region's kernels run. The accelerator flavour mirrors a GPU
/// queue: tile-cached kernels with a local-accumulate/scatter current
/// deposit instead of global writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Accel,
}

/// The executor seam of the per-step pipeline. Both back-ends satisfy the
/// same mathematical contract; only the memory access pattern differs.
pub trait AdvanceEngine: Sync {
    fn name(&self) -> &'static str;
    fn advance(&self, spec: &mut Species, emf: &Emf, current: &mut Current);
}

/// Straight loop over the region's particles against the global arrays.
pub struct CpuEngine;

impl AdvanceEngine for CpuEngine {
    fn name(&self) -> &'static str {
        "cpu"
    }
    fn advance(&self, spec: &mut Species, emf: &Emf, current: &mut Current) {
        push::advance_direct(spec, emf, current);
    }
}

/// Tile-parallel advance with shared-memory style field and current
/// staging per tile.
pub struct TileEngine;

impl AdvanceEngine for TileEngine {
    fn name(&self) -> &'static str {
        "tile"
    }
    fn advance(&self, spec: &mut Species, emf: &Emf, current: &mut Current) {
        push::advance_tiled(spec, emf, current);
    }
}

static CPU_ENGINE: CpuEngine = CpuEngine;
static TILE_ENGINE: TileEngine = TileEngine;

/// Pins each region to an executor. The first `round(n_regions *
/// gpu_fraction)` regions (or an explicit count) run on the accelerator
/// flavour, the rest on the CPU flavour.
pub struct Scheduler {
    pub devices: Vec<Device>,
}

impl Scheduler {
    pub fn new(n_regions: usize, gpu_fraction: Float, n_gpu_regions: Option<usize>) -> Scheduler {
        let k = n_gpu_regions
            .unwrap_or_else(|| (n_regions as Float * gpu_fraction).round() as usize)
            .min(n_regions);
        Scheduler {
            devices: (0..n_regions)
                .map(|r| if r < k { Device::Accel } else { Device::Cpu })
                .collect(),
        }
    }

    pub fn engine(&self, region: usize) -> &'static dyn AdvanceEngine {
        match self.devices[region] {
            Device::Cpu => &CPU_ENGINE,
            Device::Accel => &TILE_ENGINE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_rounds_to_region_count() {
        let s = Scheduler::new(4, 0.5, None);
        assert_eq!(
            s.devices,
            vec![Device::Accel, Device::Accel, Device::Cpu, Device::Cpu]
        );
        let s = Scheduler::new(4, 0.0, None);
        assert!(s.devices.iter().all(|d| *d == Device::Cpu));
        let s = Scheduler::new(4, 1.0, None);
        assert!(s.devices.iter().all(|d| *d == Device::Accel));
    }

    #[test]
    fn explicit_count_wins() {
        let s = Scheduler::new(4, 0.0, Some(3));
        assert_eq!(s.devices.iter().filter(|d| **d == Device::Accel).count(), 3);
        // clamped to the region count
        let s = Scheduler::new(2, 0.0, Some(9));
        assert_eq!(s.devices.iter().filter(|d| **d == Device::Accel).count(), 2);
    }
}
