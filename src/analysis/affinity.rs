//! Static affinity scoring.
//!
//! Scores a region function from its instruction mix and loop trip counts,
//! then derives a per-device affinity and an estimated code generation cost.

use crate::ir::facts::{FunctionProfile, LoopProfile};
use crate::ir::summary::{ResourceInfo, ResourceTable};
use crate::ir::transfer::DeviceClass;
use log::{debug, warn};

/// Backend code generation costs.
pub mod codegen_time {
    pub const C_BACKEND: u64 = 53;
    pub const POLLY_BACKEND: u64 = 74;
    pub const OPENMP_BACKEND: u64 = 33;
    pub const OPENCL_BACKEND: u64 = 56;
}

/// Multi-core gain for functions with loops.
const LOOP_GAIN: f64 = 2.12;
/// Additional multi-core gain for functions containing regions.
const SCOP_GAIN: f64 = 2.34;
const GPU_FLOP_GAIN: f64 = 1.24;
const GPU_IOP_GAIN: f64 = 1.07;
const MIC_FLOP_DIVISOR: f64 = 0.86;
const MIC_IOP_DIVISOR: f64 = 1.46;

/// Operation weights.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub iop: u64,
    pub flop: u64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { iop: 1, flop: 1 }
    }
}

/// Product of trip counts down to the innermost loops, summed over siblings.
///
/// A loop without a constant trip count contributes 0.
pub fn innermost_total_trip_count(l: &LoopProfile) -> u64 {
    let Some(trip) = l.trip_count else {
        return 0;
    };
    if l.sub_loops.is_empty() {
        return trip;
    }
    l.sub_loops
        .iter()
        .map(innermost_total_trip_count)
        .fold(0u64, u64::saturating_add)
        .saturating_mul(trip)
}

fn loop_ops(l: &LoopProfile) -> (u64, u64) {
    l.sub_loops.iter().map(loop_ops).fold((l.iops, l.flops), |(i, f), (si, sf)| {
        (i.saturating_add(si), f.saturating_add(sf))
    })
}

/// Weighted operation score of a function.
pub fn score(profile: &FunctionProfile, weights: ScoreWeights) -> u64 {
    let instr_score = weights
        .iop
        .saturating_mul(profile.iops)
        .saturating_add(weights.flop.saturating_mul(profile.flops));

    let loops_score = profile.loops.iter().fold(0u64, |acc, l| {
        let (iops, flops) = loop_ops(l);
        let ops = weights.iop.saturating_mul(iops).saturating_add(weights.flop.saturating_mul(flops));
        acc.saturating_add(innermost_total_trip_count(l).saturating_mul(ops))
    });

    let total = instr_score.saturating_add(loops_score);
    if total == u64::MAX {
        warn!("score overflow, clamped to maximum value");
    }
    total
}

/// Affinity and code generation cost for every device class.
pub fn resource_table(profile: &FunctionProfile, weights: ScoreWeights) -> ResourceTable {
    use codegen_time::*;

    let flop_heavy = profile.flops > profile.iops;
    let legacy = score(profile, weights) as f64;

    let mut multi_core = if profile.loops.is_empty() { 0.0 } else { legacy * LOOP_GAIN };
    if profile.scops > 0 {
        multi_core *= SCOP_GAIN;
    }

    let gpu = if legacy < multi_core {
        multi_core * if flop_heavy { GPU_FLOP_GAIN } else { GPU_IOP_GAIN }
    } else {
        legacy / 2.0
    };
    let many_core = gpu / if flop_heavy { MIC_FLOP_DIVISOR } else { MIC_IOP_DIVISOR };

    let instrs = profile.total_instrs;
    let mut table = ResourceTable::default();
    table.set(DeviceClass::Legacy, ResourceInfo { affinity: legacy, codegen_time: 0 });
    table.set(
        DeviceClass::MultiCore,
        ResourceInfo {
            affinity: multi_core,
            codegen_time: C_BACKEND + POLLY_BACKEND + OPENMP_BACKEND + instrs,
        },
    );
    table.set(DeviceClass::Gpu, ResourceInfo { affinity: gpu, codegen_time: C_BACKEND + OPENCL_BACKEND + instrs });
    table.set(
        DeviceClass::ManyCore,
        ResourceInfo { affinity: many_core, codegen_time: C_BACKEND + OPENCL_BACKEND + instrs },
    );

    debug!(
        "affinity LEG={:.2} MCPU={:.2} GPU={:.2} MIC={:.2}",
        legacy, multi_core, gpu, many_core
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nest(outer: u64, inner: u64, flops: u64) -> LoopProfile {
        LoopProfile {
            trip_count: Some(outer),
            flops: 0,
            iops: 1,
            sub_loops: vec![LoopProfile { trip_count: Some(inner), flops, iops: 1, sub_loops: vec![] }],
        }
    }

    #[test]
    fn test_trip_counts() {
        assert_eq!(innermost_total_trip_count(&nest(10, 20, 0)), 200);
        let unknown = LoopProfile { trip_count: None, ..Default::default() };
        assert_eq!(innermost_total_trip_count(&unknown), 0);
        let huge = nest(u64::MAX, 2, 0);
        assert_eq!(innermost_total_trip_count(&huge), u64::MAX);
    }

    #[test]
    fn test_flop_heavy_region_prefers_accelerators() {
        let profile = FunctionProfile {
            total_instrs: 40,
            flops: 8,
            iops: 4,
            loops: vec![nest(10, 10, 2)],
            scops: 1,
        };
        // 4 + 8 from the body, 100 * (2 iops + 2 flops) from the nest
        assert_eq!(score(&profile, ScoreWeights::default()), 412);

        let table = resource_table(&profile, ScoreWeights::default());
        let leg = table.get(DeviceClass::Legacy).affinity;
        let mcpu = table.get(DeviceClass::MultiCore).affinity;
        let gpu = table.get(DeviceClass::Gpu).affinity;
        assert!((mcpu - 412.0 * 2.12 * 2.34).abs() < 1e-6);
        assert!((gpu - mcpu * 1.24).abs() < 1e-6);
        assert!(leg < mcpu);
        assert_eq!(table.get(DeviceClass::Gpu).codegen_time, 53 + 56 + 40);
        assert_eq!(table.get(DeviceClass::MultiCore).codegen_time, 53 + 74 + 33 + 40);
        assert_eq!(table.get(DeviceClass::Legacy).codegen_time, 0);
    }

    #[test]
    fn test_loop_free_function_halves_gpu() {
        let profile = FunctionProfile { total_instrs: 5, flops: 1, iops: 3, loops: vec![], scops: 0 };
        let table = resource_table(&profile, ScoreWeights::default());
        assert_eq!(table.get(DeviceClass::MultiCore).affinity, 0.0);
        assert_eq!(table.get(DeviceClass::Gpu).affinity, 2.0);
    }
}
