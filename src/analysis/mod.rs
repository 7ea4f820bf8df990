//! Analysis passes for offload planning.

pub mod affinity;
pub mod scop;
pub mod dependence;

pub use affinity::{resource_table, ScoreWeights};
pub use scop::{Detection, DepthOverrides, ScoPDetector, CHECK_RESULTS_CPU};
pub use dependence::DependenceAnalysis;

use crate::ir::chain::CallChain;
use crate::ir::facts::ModuleFacts;
use crate::ir::module::Module;
use crate::ir::summary::RegionSummaryMap;
use anyhow::Result;

/// Detect all offloadable regions of a module.
pub fn detect_regions(module: &Module, facts: &ModuleFacts, depth_overrides: Vec<usize>) -> Result<Detection> {
    let mut detector = ScoPDetector::new(depth_overrides);
    Ok(detector.detect(module, facts)?)
}

/// Build the call chain of the regions' parent function.
pub fn analyze_call_chain(module: &Module, summaries: &RegionSummaryMap) -> Result<CallChain> {
    let analysis = DependenceAnalysis::new(summaries);
    Ok(analysis.analyze_module(module)?)
}
