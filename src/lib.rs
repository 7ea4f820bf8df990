//! # PolyOffload - Heterogeneous Offload Planning
//!
//! Finds affine loop regions in a host program and plans their execution
//! on accelerators:
//! - Region (SCoP) detection from external polyhedral analysis facts
//! - Transfer direction classification of region arguments
//! - Call-chain dependence analysis for device-resident buffers
//! - Runtime device selection with residency tracking
//!
//! ## Architecture
//!
//! ```text
//! Module + Facts → Detection → Region Summaries → Call Chain → Code-Gen Request
//!                                                     ↓
//!                                       Runtime Decision → Write-Back
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use polyoffload::prelude::*;
//!
//! let input = polyoffload::load_input(&std::fs::read_to_string("app.json")?)?;
//! let config = OffloadConfig::default().with_depth_overrides(vec![2]);
//! let plan = polyoffload::plan_module(&input.module, &input.facts, &config)?;
//! let request = plan.codegen_request(&config);
//! ```

#![warn(clippy::all)]

pub mod analysis;
pub mod expr;
pub mod ir;
pub mod protocol;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::analysis::{DependenceAnalysis, Detection, ScoPDetector, ScoreWeights};
    pub use crate::expr::{evaluate, Expr};
    pub use crate::ir::{
        CallChain, CallChainEntry, CallSiteArgument, DeviceClass, Function, Instruction, Module,
        ModuleFacts, Param, RegionArgument, RegionFacts, RegionSummary, RegionSummaryMap, TransferType,
    };
    pub use crate::protocol::{CodeGenComplete, CodeGenRequest, MessageKind};
    pub use crate::runtime::{DecisionContext, DecisionWeights, Device, DeviceSet, Target};
    pub use crate::utils::errors::*;
    pub use crate::{plan_module, OffloadConfig, OffloadPlan};
}

use crate::analysis::{DependenceAnalysis, ScoPDetector, ScoreWeights};
use crate::ir::{CallChain, Module, ModuleFacts, RegionSummaryMap};
use crate::protocol::CodeGenRequest;
use crate::runtime::{DecisionContext, DecisionWeights, DeviceSet, Target};
use anyhow::{Context, Result};
use log::info;
use serde::{Serialize, Deserialize};
use std::sync::Arc;
use std::time::Duration;

/// A host module together with the analysis facts of its regions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub module: Module,
    #[serde(default)]
    pub facts: ModuleFacts,
}

/// Parse an [`AnalysisInput`] from JSON.
pub fn load_input(json: &str) -> Result<AnalysisInput> {
    serde_json::from_str(json).context("Failed to parse module and facts")
}

/// Configuration for offload planning and the runtime decision.
#[derive(Debug, Clone)]
pub struct OffloadConfig {
    /// Maximum code generation loop depth per region, in detection order
    pub codegen_depth_overrides: Vec<usize>,
    /// Device selection mode
    pub target: Target,
    /// Total element count above which a call counts as big data
    pub big_data_threshold: i64,
    /// How long a decision waits for kernel compilation
    pub compile_timeout: Duration,
    /// Functions whose name contains this are never analyzed
    pub skip_functions_containing: String,
    /// Local work-group sizes, 0 lets the device runtime pick
    pub block_size: [u32; 2],
    /// Operation weights for affinity scoring
    pub score_weights: ScoreWeights,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            codegen_depth_overrides: Vec::new(),
            target: Target::Auto,
            big_data_threshold: 1 << 20,
            compile_timeout: Duration::from_secs(60),
            skip_functions_containing: analysis::CHECK_RESULTS_CPU.to_string(),
            block_size: [0, 0],
            score_weights: ScoreWeights::default(),
        }
    }
}

impl OffloadConfig {
    pub fn with_depth_overrides(mut self, depths: Vec<usize>) -> Self {
        self.codegen_depth_overrides = depths;
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_big_data_threshold(mut self, threshold: i64) -> Self {
        self.big_data_threshold = threshold;
        self
    }

    pub fn with_compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = timeout;
        self
    }

    pub fn with_skip_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.skip_functions_containing = pattern.into();
        self
    }

    pub fn with_block_size(mut self, block_size: [u32; 2]) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn decision_weights(&self) -> DecisionWeights {
        DecisionWeights { big_data_threshold: self.big_data_threshold, ..DecisionWeights::default() }
    }

    /// Fresh decision state over `devices`.
    pub fn decision_context(&self, devices: Arc<DeviceSet>) -> DecisionContext {
        DecisionContext::new(devices, self.decision_weights())
    }
}

/// Everything the client needs to emit accelerated call paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadPlan {
    /// Module with repeated region calls split into clones
    pub module: Module,
    pub summaries: RegionSummaryMap,
    pub chain: CallChain,
    pub chain_interrupted: bool,
    /// Function calling the regions, if any region is called
    pub parent: Option<String>,
}

impl OffloadPlan {
    pub fn codegen_request(&self, config: &OffloadConfig) -> CodeGenRequest {
        CodeGenRequest::from_summaries(
            self.parent.clone().unwrap_or_default(),
            &self.summaries,
            &config.codegen_depth_overrides,
            config.block_size,
        )
    }

    /// Body indices of the parent after which device buffers are written back.
    pub fn write_back_points(&self) -> Vec<usize> {
        self.chain.write_back_points()
    }
}

/// Run detection and dependence analysis over a module.
pub fn plan_module(module: &Module, facts: &ModuleFacts, config: &OffloadConfig) -> Result<OffloadPlan> {
    let mut detector = ScoPDetector::new(config.codegen_depth_overrides.clone())
        .with_skip_pattern(config.skip_functions_containing.clone())
        .with_weights(config.score_weights);
    let detection = detector
        .detect(module, facts)
        .with_context(|| format!("Region detection failed for module '{}'", module.name))?;

    let chain = DependenceAnalysis::new(&detection.summaries)
        .analyze_module(&detection.module)
        .context("Call-chain analysis failed")?;

    let parent = (!chain.parent.is_empty()).then(|| chain.parent.clone());
    info!(
        "plan: {} region(s), {} chained call(s), parent {}",
        detection.summaries.len(),
        chain.len(),
        parent.as_deref().unwrap_or("<none>")
    );

    Ok(OffloadPlan {
        chain_interrupted: chain.interrupted,
        module: detection.module,
        summaries: detection.summaries,
        chain,
        parent,
    })
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, Instruction, Param, RegionFacts, StatementFacts, MemoryAccessFact, AccessKind};

    fn input() -> (Module, ModuleFacts) {
        let mut kernel = Function::new("kernel", vec![Param::pointer("A"), Param::integer("n")]);
        kernel.body.push(Instruction::other("ret"));
        let mut main = Function::new("main", vec![Param::pointer("buf"), Param::integer("n")]);
        main.body = vec![Instruction::call("kernel", &["buf", "n"]), Instruction::call("kernel", &["buf", "n"])];
        let module = Module { name: "app".to_string(), functions: vec![kernel, main] };

        let facts = ModuleFacts {
            regions: vec![RegionFacts {
                function: "kernel".to_string(),
                context: "[n] -> { : n >= 1 }".to_string(),
                assumed_context: "[n] -> { : n <= 4096 }".to_string(),
                auto_parallel_depth: 1,
                statements: vec![StatementFacts {
                    domain: "[n] -> { S[i0] : i0 >= 0 and i0 <= -1 + n }".to_string(),
                    accesses: vec![MemoryAccessFact {
                        kind: AccessKind::MustWrite,
                        base: "A".to_string(),
                        num_dims: 1,
                        scalar: false,
                        subscripts: vec!["i0".to_string()],
                        iterators: vec!["i0".to_string()],
                        relation: None,
                    }],
                }],
                profile: None,
            }],
        };
        (module, facts)
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = OffloadConfig::default();
        assert_eq!(config.big_data_threshold, 1 << 20);
        assert_eq!(config.skip_functions_containing, "check2000");
        assert_eq!(config.decision_weights().big_data_threshold, 1 << 20);
    }

    #[test]
    fn test_plan_splits_repeated_calls() {
        let (module, facts) = input();
        let plan = plan_module(&module, &facts, &OffloadConfig::default()).unwrap();

        assert_eq!(plan.parent.as_deref(), Some("main"));
        assert!(plan.summaries.contains_key("kernel1"));
        assert_eq!(plan.chain.len(), 2);
        assert!(!plan.chain_interrupted);
        assert_eq!(plan.write_back_points(), vec![1]);

        let request = plan.codegen_request(&OffloadConfig::default().with_depth_overrides(vec![1]));
        assert_eq!(request.parent_function, "main");
        assert!(request.regions.iter().all(|r| r.max_codegen_loop_depth == 1));
    }
}
