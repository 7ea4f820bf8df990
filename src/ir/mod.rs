//! Data model shared by the analysis passes and the runtime.
//!
//! - `module`: the host program as functions and calls
//! - `facts`: per-region output of the external polyhedral analysis
//! - `summary`: region summaries built by the detector
//! - `chain`: call chains built by the dependency analyzer
//! - `transfer`: transfer-direction lattice and device classes

pub mod module;
pub mod facts;
pub mod summary;
pub mod chain;
pub mod transfer;
pub mod clone;

pub use module::{Module, Function, Param, Instruction};
pub use facts::{ModuleFacts, RegionFacts, StatementFacts, MemoryAccessFact, FunctionProfile, LoopProfile};
pub use summary::{LoopBoundInfo, RegionArgument, RegionSummary, RegionSummaryMap, ResourceInfo, ResourceTable};
pub use chain::{CallChain, CallChainEntry, CallSiteArgument};
pub use transfer::{AccessKind, DeviceClass, TransferType};
pub use clone::{split_repeated_calls, SplitResult};
pub use crate::utils::intern::BufferId;
