//! Runtime support for offloaded calls.
//!
//! - Transfer size resolution from symbolic bounds
//! - Devices, buffer residency and background compilation
//! - The per-call device decision

pub mod size;
pub mod device;
pub mod decision;

pub use size::resolve_transfer_size;
pub use device::{CompileGate, Device, DeviceBuffer, DeviceHandle, DeviceSet};
pub use decision::{Decision, DecisionContext, DecisionWeights, Target};
