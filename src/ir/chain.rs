//! Call chain: the ordered calls from one parent function into detected regions.

use crate::ir::transfer::TransferType;
use crate::utils::intern::BufferId;
use serde::{Serialize, Deserialize};

/// One actual argument at a call to a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteArgument {
    /// Name of the bound value in the parent
    pub value: String,
    /// Stable identity of the bound value
    pub buffer: BufferId,
    /// Position in the parent's own parameter list, `None` for a local
    pub position_in_parent: Option<usize>,
    /// Classification refined across the chain
    pub type_optimized: TransferType,
    /// Dimension size expressions, possibly widened by other calls
    pub max_offset_expr: Vec<String>,
}

impl CallSiteArgument {
    /// Position as the `-1`-for-locals integer used in emitted metadata.
    pub fn parent_position(&self) -> i64 {
        self.position_in_parent.map_or(-1, |p| p as i64)
    }
}

/// One call instruction invoking a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallChainEntry {
    /// Called region
    pub region: String,
    /// Index of the call instruction in the parent body
    pub call_index: usize,
    pub args: Vec<CallSiteArgument>,
}

/// All region calls of one parent function in program order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallChain {
    pub parent: String,
    pub entries: Vec<CallChainEntry>,
    /// Number of contiguous runs of region calls
    pub runs: usize,
    /// Region calls are separated by other calls; residency optimizations are off
    pub interrupted: bool,
}

impl CallChain {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instruction indices after which device buffers are written back to
    /// the host: after every region call of an interrupted chain, otherwise
    /// only after the last one.
    pub fn write_back_points(&self) -> Vec<usize> {
        if self.interrupted {
            self.entries.iter().map(|e| e.call_index).collect()
        } else {
            self.entries.last().map(|e| e.call_index).into_iter().collect()
        }
    }
}
