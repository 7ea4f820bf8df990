//! Region summaries: what the detector learned about one offloadable region.

use crate::ir::transfer::{DeviceClass, TransferType};
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// Bound information for one loop nesting level.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoopBoundInfo {
    /// Symbolic parameter bounding this level (e.g. `n`)
    pub name: String,
    /// Concrete upper bound from the assumed context, 0 if unknown
    pub max_value: i64,
    /// Symbolic upper bound
    pub max_value_expr: String,
}

/// One formal parameter of a region function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionArgument {
    /// Parameter name
    pub name: String,
    /// Index into the region function's parameter list, once bound
    pub param_index: Option<usize>,
    /// Passed by reference (array-like)
    pub is_pointer: bool,
    /// Integer scalar, usable to size buffers at run time
    pub is_integer: bool,
    /// Direction(s) data must move
    pub transfer_type: TransferType,
    /// Number of array dimensions, 0 for scalars
    pub dimension: usize,
    /// Running minimum of subscripts with iterators set to 0
    pub min_offset: Vec<i64>,
    /// Running maximum of subscripts with iterators set to 0
    pub max_offset: Vec<i64>,
    /// Subscript that produced the current minimum, unsubstituted
    pub min_offset_expr: Vec<String>,
    /// Subscript that produced the current maximum, iterators replaced by their upper bounds
    pub max_offset_expr: Vec<String>,
    /// Minimum subscript evaluated at the iterators' lower bounds
    pub min_bound: Vec<i64>,
}

impl RegionArgument {
    pub fn new(name: impl Into<String>, is_pointer: bool) -> Self {
        Self {
            name: name.into(),
            param_index: None,
            is_pointer,
            is_integer: false,
            transfer_type: TransferType::Unknown,
            dimension: 0,
            min_offset: Vec::new(),
            max_offset: Vec::new(),
            min_offset_expr: Vec::new(),
            max_offset_expr: Vec::new(),
            min_bound: Vec::new(),
        }
    }

    /// Change the dimensionality.
    ///
    /// Existing slots keep their values; new slots start at the sentinels
    /// `i64::MAX` for minima and `i64::MIN` for maxima.
    pub fn resize(&mut self, dimension: usize) {
        self.dimension = dimension;
        self.min_offset.resize(dimension, i64::MAX);
        self.max_offset.resize(dimension, i64::MIN);
        self.min_offset_expr.resize(dimension, String::new());
        self.max_offset_expr.resize(dimension, String::new());
        self.min_bound.resize(dimension, i64::MAX);
    }

    /// All per-dimension vectors agree with `dimension`.
    pub fn is_consistent(&self) -> bool {
        let d = self.dimension;
        self.min_offset.len() == d
            && self.max_offset.len() == d
            && self.min_offset_expr.len() == d
            && self.max_offset_expr.len() == d
            && self.min_bound.len() == d
    }

    /// Symbolic size of the outermost dimension, if known.
    pub fn size_expr(&self) -> Option<&str> {
        self.max_offset_expr
            .first()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Affinity and code generation cost for one device class.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub affinity: f64,
    pub codegen_time: u64,
}

/// Per device class resource information, indexed by [`DeviceClass`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceTable(pub [ResourceInfo; 4]);

impl ResourceTable {
    pub fn get(&self, device: DeviceClass) -> &ResourceInfo {
        &self.0[device.index()]
    }

    pub fn set(&mut self, device: DeviceClass, info: ResourceInfo) {
        self.0[device.index()] = info;
    }
}

/// Everything known about one detected region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    /// Region function name, unique within a module
    pub function: String,
    /// Function that calls the region
    pub parent: Option<String>,
    /// Formal parameters in declaration order
    pub args: Vec<RegionArgument>,
    /// One entry per code generation loop level
    pub loops: Vec<LoopBoundInfo>,
    /// Per device affinity and code generation cost
    pub resources: ResourceTable,
    /// Loop depth used for code generation
    pub max_parallel_depth: usize,
}

impl RegionSummary {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            parent: None,
            args: Vec::new(),
            loops: Vec::new(),
            resources: ResourceTable::default(),
            max_parallel_depth: 0,
        }
    }

    pub fn arg(&self, name: &str) -> Option<&RegionArgument> {
        self.args.iter().find(|a| a.name == name)
    }

    pub fn arg_mut(&mut self, name: &str) -> Option<&mut RegionArgument> {
        self.args.iter_mut().find(|a| a.name == name)
    }

    pub fn pointer_args(&self) -> impl Iterator<Item = &RegionArgument> {
        self.args.iter().filter(|a| a.is_pointer)
    }

    /// Symbolic names bounding the region's loops, without duplicates.
    pub fn loop_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for l in &self.loops {
            if !l.name.is_empty() && !names.contains(&l.name.as_str()) {
                names.push(&l.name);
            }
        }
        names
    }
}

/// Detected regions keyed by function name.
pub type RegionSummaryMap = BTreeMap<String, RegionSummary>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_preserves_data() {
        let mut arg = RegionArgument::new("A", true);
        arg.resize(1);
        arg.min_offset[0] = 0;
        arg.max_offset[0] = 2;
        arg.min_offset_expr[0] = "i0".to_string();
        arg.max_offset_expr[0] = "2 + (-1 + n)".to_string();

        arg.resize(2);
        assert!(arg.is_consistent());
        assert_eq!(arg.min_offset, vec![0, i64::MAX]);
        assert_eq!(arg.max_offset, vec![2, i64::MIN]);
        assert_eq!(arg.max_offset_expr[0], "2 + (-1 + n)");
        assert!(arg.max_offset_expr[1].is_empty());
    }

    #[test]
    fn test_loop_names_deduplicated() {
        let mut summary = RegionSummary::new("kernel");
        for name in ["n", "m", "m"] {
            summary.loops.push(LoopBoundInfo { name: name.to_string(), ..Default::default() });
        }
        assert_eq!(summary.loop_names(), vec!["n", "m"]);
    }

    #[test]
    fn test_resource_table_indexing() {
        let mut table = ResourceTable::default();
        table.set(DeviceClass::Gpu, ResourceInfo { affinity: 1.5, codegen_time: 120 });
        assert_eq!(table.get(DeviceClass::Gpu).codegen_time, 120);
        assert_eq!(table.get(DeviceClass::Legacy).codegen_time, 0);
    }
}
