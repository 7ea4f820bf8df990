//! Per-region facts produced by the external polyhedral analysis.
//!
//! These are taken as given: iteration domains, access relations, context
//! descriptors and the automatically computed parallel depth.

use crate::ir::transfer::AccessKind;
use crate::utils::errors::{DetectionError, DetectionErrorKind};
use crate::utils::strings::{between, bracket_list};
use serde::{Serialize, Deserialize};

/// Facts for every candidate region of a module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleFacts {
    pub regions: Vec<RegionFacts>,
}

impl ModuleFacts {
    pub fn region(&self, function: &str) -> Option<&RegionFacts> {
        self.regions.iter().find(|r| r.function == function)
    }
}

/// Facts for one region function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionFacts {
    pub function: String,
    /// Parameter context, e.g. `[n, m] -> { : n >= 1 }`
    #[serde(default)]
    pub context: String,
    /// Assumed context, e.g. `[n] -> { : n <= 2048 }`
    #[serde(default)]
    pub assumed_context: String,
    /// Outer loop levels proven free of carried dependences
    #[serde(default)]
    pub auto_parallel_depth: usize,
    #[serde(default)]
    pub statements: Vec<StatementFacts>,
    /// Instruction mix of the region function, for affinity scoring
    #[serde(default)]
    pub profile: Option<FunctionProfile>,
}

/// Instruction counts of a function and its callees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionProfile {
    #[serde(default)]
    pub total_instrs: u64,
    #[serde(default)]
    pub flops: u64,
    #[serde(default)]
    pub iops: u64,
    /// Top-level loops
    #[serde(default)]
    pub loops: Vec<LoopProfile>,
    /// Number of regions found in the function
    #[serde(default)]
    pub scops: u32,
}

/// One loop of a function profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopProfile {
    /// Constant backedge-taken count, `None` when not loop invariant
    #[serde(default)]
    pub trip_count: Option<u64>,
    #[serde(default)]
    pub flops: u64,
    #[serde(default)]
    pub iops: u64,
    #[serde(default)]
    pub sub_loops: Vec<LoopProfile>,
}

/// One statement of a region.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementFacts {
    /// Iteration domain, e.g. `[n] -> { S[i0] : i0 >= 0 and i0 <= -1 + n }`
    pub domain: String,
    #[serde(default)]
    pub accesses: Vec<MemoryAccessFact>,
}

/// One memory access of a statement.
///
/// Either the structured fields are filled in or `relation` carries the raw
/// access relation, which [`MemoryAccessFact::resolve`] turns into them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAccessFact {
    pub kind: AccessKind,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub num_dims: usize,
    #[serde(default)]
    pub scalar: bool,
    /// One subscript expression per dimension
    #[serde(default)]
    pub subscripts: Vec<String>,
    /// Iteration variables of the accessing statement
    #[serde(default)]
    pub iterators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// Prefix the analysis puts in front of array names.
const MEMREF_PREFIX: &str = "MemRef_";

impl MemoryAccessFact {
    /// Build from an access relation such as
    /// `[n] -> { Stmt[i0, i1] -> MemRef_A[2 + i0, i1] }`.
    pub fn from_relation(kind: AccessKind, relation: &str) -> Result<Self, DetectionError> {
        let malformed = |msg: &str| {
            DetectionError::new(DetectionErrorKind::MalformedAccess, "", format!("{}: `{}`", msg, relation))
        };

        let body = between(relation, '{', '}').unwrap_or(relation);
        let (stmt, target) = body
            .split_once("->")
            .ok_or_else(|| malformed("access relation has no `->`"))?;

        let iterators = bracket_list(stmt);
        let target = target.trim();
        let base_end = target.find('[').unwrap_or(target.len());
        let raw_base = target[..base_end].trim();
        if raw_base.is_empty() {
            return Err(malformed("access relation has no array name"));
        }
        let base = raw_base.strip_prefix(MEMREF_PREFIX).unwrap_or(raw_base).to_string();
        let subscripts = bracket_list(target);

        Ok(Self {
            kind,
            base,
            num_dims: subscripts.len(),
            scalar: subscripts.is_empty(),
            subscripts,
            iterators,
            relation: None,
        })
    }

    /// Structured form of this access, parsing `relation` when present.
    pub fn resolve(&self, function: &str) -> Result<MemoryAccessFact, DetectionError> {
        match &self.relation {
            Some(rel) => {
                let mut parsed = Self::from_relation(self.kind, rel).map_err(|mut e| {
                    e.function = function.to_string();
                    e
                })?;
                if !self.base.is_empty() {
                    parsed.base = self.base.clone();
                }
                Ok(parsed)
            }
            None => {
                if !self.scalar && self.subscripts.len() != self.num_dims {
                    return Err(DetectionError::new(
                        DetectionErrorKind::DimensionMismatch,
                        function,
                        format!(
                            "access to '{}' declares {} dimensions but has {} subscripts",
                            self.base,
                            self.num_dims,
                            self.subscripts.len()
                        ),
                    ));
                }
                Ok(self.clone())
            }
        }
    }
}
