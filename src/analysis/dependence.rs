//! Call-site dependence analysis.
//!
//! Walks the function that calls the detected regions and builds its
//! [`CallChain`]. When the region calls form one uninterrupted run, buffer
//! classifications are refined across calls so that data can stay resident
//! on the device between consecutive kernels:
//! - a buffer read by one call and written by a later call becomes IN_OUT
//! - a buffer is sized for the largest extent any call in the chain touches,
//!   rewritten into the parameter names of the call that allocates it
//!
//! Refinement only looks at the first later call that uses the same buffer.

use crate::expr::evaluate_lenient;
use crate::ir::chain::{CallChain, CallChainEntry, CallSiteArgument};
use crate::ir::module::{Function, Module};
use crate::ir::summary::{RegionSummary, RegionSummaryMap};
use crate::utils::errors::{ConsistencyError, ConsistencyErrorKind, OffloadResult};
use crate::utils::intern::BufferInterner;
use crate::utils::strings::substitute_idents;
use log::{debug, info, trace, warn};
use std::collections::BTreeSet;

/// Dependence analysis over one summary map.
pub struct DependenceAnalysis<'a> {
    summaries: &'a RegionSummaryMap,
}

impl<'a> DependenceAnalysis<'a> {
    pub fn new(summaries: &'a RegionSummaryMap) -> Self {
        Self { summaries }
    }

    /// Find the single parent of all regions in `module` and analyze it.
    pub fn analyze_module(&self, module: &Module) -> OffloadResult<CallChain> {
        let parents: BTreeSet<&str> = self
            .summaries
            .values()
            .filter_map(|s| s.parent.as_deref())
            .collect();

        let parent = match parents.len() {
            0 => {
                info!("no region is called; call chain is empty");
                return Ok(CallChain::default());
            }
            1 => parents.into_iter().next().unwrap_or_default(),
            _ => {
                return Err(ConsistencyError::new(
                    ConsistencyErrorKind::MultipleParents,
                    format!("regions are called from {}", parents.into_iter().collect::<Vec<_>>().join(", ")),
                )
                .into())
            }
        };

        let function = module.function(parent).ok_or_else(|| {
            ConsistencyError::new(
                ConsistencyErrorKind::UnknownRegion,
                format!("parent function '{}' is missing from the module", parent),
            )
        })?;
        self.analyze(function)
    }

    /// Build and refine the call chain of `parent`.
    ///
    /// Every call starts from scratch: running twice on the same function
    /// yields the same chain.
    pub fn analyze(&self, parent: &Function) -> OffloadResult<CallChain> {
        let mut interner = BufferInterner::new();
        let mut chain = CallChain { parent: parent.name.clone(), ..Default::default() };
        let mut run_open = false;

        for (call_index, callee, args) in parent.calls() {
            let Some(summary) = self.summaries.get(callee) else {
                if run_open {
                    run_open = false;
                    chain.runs += 1;
                }
                continue;
            };
            run_open = true;

            if args.len() != summary.args.len() {
                return Err(ConsistencyError::new(
                    ConsistencyErrorKind::ArgumentCountMismatch,
                    format!(
                        "call to '{}' passes {} arguments, region declares {}",
                        callee,
                        args.len(),
                        summary.args.len()
                    ),
                )
                .into());
            }

            let args = args
                .iter()
                .zip(&summary.args)
                .map(|(value, region_arg)| CallSiteArgument {
                    value: value.clone(),
                    buffer: interner.intern(value),
                    position_in_parent: parent.param_position(value),
                    type_optimized: region_arg.transfer_type,
                    max_offset_expr: region_arg.max_offset_expr.clone(),
                })
                .collect();

            chain.entries.push(CallChainEntry { region: callee.to_string(), call_index, args });
        }
        if run_open {
            chain.runs += 1;
        }

        chain.interrupted = chain.runs > 1;
        info!(
            "call chain of '{}': {} call(s) in {} run(s){}",
            chain.parent,
            chain.len(),
            chain.runs,
            if chain.interrupted { ", interrupted" } else { "" }
        );

        if !chain.interrupted {
            self.refine(&mut chain)?;
        }
        Ok(chain)
    }

    fn summary(&self, region: &str) -> OffloadResult<&RegionSummary> {
        self.summaries.get(region).ok_or_else(|| {
            ConsistencyError::new(
                ConsistencyErrorKind::UnknownRegion,
                format!("no region summary for '{}'", region),
            )
            .into()
        })
    }

    /// Bottom-up residency refinement.
    fn refine(&self, chain: &mut CallChain) -> OffloadResult<()> {
        for root_pos in (0..chain.entries.len()).rev() {
            let (head, later) = chain.entries.split_at_mut(root_pos + 1);
            let root = &mut head[root_pos];
            let root_summary = self.summary(&root.region)?;
            let root_values: Vec<String> = root.args.iter().map(|a| a.value.clone()).collect();

            for root_arg in root.args.iter_mut() {
                let child = later.iter().find_map(|entry| {
                    entry.args.iter().find(|a| a.buffer == root_arg.buffer).map(|a| (entry, a))
                });
                let Some((child, child_arg)) = child else {
                    continue;
                };

                let before = root_arg.type_optimized;
                root_arg.type_optimized = before.join_sibling(child_arg.type_optimized);
                if before != root_arg.type_optimized {
                    trace!(
                        "{}@{}: {} -> {} from '{}'",
                        root_arg.value,
                        root.region,
                        before,
                        root_arg.type_optimized,
                        child.region
                    );
                }

                let (Some(root_size), Some(child_size)) =
                    (root_arg.max_offset_expr.first(), child_arg.max_offset_expr.first())
                else {
                    continue;
                };
                let child_summary = self.summary(&child.region)?;
                if extent(child_size, child_summary) <= extent(root_size, root_summary) {
                    continue;
                }
                let widened: Option<Vec<String>> = child_arg
                    .max_offset_expr
                    .iter()
                    .map(|size| rebind(size, child_summary, child, root_summary, &root_values))
                    .collect();
                match widened {
                    Some(sizes) => {
                        debug!("{}@{}: widened to `{}`", root_arg.value, root.region, sizes.join(", "));
                        root_arg.max_offset_expr = sizes;
                    }
                    None => warn!(
                        "{}@{}: extent `{}` of '{}' depends on values this call does not receive; size kept",
                        root_arg.value, root.region, child_size, child.region
                    ),
                }
            }
        }
        Ok(())
    }
}

/// Rewrite a size expression of `child`'s region into the parameter names
/// of the root call.
///
/// Each child parameter is replaced by the root parameter that received the
/// same value from the parent, or by the value itself when it is an integer
/// literal. Returns `None` if some name has no counterpart in the root call.
fn rebind(
    size: &str,
    child_summary: &RegionSummary,
    child: &CallChainEntry,
    root_summary: &RegionSummary,
    root_values: &[String],
) -> Option<String> {
    let mut complete = true;
    let rebound = substitute_idents(size, |ident| {
        let value = child_summary
            .args
            .iter()
            .position(|a| a.name == ident)
            .and_then(|k| child.args.get(k))
            .map(|a| a.value.as_str());
        let replacement = value.and_then(|value| {
            if value.parse::<i64>().is_ok() {
                return Some(value.to_string());
            }
            root_values
                .iter()
                .position(|v| v == value)
                .and_then(|q| root_summary.args.get(q))
                .map(|a| a.name.clone())
        });
        match replacement {
            Some(name) if name == ident => None,
            Some(name) => Some(name),
            None => {
                complete = false;
                None
            }
        }
    });
    complete.then_some(rebound)
}

/// Value of a size expression with the region's loop parameters set to 0.
fn extent(size: &str, summary: &RegionSummary) -> i64 {
    let names = summary.loop_names();
    let stripped = substitute_idents(size, |ident| names.contains(&ident).then(|| "0".to_string()));
    evaluate_lenient(&stripped)
}
