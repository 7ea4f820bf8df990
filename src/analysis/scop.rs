//! Static Control Part (SCoP) region detection.
//!
//! Turns the facts reported by the external polyhedral analysis into
//! [`RegionSummary`] records: argument transfer directions, per-dimension
//! buffer bounds and loop metadata.

use crate::analysis::affinity::{self, ScoreWeights};
use crate::expr::evaluate_lenient;
use crate::ir::clone::split_repeated_calls;
use crate::ir::facts::{ModuleFacts, RegionFacts};
use crate::ir::module::{Function, Module};
use crate::ir::summary::{LoopBoundInfo, RegionArgument, RegionSummary, RegionSummaryMap};
use crate::utils::errors::{
    ConsistencyError, ConsistencyErrorKind, DetectionError, DetectionErrorKind, OffloadResult,
};
use crate::utils::strings::{between, bracket_list, split_trimmed, substitute_idents};
use log::{debug, info, trace, warn};
use std::collections::BTreeSet;

/// Name fragment of the host-side result checking helper.
pub const CHECK_RESULTS_CPU: &str = "check2000";

/// Loop depth overrides, consumed one region at a time.
///
/// No overrides means the automatic depth is used. A single override applies
/// to every region. With several, each region takes the next one and the
/// last is reused once the list is exhausted.
#[derive(Debug, Clone, Default)]
pub struct DepthOverrides {
    values: Vec<usize>,
    cursor: usize,
}

impl DepthOverrides {
    pub fn new(values: Vec<usize>) -> Self {
        Self { values, cursor: 0 }
    }

    pub fn next(&mut self, automatic: usize) -> usize {
        match self.values.len() {
            0 => automatic,
            1 => self.values[0],
            len => {
                let depth = self.values[self.cursor];
                if self.cursor < len - 1 {
                    self.cursor += 1;
                }
                depth
            }
        }
    }
}

/// Bounds of one iteration variable from a statement domain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IterationBound {
    pub name: String,
    pub min_expr: String,
    pub max_expr: String,
}

/// Parse `[n] -> { S[i0, i1] : i0 >= 0 and i0 <= -1 + n and ... }`.
///
/// Returns `None` when the descriptor is not a `tuple : constraints` pair.
pub fn resolve_domain(domain: &str) -> Option<Vec<IterationBound>> {
    let body = between(domain, '{', '}')?;
    let parts: Vec<&str> = body.split(" : ").collect();
    if parts.len() != 2 {
        return None;
    }

    let mut bounds: Vec<IterationBound> = bracket_list(parts[0])
        .into_iter()
        .map(|name| IterationBound { name, ..Default::default() })
        .collect();

    for term in split_trimmed(parts[1], " and ") {
        let is_min = term.contains(">=");
        let tokens = split_trimmed(term, if is_min { " >= " } else { " <= " });
        if tokens.len() < 2 {
            continue;
        }
        if let Some(b) = bounds.iter_mut().find(|b| b.name == tokens[0]) {
            if is_min {
                b.min_expr = tokens[1].to_string();
            } else {
                b.max_expr = tokens[1].to_string();
            }
        }
    }
    Some(bounds)
}

/// Upper bound of `name` from an assumed context such as `[n] -> { : n <= 4000 }`.
pub fn assumed_upper_bound(assumed_context: &str, name: &str) -> Option<i64> {
    let needle = format!("{} <= ", name);
    let mut search = 0;
    while let Some(found) = assumed_context[search..].find(&needle) {
        let start = search + found;
        let preceded_by_ident = assumed_context[..start]
            .chars()
            .next_back()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_');
        if !preceded_by_ident {
            let rest = &assumed_context[start + needle.len()..];
            let token = rest.split(|c: char| c.is_whitespace() || c == '}').next().unwrap_or("");
            return token.parse().ok();
        }
        search = start + needle.len();
    }
    None
}

/// One [`LoopBoundInfo`] per code generation level.
///
/// Context parameters map onto levels in order; missing levels reuse the
/// last parameter.
pub fn map_loop_bounds(context: &str, assumed_context: &str, depth: usize) -> Vec<LoopBoundInfo> {
    let params = bracket_list(context);
    (0..depth)
        .map(|level| {
            let name = params.get(level).or_else(|| params.last()).cloned().unwrap_or_default();
            let max_value = if name.is_empty() {
                0
            } else {
                assumed_upper_bound(assumed_context, &name).unwrap_or(0)
            };
            LoopBoundInfo { max_value_expr: name.clone(), name, max_value }
        })
        .collect()
}

fn substitute_bounds(subscript: &str, bounds: &[IterationBound], pick: fn(&IterationBound) -> &str) -> String {
    substitute_idents(subscript, |ident| {
        bounds
            .iter()
            .find(|b| b.name == ident)
            .map(pick)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
    })
}

/// Output of module-wide detection.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Module with repeated region calls split into clones
    pub module: Module,
    pub summaries: RegionSummaryMap,
}

/// Region detector.
pub struct ScoPDetector {
    overrides: DepthOverrides,
    skip_pattern: String,
    weights: ScoreWeights,
}

impl Default for ScoPDetector {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ScoPDetector {
    pub fn new(depth_overrides: Vec<usize>) -> Self {
        Self {
            overrides: DepthOverrides::new(depth_overrides),
            skip_pattern: CHECK_RESULTS_CPU.to_string(),
            weights: ScoreWeights::default(),
        }
    }

    /// Functions whose name contains `pattern` are never analyzed.
    pub fn with_skip_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.skip_pattern = pattern.into();
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    fn is_skipped(&self, name: &str) -> bool {
        !self.skip_pattern.is_empty() && name.contains(&self.skip_pattern)
    }

    /// Detect every region of a module.
    ///
    /// Regions that cannot be resolved are left out. An empty result, or a
    /// region called from two different functions, is an error.
    pub fn detect(&mut self, module: &Module, facts: &ModuleFacts) -> OffloadResult<Detection> {
        let mut summaries = RegionSummaryMap::new();

        for function in &module.functions {
            if self.is_skipped(&function.name) {
                debug!("skipping '{}'", function.name);
                continue;
            }
            let Some(region_facts) = facts.region(&function.name) else {
                continue;
            };
            if let Some(summary) = self.detect_or_miss(function, region_facts) {
                summaries.insert(summary.function.clone(), summary);
            }
        }

        let names: BTreeSet<String> = summaries.keys().cloned().collect();
        let split = split_repeated_calls(module, &names);
        for (original, clone) in &split.clones {
            let (Some(function), Some(region_facts)) = (split.module.function(clone), facts.region(original)) else {
                continue;
            };
            if let Some(summary) = self.detect_or_miss(function, region_facts) {
                summaries.insert(summary.function.clone(), summary);
            }
        }

        if summaries.is_empty() {
            return Err(ConsistencyError::new(
                ConsistencyErrorKind::NoRegionsFound,
                format!("no offloadable region in module '{}'", module.name),
            )
            .into());
        }

        for summary in summaries.values_mut() {
            summary.parent = self.find_parent(&split.module, &summary.function)?;
        }

        info!("detected {} region(s)", summaries.len());
        Ok(Detection { module: split.module, summaries })
    }

    fn detect_or_miss(&mut self, function: &Function, facts: &RegionFacts) -> Option<RegionSummary> {
        match self.detect_region(function, facts) {
            Ok(summary) => Some(summary),
            Err(e) => {
                info!("region in '{}' skipped: {}", function.name, e);
                None
            }
        }
    }

    fn find_parent(&self, module: &Module, region: &str) -> OffloadResult<Option<String>> {
        let callers: Vec<&str> = module
            .callers_of(region)
            .into_iter()
            .filter(|c| !self.is_skipped(c))
            .collect();
        match callers.as_slice() {
            [] => {
                info!("region '{}' is never called", region);
                Ok(None)
            }
            [parent] => Ok(Some(parent.to_string())),
            _ => Err(ConsistencyError::new(
                ConsistencyErrorKind::MultipleParents,
                format!("region '{}' is called from {}", region, callers.join(", ")),
            )
            .into()),
        }
    }

    /// Build the summary of one region function.
    pub fn detect_region(&mut self, function: &Function, facts: &RegionFacts) -> Result<RegionSummary, DetectionError> {
        info!("region detected in function '{}'", function.name);

        let mut summary = RegionSummary::new(function.name.clone());
        summary.max_parallel_depth = self.overrides.next(facts.auto_parallel_depth);
        summary.loops = map_loop_bounds(&facts.context, &facts.assumed_context, summary.max_parallel_depth);
        summary.args = function
            .params
            .iter()
            .map(|p| {
                let mut arg = RegionArgument::new(p.name.clone(), false);
                arg.is_integer = p.is_integer;
                arg
            })
            .collect();

        for stmt in &facts.statements {
            let bounds = resolve_domain(&stmt.domain).ok_or_else(|| {
                DetectionError::new(
                    DetectionErrorKind::MalformedDomain,
                    &function.name,
                    format!("cannot resolve iteration domain `{}`", stmt.domain),
                )
            })?;

            for raw in &stmt.accesses {
                let access = raw.resolve(&function.name)?;
                let Some(arg) = summary.arg_mut(&access.base) else {
                    trace!("'{}' is not an argument of '{}'", access.base, function.name);
                    continue;
                };
                // A scalar access moves no buffer: the argument keeps its
                // parameter kind and gets no transfer type.
                if access.scalar {
                    continue;
                }

                arg.is_pointer = true;
                arg.resize(access.num_dims);
                let before = arg.transfer_type;
                arg.transfer_type = before.join_access(access.kind);
                trace!("{}: {:?} {} -> {}", arg.name, access.kind, before, arg.transfer_type);

                for (dim, subscript) in access.subscripts.iter().enumerate() {
                    let zeroed = substitute_idents(subscript, |ident| {
                        access.iterators.iter().any(|it| it == ident).then(|| "0".to_string())
                    });
                    let offset = evaluate_lenient(&zeroed);

                    if offset <= arg.min_offset[dim] {
                        arg.min_offset[dim] = offset;
                        arg.min_offset_expr[dim] = subscript.clone();
                        arg.min_bound[dim] = evaluate_lenient(&substitute_bounds(subscript, &bounds, |b| b.min_expr.as_str()));
                    }
                    if offset >= arg.max_offset[dim] {
                        arg.max_offset[dim] = offset;
                        arg.max_offset_expr[dim] = substitute_bounds(subscript, &bounds, |b| b.max_expr.as_str());
                    }
                }
            }
        }

        for arg in summary.args.iter_mut().filter(|a| a.is_pointer && a.dimension > 0) {
            if arg.min_bound[0] == 0 && !arg.max_offset_expr[0].is_empty() {
                arg.max_offset_expr[0].push_str(" + 1");
            }
        }

        for arg in summary.args.iter_mut() {
            arg.param_index = function.param_position(&arg.name);
            if arg.param_index.is_none() {
                warn!("argument '{}' has no formal parameter in '{}'", arg.name, function.name);
            }
        }

        if let Some(profile) = &facts.profile {
            summary.resources = affinity::resource_table(profile, self.weights);
        }

        Ok(summary)
    }
}
