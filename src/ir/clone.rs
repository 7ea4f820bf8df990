//! Splitting repeated calls to one region into distinct functions.
//!
//! Region summaries are keyed by function name, so two calls to the same
//! region body would share one summary and one set of call-site types. Each
//! call beyond the first is redirected to a copy of the callee under a fresh
//! name. The input module is left untouched.

use crate::ir::module::{Instruction, Module};
use log::debug;
use std::collections::{BTreeSet, HashSet};

/// Result of [`split_repeated_calls`].
#[derive(Debug, Clone)]
pub struct SplitResult {
    /// Module with clones added and calls redirected
    pub module: Module,
    /// `(original, clone)` pairs in creation order
    pub clones: Vec<(String, String)>,
}

/// Redirect every repeated call to a region in `regions` to a fresh clone.
///
/// Clone names are `<name><seq>` with one sequence counter for the whole
/// module starting at 1, skipping names that already exist.
///
/// Repeats are counted per calling function: the first call in each function
/// keeps the original callee. A region called from two functions has two
/// parents, which detection rejects.
pub fn split_repeated_calls(module: &Module, regions: &BTreeSet<String>) -> SplitResult {
    let mut out = module.clone();
    let mut clones = Vec::new();
    let mut seq = 1usize;
    let mut taken: HashSet<String> = module.functions.iter().map(|f| f.name.clone()).collect();

    for fidx in 0..out.functions.len() {
        let mut seen: HashSet<String> = HashSet::new();
        for iidx in 0..out.functions[fidx].body.len() {
            let callee = match &out.functions[fidx].body[iidx] {
                Instruction::Call { callee, .. } if regions.contains(callee) => callee.clone(),
                _ => continue,
            };
            if seen.insert(callee.clone()) {
                continue;
            }

            let mut clone_name = format!("{}{}", callee, seq);
            while taken.contains(&clone_name) {
                seq += 1;
                clone_name = format!("{}{}", callee, seq);
            }
            seq += 1;

            let Some(original) = module.function(&callee) else {
                continue;
            };
            let mut copy = original.clone();
            copy.name = clone_name.clone();

            if let Instruction::Call { callee, .. } = &mut out.functions[fidx].body[iidx] {
                *callee = clone_name.clone();
            }
            debug!("redirected repeated call to '{}' into clone '{}'", callee, clone_name);
            taken.insert(clone_name.clone());
            out.functions.push(copy);
            clones.push((callee, clone_name));
        }
    }

    SplitResult { module: out, clones }
}
