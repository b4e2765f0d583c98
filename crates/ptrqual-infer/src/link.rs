//! Symbol linking across translation units.
//!
//! Runs once after every fact has been recorded and before the first solve.
//! Declarations that name the same entity are made to agree, and functions
//! whose body was never seen get the extern policy.

use std::collections::BTreeMap;

use ptrqual_common::SourceLoc;
use tracing::debug;

use crate::constraint::reasons;
use crate::cvar::{CVarId, CVarSet, ConstraintVariable};
use crate::error::InferError;
use crate::program::ProgramInfo;
use crate::qual::Qualifier;

/// How much each linking step did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub decl_groups: usize,
    pub global_groups: usize,
    pub function_pairs: usize,
    pub externs: usize,
}

pub fn link(info: &mut ProgramInfo) -> Result<LinkStats, InferError> {
    let mut stats = LinkStats::default();

    // 1. Several declarators at one identity.
    let same_key: Vec<(CVarSet, SourceLoc)> = info
        .variables()
        .iter()
        .filter(|(_, set)| set.len() > 1)
        .map(|(k, set)| (set.clone(), k.loc()))
        .collect();
    for (set, loc) in &same_key {
        equate_in_sequence(info, set.iter().copied(), Some(loc));
    }
    stats.decl_groups = same_key.len();
    debug!(groups = stats.decl_groups, "linked declarations sharing an identity");

    // 2. Global variables by name.
    let globals: Vec<CVarSet> = info
        .global_variables()
        .values()
        .filter(|set| set.len() > 1)
        .cloned()
        .collect();
    for set in &globals {
        equate_in_sequence(info, set.iter().copied(), None);
    }
    stats.global_groups = globals.len();
    debug!(groups = stats.global_groups, "linked global variables");

    // 3. Declarations of each global function.
    if !info.options().separate_multiple_func_decls {
        let mut by_name: BTreeMap<String, Vec<CVarId>> = BTreeMap::new();
        for f in info.functions().filter(|f| f.is_global && !f.is_definition) {
            by_name.entry(f.key.name.clone()).or_default().push(f.cvar);
        }
        for def in info.undeclared_definitions() {
            if !info.function_decl(&def).map_or(false, |f| f.is_global) {
                continue;
            }
            let synth = info.declaration_of(&def)?;
            by_name.entry(def.name.clone()).or_default().push(synth);
        }
        for decls in by_name.values() {
            for pair in decls.windows(2) {
                info.arena
                    .constrain_eq(pair[0], pair[1], &mut info.cs, reasons::LINK, None);
                stats.function_pairs += 1;
            }
        }
        debug!(pairs = stats.function_pairs, "linked function declarations");
    }

    // 4. Functions never seen with a body.
    let externs: Vec<String> = info
        .extern_functions()
        .iter()
        .filter(|(name, has_body)| !**has_body && !info.options().is_safe_extern(name))
        .map(|(name, _)| name.clone())
        .collect();
    for name in &externs {
        let cvars: Vec<CVarId> = info
            .functions()
            .filter(|f| &f.key.name == name)
            .map(|f| f.cvar)
            .collect();
        for cv in cvars {
            apply_extern_policy(info, cv);
        }
    }
    stats.externs = externs.len();
    debug!(externs = stats.externs, "applied extern policy");

    Ok(stats)
}

fn equate_in_sequence(
    info: &mut ProgramInfo,
    cvars: impl Iterator<Item = CVarId>,
    loc: Option<&SourceLoc>,
) {
    let cvars: Vec<CVarId> = cvars.collect();
    for pair in cvars.windows(2) {
        info.arena
            .constrain_eq(pair[0], pair[1], &mut info.cs, reasons::LINK, loc);
    }
}

/// Returns become `Wild`; pointer parameters keep a checked outermost level
/// but every inner level becomes `Wild`. Itype annotations pin the
/// outermost level instead; the levels below it are still forced.
fn apply_extern_policy(info: &mut ProgramInfo, cv: CVarId) {
    let (returns, params) = match info.arena.function(cv) {
        Some(f) => (f.returns.clone(), f.params.clone()),
        None => return,
    };
    for r in returns {
        if pin_itype(info, r) {
            force_inner_levels(info, r, reasons::EXTERN_RETURN);
        } else {
            info.arena
                .constrain_to_wild(r, &mut info.cs, reasons::EXTERN_RETURN, None);
        }
    }
    for p in params.iter().flatten().copied() {
        pin_itype(info, p);
        force_inner_levels(info, p, reasons::EXTERN_PARAM);
    }
}

/// Force everything below the outermost level of `cv` to `Wild`. A
/// function-only variable has no outermost pointer level and is forced
/// wholesale.
fn force_inner_levels(info: &mut ProgramInfo, cv: CVarId, reason: &str) {
    match info.arena.get(cv) {
        ConstraintVariable::Pointer(ptr) => {
            let inner = ptr.slots.iter().skip(1).copied().collect::<Vec<_>>();
            let function = ptr.function;
            for v in inner {
                info.cs.add_wild(v, reason, None);
            }
            if let Some(f) = function {
                info.arena.constrain_to_wild(f, &mut info.cs, reason, None);
            }
        }
        ConstraintVariable::Function(_) => {
            info.arena.constrain_to_wild(cv, &mut info.cs, reason, None);
        }
    }
}

fn pin_itype(info: &mut ProgramInfo, cv: CVarId) -> bool {
    let pinned = info.arena.pointer(cv).and_then(|p| {
        let q = p.itype.as_deref().and_then(Qualifier::from_itype)?;
        Some((*p.slots.first()?, q))
    });
    match pinned {
        Some((v, q)) => {
            info.cs.add_eq(v, q, reasons::ITYPE, None);
            true
        }
        None => false,
    }
}
