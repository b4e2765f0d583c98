//! The constraint set and its fixpoint solver.
//!
//! The set owns every solver variable and every constraint. Solving is a
//! monotone dataflow problem over the four-point lattice: all variables start
//! at `Ptr` and are only ever raised, so the solver reaches a fixpoint in at
//! most (lattice height x variable count) passes.

use std::collections::{BTreeMap, BTreeSet};

use ptrqual_common::SourceLoc;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::constraint::{Constraint, ConstraintId, ConstraintKind};
use crate::error::InferError;
use crate::qual::{Atom, Qualifier, VarId};

/// Result of one call to [`Constraints::solve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SolveStats {
    /// Full passes over the constraint list, including the final pass that
    /// observed no change.
    pub passes: usize,
    /// Variables whose value differs from before the call.
    pub changed: usize,
}

/// The constraint store: variables, their current assignment, constraints,
/// and the pointer chains whose WILD-ness must stay indivisible.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Constraints {
    /// Current assignment, indexed by `VarId.0`. A variable is registered
    /// iff its index is in bounds.
    env: Vec<Qualifier>,
    constraints: BTreeMap<ConstraintId, Constraint>,
    /// Structural index for deduplication.
    #[serde(skip)]
    index: FxHashMap<ConstraintKind, ConstraintId>,
    /// Constraints mentioning each variable.
    #[serde(skip)]
    owners: FxHashMap<VarId, BTreeSet<ConstraintId>>,
    /// Pointer chains, outermost slot first.
    chains: Vec<Vec<VarId>>,
    next_id: u32,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Variables ───────────────────────────────────────────────────────

    /// Create a fresh variable initialised to `Ptr`.
    pub fn fresh_var(&mut self) -> VarId {
        let v = VarId(self.env.len() as u32);
        self.env.push(Qualifier::Ptr);
        v
    }

    /// Return `v`, registering it (and every lower index) if needed.
    pub fn get_or_create_var(&mut self, v: VarId) -> VarId {
        while self.env.len() <= v.0 as usize {
            self.env.push(Qualifier::Ptr);
        }
        v
    }

    pub fn is_registered(&self, v: VarId) -> bool {
        (v.0 as usize) < self.env.len()
    }

    pub fn num_vars(&self) -> usize {
        self.env.len()
    }

    /// Current value of `v`. Unregistered variables read as `Ptr`.
    pub fn assignment(&self, v: VarId) -> Qualifier {
        self.env.get(v.0 as usize).copied().unwrap_or(Qualifier::Ptr)
    }

    pub fn value_of(&self, atom: Atom) -> Qualifier {
        match atom {
            Atom::Const(q) => q,
            Atom::Var(v) => self.assignment(v),
        }
    }

    pub fn is_wild(&self, v: VarId) -> bool {
        self.assignment(v).is_wild()
    }

    /// Every variable currently solved to `Wild`.
    pub fn wild_vars(&self) -> BTreeSet<VarId> {
        self.env
            .iter()
            .enumerate()
            .filter(|(_, q)| q.is_wild())
            .map(|(i, _)| VarId(i as u32))
            .collect()
    }

    /// Put every variable back to `Ptr`.
    pub fn reset_environment(&mut self) {
        for q in &mut self.env {
            *q = Qualifier::Ptr;
        }
    }

    /// Register a pointer chain so the solver keeps it indivisible: once its
    /// outermost slot is `Wild`, every slot is.
    pub fn register_chain(&mut self, chain: &[VarId]) {
        if chain.len() > 1 {
            self.chains.push(chain.to_vec());
        }
    }

    // ── Constraints ─────────────────────────────────────────────────────

    /// Add a constraint. Returns `None` when a structurally identical
    /// constraint already exists (the first reason is kept) or when the
    /// constraint relates two constants and so carries no information.
    pub fn add(
        &mut self,
        kind: ConstraintKind,
        reason: &str,
        loc: Option<SourceLoc>,
    ) -> Option<ConstraintId> {
        if let ConstraintKind::Eq(Atom::Const(_), Atom::Const(_)) = kind {
            return None;
        }
        if self.index.contains_key(&kind) {
            return None;
        }
        let id = ConstraintId(self.next_id);
        self.next_id += 1;
        for v in kind.vars() {
            self.owners.entry(v).or_default().insert(id);
        }
        self.index.insert(kind, id);
        self.constraints.insert(
            id,
            Constraint {
                kind,
                reason: reason.to_string(),
                loc,
            },
        );
        Some(id)
    }

    /// Add `lhs == rhs`. Returns whether the constraint is new.
    pub fn add_eq(
        &mut self,
        lhs: impl Into<Atom>,
        rhs: impl Into<Atom>,
        reason: &str,
        loc: Option<SourceLoc>,
    ) -> bool {
        self.add(ConstraintKind::eq(lhs, rhs), reason, loc).is_some()
    }

    /// Add `v >= bound`. Returns whether the constraint is new.
    pub fn add_geq(
        &mut self,
        v: VarId,
        bound: Qualifier,
        reason: &str,
        loc: Option<SourceLoc>,
    ) -> bool {
        self.add(ConstraintKind::Geq(v, bound), reason, loc).is_some()
    }

    /// Force `v` to `Wild` regardless of other evidence.
    pub fn add_wild(&mut self, v: VarId, reason: &str, loc: Option<SourceLoc>) -> bool {
        self.add_geq(v, Qualifier::Wild, reason, loc)
    }

    pub fn get(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(&id)
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// All constraints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (ConstraintId, &Constraint)> {
        self.constraints.iter().map(|(id, c)| (*id, c))
    }

    /// Constraints mentioning `v`, in insertion order.
    pub fn constraints_of(&self, v: VarId) -> impl Iterator<Item = ConstraintId> + '_ {
        self.owners.get(&v).into_iter().flatten().copied()
    }

    /// The constraint that directly forces `v` to `Wild`, preferring a
    /// lower bound over an equality.
    pub fn find_wild_constraint(&self, v: VarId) -> Option<ConstraintId> {
        self.index
            .get(&ConstraintKind::Geq(v, Qualifier::Wild))
            .or_else(|| self.index.get(&ConstraintKind::eq(v, Qualifier::Wild)))
            .copied()
    }

    /// Remove one constraint and clear it from the variables that own it.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Option<Constraint> {
        let c = self.constraints.remove(&id)?;
        self.index.remove(&c.kind);
        for v in c.kind.vars() {
            if let Some(owned) = self.owners.get_mut(&v) {
                owned.remove(&id);
            }
        }
        Some(c)
    }

    /// Remove every constraint whose reason is exactly `reason`.
    pub fn remove_all_with_reason(&mut self, reason: &str) -> Vec<ConstraintId> {
        let ids: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.reason == reason)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.remove_constraint(*id);
        }
        ids
    }

    // ── Solving ─────────────────────────────────────────────────────────

    /// Check that every constraint and chain only mentions registered
    /// variables.
    pub fn check_initial_env_sanity(&self) -> Result<(), InferError> {
        for (id, c) in &self.constraints {
            for v in c.kind.vars() {
                if !self.is_registered(v) {
                    return Err(InferError::UnregisteredAtom {
                        constraint: Some(*id),
                        var: v,
                    });
                }
            }
        }
        for chain in &self.chains {
            for v in chain {
                if !self.is_registered(*v) {
                    return Err(InferError::UnregisteredAtom {
                        constraint: None,
                        var: *v,
                    });
                }
            }
        }
        Ok(())
    }

    /// Run to a fixpoint from the current assignment.
    pub fn solve(&mut self) -> Result<SolveStats, InferError> {
        self.check_initial_env_sanity()?;
        let before = self.env.clone();

        let Constraints {
            env,
            constraints,
            chains,
            ..
        } = &mut *self;

        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;

            for c in constraints.values() {
                match c.kind {
                    ConstraintKind::Eq(lhs, rhs) => {
                        let joined = read(env, lhs).join(read(env, rhs));
                        changed |= raise(env, lhs, joined);
                        changed |= raise(env, rhs, joined);
                    }
                    ConstraintKind::Geq(v, bound) => {
                        changed |= raise(env, Atom::Var(v), bound);
                    }
                }
            }

            for chain in chains.iter() {
                if read(env, Atom::Var(chain[0])).is_wild() {
                    for v in &chain[1..] {
                        changed |= raise(env, Atom::Var(*v), Qualifier::Wild);
                    }
                }
            }

            if !changed {
                break;
            }
            debug!(pass = passes, "solver pass raised at least one variable");
        }

        let changed = before
            .iter()
            .zip(self.env.iter())
            .filter(|(a, b)| a != b)
            .count();
        info!(
            passes,
            vars = self.env.len(),
            constraints = self.constraints.len(),
            changed,
            "constraints solved"
        );
        Ok(SolveStats { passes, changed })
    }
}

fn read(env: &[Qualifier], atom: Atom) -> Qualifier {
    match atom {
        Atom::Const(q) => q,
        Atom::Var(v) => env[v.0 as usize],
    }
}

/// Raise a variable to at least `to`. Constants never move.
fn raise(env: &mut [Qualifier], atom: Atom, to: Qualifier) -> bool {
    match atom {
        Atom::Var(v) => {
            let slot = &mut env[v.0 as usize];
            if *slot < to {
                *slot = to;
                true
            } else {
                false
            }
        }
        Atom::Const(_) => false,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
