//! The analysis session.
//!
//! Owns all engine state behind one lock. The lifecycle is build (record
//! facts and link), solve (solve and reconcile to a fixpoint, then cluster
//! WILD slots), then any number of reports and speculative retractions.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use ptrqual_common::DeclKey;
use serde::Serialize;
use tracing::{debug, info};

use crate::builder::ConstraintBuilder;
use crate::cast::{needs_cast, CastPolicy};
use crate::config::Options;
use crate::constraint::ConstraintId;
use crate::disjoint::DisjointSet;
use crate::error::InferError;
use crate::facts::Fact;
use crate::link::{link, LinkStats};
use crate::program::ProgramInfo;
use crate::qual::{Qualifier, VarId};
use crate::solver::Constraints;
use crate::stats::Stats;
use crate::subtyping::reconcile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SolveSummary {
    /// Solver passes over all solves.
    pub passes: usize,
    /// Reconciliation rounds run.
    pub rounds: usize,
    pub vars: usize,
    pub constraints: usize,
    pub wild: usize,
}

/// How much to retract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retraction {
    /// Only the constraint forcing the variable `Wild`.
    Single,
    /// Every constraint sharing that constraint's reason.
    SameReason,
}

/// The outcome of a speculative retraction, not yet applied.
#[derive(Debug, Clone)]
pub struct Speculation {
    pub removed: Vec<ConstraintId>,
    pub reason: String,
    /// Variables that stop being `Wild`.
    pub now_checked: BTreeSet<VarId>,
    pub wild_before: usize,
    pub wild_after: usize,
    constraints: Constraints,
    disjoint: DisjointSet,
}

#[derive(Default)]
struct State {
    info: ProgramInfo,
    built: bool,
    disjoint: Option<DisjointSet>,
}

pub struct Session {
    state: Mutex<State>,
}

impl Session {
    pub fn new(options: Options) -> Self {
        Session {
            state: Mutex::new(State {
                info: ProgramInfo::new(options),
                built: false,
                disjoint: None,
            }),
        }
    }

    /// Record facts and link declarations across translation units.
    pub fn build(&self, facts: &[Fact]) -> Result<LinkStats, InferError> {
        let mut state = self.state.lock();
        ConstraintBuilder::new(&mut state.info).add_facts(facts)?;
        let stats = link(&mut state.info)?;
        state.built = true;
        state.disjoint = None;
        Ok(stats)
    }

    /// Solve, then alternate reconciliation and solving until nothing
    /// changes or the round limit is hit, then cluster WILD slots.
    pub fn solve(&self) -> Result<SolveSummary, InferError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.built {
            return Err(InferError::NotBuilt);
        }
        state.info.cs.check_initial_env_sanity()?;
        let mut summary = SolveSummary {
            passes: state.info.cs.solve()?.passes,
            ..SolveSummary::default()
        };
        while summary.rounds < state.info.options.max_reconcile_rounds {
            summary.rounds += 1;
            if !reconcile(&mut state.info)? {
                break;
            }
            summary.passes += state.info.cs.solve()?.passes;
        }
        let disjoint = DisjointSet::compute(&state.info);
        summary.vars = state.info.cs.num_vars();
        summary.constraints = state.info.cs.len();
        summary.wild = disjoint.all_wild().len();
        info!(
            passes = summary.passes,
            rounds = summary.rounds,
            wild = summary.wild,
            "solved"
        );
        state.disjoint = Some(disjoint);
        Ok(summary)
    }

    /// Retract the constraint forcing `var` to `Wild` (or every constraint
    /// sharing its reason) on a copy of the constraint set and re-solve.
    pub fn speculate(&self, var: VarId, scope: Retraction) -> Result<Speculation, InferError> {
        let state = self.state.lock();
        let before = state.disjoint.as_ref().ok_or(InferError::NotBuilt)?;
        let cs = &state.info.cs;
        let id = cs
            .find_wild_constraint(var)
            .ok_or(InferError::NoWildConstraint(var))?;
        let reason = cs.get(id).map(|c| c.reason.clone()).unwrap_or_default();

        let mut trial = cs.clone();
        let removed = match scope {
            Retraction::Single => trial.remove_constraint(id).map(|_| vec![id]).unwrap_or_default(),
            Retraction::SameReason => trial.remove_all_with_reason(&reason),
        };
        trial.reset_environment();
        trial.solve()?;
        let disjoint = DisjointSet::compute_with(&state.info, &trial);
        let now_checked: BTreeSet<VarId> = before
            .all_wild()
            .difference(disjoint.all_wild())
            .copied()
            .collect();
        debug!(
            %var,
            removed = removed.len(),
            now_checked = now_checked.len(),
            "speculative retraction"
        );
        Ok(Speculation {
            removed,
            reason,
            now_checked,
            wild_before: before.all_wild().len(),
            wild_after: disjoint.all_wild().len(),
            constraints: trial,
            disjoint,
        })
    }

    /// Make a speculation the session's state.
    pub fn commit(&self, trial: Speculation) {
        let mut state = self.state.lock();
        state.info.cs = trial.constraints;
        state.disjoint = Some(trial.disjoint);
    }

    /// Solved chains of every constraint variable recorded for `key`.
    pub fn solution(&self, key: &DeclKey) -> Result<Vec<Vec<Qualifier>>, InferError> {
        let mut guard = self.state.lock();
        let info = &mut guard.info;
        let set = info.get_variable(key, true)?;
        Ok(set
            .iter()
            .map(|c| info.arena.solved_chain(*c, &info.cs))
            .collect())
    }

    /// Whether a value of `src` flowing into `dst` needs a cast.
    pub fn needs_cast(
        &self,
        src: &DeclKey,
        dst: &DeclKey,
        policy: CastPolicy,
    ) -> Result<bool, InferError> {
        let mut guard = self.state.lock();
        let info = &mut guard.info;
        let src = info.get_variable(src, true)?;
        let dst = info.get_variable(dst, true)?;
        let (Some(s), Some(d)) = (
            info.arena.highest(&src, &info.cs),
            info.arena.highest(&dst, &info.cs),
        ) else {
            return Ok(false);
        };
        Ok(needs_cast(&info.arena, &info.cs, s, d, policy))
    }

    pub fn stats(&self) -> Stats {
        Stats::compute(&self.state.lock().info)
    }

    pub fn disjoint(&self) -> Option<DisjointSet> {
        self.state.lock().disjoint.clone()
    }

    pub fn dump_json(&self) -> serde_json::Value {
        self.state.lock().info.dump_json()
    }

    /// Run `f` with read access to the program store.
    pub fn with_program<R>(&self, f: impl FnOnce(&ProgramInfo) -> R) -> R {
        f(&self.state.lock().info)
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(Options::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{DeclFact, Expr, TypeShape};

    #[test]
    fn solve_before_build_is_an_error() {
        let session = Session::default();
        assert_eq!(session.solve(), Err(InferError::NotBuilt));
    }

    #[test]
    fn speculation_without_wild_constraint_is_an_error() {
        let session = Session::default();
        let p = DeclKey::new("a.c", 1, 1, "p");
        session
            .build(&[Fact::Declare(DeclFact::variable(
                p.clone(),
                TypeShape::pointer("int", 1),
            ))])
            .unwrap();
        session.solve().unwrap();
        let err = session.speculate(VarId(0), Retraction::Single).unwrap_err();
        assert_eq!(err, InferError::NoWildConstraint(VarId(0)));
    }

    #[test]
    fn discarded_speculation_leaves_state_alone() {
        let session = Session::default();
        let p = DeclKey::new("a.c", 1, 1, "p");
        let facts = vec![
            Fact::Declare(DeclFact::variable(p.clone(), TypeShape::pointer("int", 1))),
            Fact::Cast {
                expr: Expr::decl(p.clone()),
                from: TypeShape::pointer("int", 1),
                to: TypeShape::pointer("float", 1),
                loc: None,
            },
        ];
        session.build(&facts).unwrap();
        session.solve().unwrap();
        let trial = session.speculate(VarId(0), Retraction::Single).unwrap();
        assert_eq!(trial.wild_after, 0);
        drop(trial);
        assert_eq!(session.solution(&p).unwrap(), vec![vec![Qualifier::Wild]]);
    }

    #[test]
    fn cast_query_through_session() {
        let session = Session::default();
        let p = DeclKey::new("a.c", 1, 1, "p");
        let q = DeclKey::new("a.c", 2, 1, "q");
        let facts = vec![
            Fact::Declare(DeclFact::variable(p.clone(), TypeShape::pointer("int", 1))),
            Fact::Declare(DeclFact::variable(q.clone(), TypeShape::pointer("int", 1))),
            Fact::Cast {
                expr: Expr::decl(q.clone()),
                from: TypeShape::pointer("int", 1),
                to: TypeShape::pointer("char", 1),
                loc: None,
            },
        ];
        session.build(&facts).unwrap();
        session.solve().unwrap();
        assert!(session.needs_cast(&p, &q, CastPolicy::Inferred).unwrap());
        assert!(!session.needs_cast(&q, &p, CastPolicy::Inferred).unwrap());
    }
}
