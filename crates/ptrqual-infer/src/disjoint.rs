//! Clustering of `Wild` pointers by root cause.
//!
//! Slots related by equality constraints are unioned; a group containing a
//! slot forced `Wild` directly (a "real" WILD slot) is led by that slot, and
//! every other member of the group is `Wild` only because of it.

use std::collections::{BTreeMap, BTreeSet};

use ena::unify::InPlaceUnificationTable;
use ptrqual_common::{DeclKey, SourceLoc};
use serde::Serialize;

use crate::constraint::{ConstraintId, ConstraintKind};
use crate::program::ProgramInfo;
use crate::qual::{Atom, VarId};
use crate::solver::Constraints;

/// Why a slot is `Wild` on its own account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WildRoot {
    pub var: VarId,
    pub constraint: ConstraintId,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<SourceLoc>,
}

#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    leaders: BTreeMap<VarId, VarId>,
    groups: BTreeMap<VarId, BTreeSet<VarId>>,
    real_wild: BTreeMap<VarId, WildRoot>,
    all_wild: BTreeSet<VarId>,
    slot_sources: BTreeMap<VarId, DeclKey>,
    valid_files: BTreeSet<String>,
}

impl DisjointSet {
    /// Cluster the current constraint set. Call after the final solve.
    pub fn compute(info: &ProgramInfo) -> DisjointSet {
        Self::compute_with(info, info.constraints())
    }

    /// Cluster `cs`, a solved variant of the program's constraint set.
    pub fn compute_with(info: &ProgramInfo, cs: &Constraints) -> DisjointSet {
        let mut table: InPlaceUnificationTable<VarId> = InPlaceUnificationTable::new();
        for _ in 0..cs.num_vars() {
            table.new_key(());
        }

        let mut touched = BTreeSet::new();
        let mut real_wild = BTreeMap::new();
        for (id, c) in cs.iter() {
            match c.kind {
                ConstraintKind::Eq(Atom::Var(a), Atom::Var(b)) => {
                    table.union(a, b);
                    touched.insert(a);
                    touched.insert(b);
                }
                kind => {
                    if let Some(v) = kind.direct_wild() {
                        touched.insert(v);
                        real_wild.entry(v).or_insert_with(|| WildRoot {
                            var: v,
                            constraint: id,
                            reason: c.reason.clone(),
                            loc: c.loc.clone(),
                        });
                    }
                }
            }
        }

        let mut by_root: BTreeMap<VarId, BTreeSet<VarId>> = BTreeMap::new();
        for v in touched {
            by_root.entry(table.find(v)).or_default().insert(v);
        }

        let mut leaders = BTreeMap::new();
        let mut groups = BTreeMap::new();
        for (root, members) in by_root {
            let leader = if real_wild.contains_key(&root) {
                root
            } else {
                members
                    .iter()
                    .find(|m| real_wild.contains_key(*m))
                    .copied()
                    .unwrap_or(root)
            };
            for m in &members {
                leaders.insert(*m, leader);
            }
            groups.insert(leader, members);
        }

        DisjointSet {
            leaders,
            groups,
            real_wild,
            all_wild: cs.wild_vars(),
            slot_sources: info.slot_sources(),
            valid_files: info.rewritable_files(),
        }
    }

    pub fn leader_of(&self, v: VarId) -> Option<VarId> {
        self.leaders.get(&v).copied()
    }

    pub fn group(&self, leader: VarId) -> Option<&BTreeSet<VarId>> {
        self.groups.get(&leader)
    }

    pub fn is_real_wild(&self, v: VarId) -> bool {
        self.real_wild.contains_key(&v)
    }

    pub fn real_wild(&self) -> impl Iterator<Item = &WildRoot> {
        self.real_wild.values()
    }

    /// Groups led by a real WILD slot.
    pub fn unsafe_groups(&self) -> impl Iterator<Item = (&WildRoot, &BTreeSet<VarId>)> {
        self.groups
            .iter()
            .filter_map(|(leader, members)| Some((self.real_wild.get(leader)?, members)))
    }

    /// Members of a group that are `Wild` only because of its leader.
    pub fn indirect_members(&self, leader: VarId) -> BTreeSet<VarId> {
        self.groups
            .get(&leader)
            .map(|m| {
                m.iter()
                    .filter(|v| !self.real_wild.contains_key(*v))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The real WILD slot a `Wild` slot is attributed to, if any.
    pub fn root_cause(&self, v: VarId) -> Option<&WildRoot> {
        self.real_wild.get(&self.leader_of(v)?)
    }

    pub fn all_wild(&self) -> &BTreeSet<VarId> {
        &self.all_wild
    }

    pub fn source_of(&self, v: VarId) -> Option<&DeclKey> {
        self.slot_sources.get(&v)
    }

    pub fn valid_files(&self) -> &BTreeSet<String> {
        &self.valid_files
    }

    /// A serializable summary, largest group first.
    pub fn report(&self) -> DisjointReport {
        let mut groups: Vec<GroupReport> = self
            .unsafe_groups()
            .map(|(root, _)| {
                let indirect = self.indirect_members(root.var);
                let decls = indirect
                    .iter()
                    .chain(Some(&root.var))
                    .filter_map(|v| self.source_of(*v))
                    .map(|k| k.to_string())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                GroupReport {
                    root: root.clone(),
                    source: self.source_of(root.var).map(|k| k.to_string()),
                    indirect: indirect.into_iter().collect(),
                    decls,
                }
            })
            .collect();
        groups.sort_by(|a, b| {
            b.indirect
                .len()
                .cmp(&a.indirect.len())
                .then(a.root.var.cmp(&b.root.var))
        });
        DisjointReport {
            total_wild: self.all_wild.len(),
            real_wild: self.real_wild.len(),
            groups,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DisjointReport {
    pub total_wild: usize,
    pub real_wild: usize,
    pub groups: Vec<GroupReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub root: WildRoot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub indirect: Vec<VarId>,
    pub decls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::reasons;
    use crate::qual::Qualifier;

    fn program(n: usize) -> (ProgramInfo, Vec<VarId>) {
        let mut info = ProgramInfo::default();
        let vars = (0..n).map(|_| info.constraints_mut().fresh_var()).collect();
        (info, vars)
    }

    #[test]
    fn real_wild_slot_leads_its_group() {
        let (mut info, v) = program(4);
        let cs = info.constraints_mut();
        cs.add_eq(v[0], v[1], reasons::ASSIGNMENT, None);
        cs.add_eq(v[1], v[2], reasons::ASSIGNMENT, None);
        cs.add_wild(v[2], reasons::UNSAFE_CAST, None);
        cs.solve().unwrap();

        let ds = DisjointSet::compute(&info);
        assert_eq!(ds.leader_of(v[0]), Some(v[2]));
        assert_eq!(
            ds.indirect_members(v[2]),
            BTreeSet::from([v[0], v[1]])
        );
        assert_eq!(ds.root_cause(v[1]).unwrap().reason, reasons::UNSAFE_CAST);
        assert_eq!(ds.leader_of(v[3]), None);
        assert_eq!(ds.all_wild().len(), 3);
    }

    #[test]
    fn lowest_real_wild_slot_is_promoted() {
        let (mut info, v) = program(3);
        let cs = info.constraints_mut();
        cs.add_eq(v[0], v[1], reasons::ASSIGNMENT, None);
        cs.add_eq(v[1], v[2], reasons::ASSIGNMENT, None);
        cs.add_wild(v[2], reasons::UNSAFE_CAST, None);
        cs.add_eq(v[1], Qualifier::Wild, reasons::MACRO_DECL, None);
        cs.solve().unwrap();

        let ds = DisjointSet::compute(&info);
        let leader = ds.leader_of(v[0]).unwrap();
        assert!(ds.is_real_wild(leader));
        if !ds.is_real_wild(ena_root(&info, v[0])) {
            assert_eq!(leader, v[1]);
        }
        assert_eq!(ds.indirect_members(leader), BTreeSet::from([v[0]]));
    }

    fn ena_root(info: &ProgramInfo, v: VarId) -> VarId {
        let mut table: InPlaceUnificationTable<VarId> = InPlaceUnificationTable::new();
        for _ in 0..info.constraints().num_vars() {
            table.new_key(());
        }
        for (_, c) in info.constraints().iter() {
            if let ConstraintKind::Eq(Atom::Var(a), Atom::Var(b)) = c.kind {
                table.union(a, b);
            }
        }
        table.find(v)
    }

    #[test]
    fn every_member_of_an_unsafe_group_is_wild() {
        let (mut info, v) = program(6);
        let cs = info.constraints_mut();
        cs.add_eq(v[0], v[1], reasons::ASSIGNMENT, None);
        cs.add_eq(v[3], v[4], reasons::ASSIGNMENT, None);
        cs.add_eq(v[4], v[5], reasons::ASSIGNMENT, None);
        cs.add_wild(v[5], reasons::UNSAFE_CAST, None);
        cs.add_geq(v[0], Qualifier::Arr, reasons::POINTER_ARITH, None);
        cs.solve().unwrap();

        let ds = DisjointSet::compute(&info);
        for (_, members) in ds.unsafe_groups() {
            for m in members {
                assert!(ds.all_wild().contains(m));
            }
        }
        assert_eq!(ds.unsafe_groups().count(), 1);
        let report = ds.report();
        assert_eq!(report.total_wild, 3);
        assert_eq!(report.groups[0].indirect, vec![v[3], v[4]]);
    }
}
